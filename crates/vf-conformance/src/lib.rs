#![forbid(unsafe_code)]

//! Shared fixtures and invariant checks for vecframe's cross-crate tests.

use vf_columnar::{Value, Vector};
use vf_frame::DataFrame;

/// Six employees with a missing `type`, a missing `salary` and repeated
/// departments.
#[must_use]
pub fn employees() -> DataFrame {
    DataFrame::new(
        vec![
            Vector::integer(vec![1, 2, 3, 4, 5, 6]).with_name("id"),
            Vector::string(["ann", "bob", "cy", "dee", "eve", "fay"]).with_name("name"),
            Vector::from_options(vec![Some(1_i64), Some(2), Some(1), Some(2), None, Some(1)])
                .with_name("type"),
            Vector::from_options(vec![
                Some(120.0),
                Some(90.0),
                Some(100.0),
                None,
                Some(75.0),
                Some(100.0),
            ])
            .with_name("salary"),
            Vector::string(["eng", "ops", "eng", "hr", "ops", "eng"]).with_name("dept"),
        ],
        &[],
    )
}

/// Department lookup table; `hr` is absent and `legal` has no employees.
#[must_use]
pub fn departments() -> DataFrame {
    DataFrame::new(
        vec![
            Vector::string(["eng", "ops", "legal"]).with_name("dept"),
            Vector::integer(vec![3, 1, 7]).with_name("floor"),
        ],
        &[],
    )
}

/// Whether `groups` contains every row `1..=row_count` exactly once.
#[must_use]
pub fn is_partition(groups: &[Vec<usize>], row_count: usize) -> bool {
    let mut seen = vec![0_usize; row_count];
    for &row in groups.iter().flatten() {
        match row.checked_sub(1).and_then(|pos| seen.get_mut(pos)) {
            Some(count) => *count += 1,
            None => return false,
        }
    }
    seen.iter().all(|&count| count == 1)
}

/// Values of the named column, or an empty list when it does not exist.
#[must_use]
pub fn column_values(frame: &DataFrame, name: &str) -> Vec<Value> {
    frame.column(name).map(Vector::values).unwrap_or_default()
}

/// Row-major copy of every cell.
#[must_use]
pub fn records(frame: &DataFrame) -> Vec<Vec<Value>> {
    (0..frame.row_count())
        .map(|pos| frame.columns().iter().map(|column| column.value(pos)).collect())
        .collect()
}
