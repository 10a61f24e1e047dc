use std::collections::HashMap;

use tracing::trace;
use vf_columnar::Value;

use crate::DataFrame;

/// One row as a column-name → value map. Duplicate column names keep the
/// first column's value.
pub type Row = HashMap<String, Value>;

/// Row selection for [`DataFrame::filter`].
pub enum RowFilter<'a> {
    /// 1-based row numbers; `0` and out-of-range rows give NA rows.
    Indices(Vec<usize>),
    /// Cycled over the rows. An empty mask keeps no rows.
    Mask(Vec<bool>),
    /// Receives the 1-based row number and the row.
    Predicate(Box<dyn FnMut(usize, &Row) -> bool + 'a>),
    RowPredicate(Box<dyn FnMut(&Row) -> bool + 'a>),
}

impl<'a> RowFilter<'a> {
    pub fn predicate(f: impl FnMut(usize, &Row) -> bool + 'a) -> Self {
        Self::Predicate(Box::new(f))
    }

    pub fn row_predicate(f: impl FnMut(&Row) -> bool + 'a) -> Self {
        Self::RowPredicate(Box::new(f))
    }
}

impl DataFrame {
    /// The 1-based `row` as a name → value map; out-of-range rows are all NA.
    #[must_use]
    pub fn row(&self, row: usize) -> Row {
        let position = row.wrapping_sub(1);
        let mut values = Row::with_capacity(self.column_count());
        for (name, column) in self.column_names.iter().zip(&self.columns) {
            values
                .entry(name.clone())
                .or_insert_with(|| column.value(position));
        }
        values
    }

    #[must_use]
    pub fn filter(&self, filter: RowFilter<'_>) -> Self {
        trace!(rows = self.row_count, "filter");
        let rows: Vec<usize> = match filter {
            RowFilter::Indices(indices) => indices,
            RowFilter::Mask(mask) if mask.is_empty() => Vec::new(),
            RowFilter::Mask(mask) => (1..=self.row_count)
                .filter(|row| mask[(row - 1) % mask.len()])
                .collect(),
            RowFilter::Predicate(mut keep) => (1..=self.row_count)
                .filter(|&row| keep(row, &self.row(row)))
                .collect(),
            RowFilter::RowPredicate(mut keep) => (1..=self.row_count)
                .filter(|&row| keep(&self.row(row)))
                .collect(),
        };
        self.by_indices(&rows)
    }
}

#[cfg(test)]
mod tests {
    use vf_columnar::{Value, Vector};

    use super::RowFilter;
    use crate::DataFrame;

    fn frame() -> DataFrame {
        DataFrame::new(
            vec![
                Vector::from_options(vec![Some(10_i64), None, Some(30), Some(40)]).with_name("n"),
                Vector::string(["w", "x", "y", "z"]).with_name("s"),
            ],
            &[],
        )
    }

    #[test]
    fn row_map_exposes_missing_values_as_na() {
        let row = frame().row(2);
        assert_eq!(row.get("n"), Some(&Value::Na));
        assert_eq!(row.get("s"), Some(&Value::from("x")));
        assert_eq!(frame().row(0).get("s"), Some(&Value::Na));
    }

    #[test]
    fn filter_by_indices_and_cycled_mask() {
        let df = frame();
        let picked = df.filter(RowFilter::Indices(vec![4, 0]));
        assert_eq!(
            picked.column("s").expect("s").values(),
            vec![Value::from("z"), Value::Na]
        );

        let masked = df.filter(RowFilter::Mask(vec![false, true]));
        assert_eq!(
            masked.column("s").expect("s").values(),
            vec![Value::from("x"), Value::from("z")]
        );
        let none = df.filter(RowFilter::Mask(Vec::new()));
        assert_eq!(none.row_count(), 0);
        assert_eq!(none.column_names(), df.column_names());
    }

    #[test]
    fn filter_by_predicates() {
        let df = frame();
        let big = df.filter(RowFilter::row_predicate(|row| {
            matches!(row.get("n"), Some(Value::Integer(n)) if *n > 15)
        }));
        assert_eq!(big.row_count(), 2);

        let odd = df.filter(RowFilter::predicate(|row, _| row % 2 == 1));
        assert_eq!(
            odd.column("s").expect("s").values(),
            vec![Value::from("w"), Value::from("y")]
        );
    }

    #[test]
    fn filter_recomputes_grouping() {
        let df = DataFrame::new(vec![Vector::integer(vec![1, 2, 1, 2]).with_name("k")], &[])
            .group_by(&["k"]);
        let out = df.filter(RowFilter::Indices(vec![2, 3, 4]));
        assert_eq!(out.groups(), Some(&[vec![1, 3], vec![2]][..]));
    }
}
