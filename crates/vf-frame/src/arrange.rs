use tracing::{debug, trace};
use vf_columnar::Vector;

use crate::{DataFrame, FrameOption, FrameOptions};

/// Stable order of the 1-based `rows` by `keys`. Each run of rows tied on one
/// key is re-sorted in place by the next key.
fn arrange_rows(keys: &[&Vector], rows: &[usize]) -> Vec<usize> {
    let Some((first, rest)) = keys.split_first() else {
        return rows.to_vec();
    };
    let (mut order, ranks) = first.sort_rows(rows);
    if rest.is_empty() {
        return order;
    }

    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && ranks[end] == ranks[start] {
            end += 1;
        }
        if end - start > 1 {
            let run = arrange_rows(rest, &order[start..end]);
            order[start..end].copy_from_slice(&run);
        }
        start = end;
    }
    order
}

impl DataFrame {
    /// Sort rows ascending by the named columns, NA last in each column.
    ///
    /// Later keys only break ties left by earlier ones. `ArrangeReverse(true)`
    /// reverses the final order. Unknown names are dropped; with no known name
    /// left the frame is returned unchanged.
    #[must_use]
    pub fn arrange<S: AsRef<str>>(&self, keys: &[S], options: &[FrameOption]) -> Self {
        let mut key_columns = Vec::with_capacity(keys.len());
        for key in keys {
            match self.column(key.as_ref()) {
                Some(column) => key_columns.push(column),
                None => debug!(column = key.as_ref(), "arrange ignores unknown column"),
            }
        }
        if key_columns.is_empty() {
            return self.clone();
        }
        trace!(keys = key_columns.len(), rows = self.row_count, "arrange");

        let rows: Vec<usize> = (1..=self.row_count).collect();
        let mut order = arrange_rows(&key_columns, &rows);
        if FrameOptions::merge(options).arrange_reverse {
            order.reverse();
        }
        self.by_indices(&order)
    }
}

#[cfg(test)]
mod tests {
    use vf_columnar::{Value, Vector};

    use crate::{DataFrame, FrameOption};

    fn staff() -> DataFrame {
        DataFrame::new(
            vec![
                Vector::from_options(vec![Some(2_i64), Some(1), None, Some(1), Some(2)])
                    .with_name("type"),
                Vector::integer(vec![300, 120, 50, 100, 200]).with_name("salary"),
                Vector::string(["e", "b", "x", "a", "d"]).with_name("id"),
            ],
            &[],
        )
    }

    fn ids(df: &DataFrame) -> Vec<Value> {
        df.column("id").expect("id").values()
    }

    fn strs(values: &[&str]) -> Vec<Value> {
        values.iter().map(|v| Value::from(*v)).collect()
    }

    #[test]
    fn single_key_is_stable_with_na_last() {
        let out = staff().arrange(&["type"], &[]);
        assert_eq!(ids(&out), strs(&["b", "a", "e", "d", "x"]));
    }

    #[test]
    fn ties_are_broken_by_the_next_key() {
        let out = staff().arrange(&["type", "salary"], &[]);
        assert_eq!(ids(&out), strs(&["a", "b", "d", "e", "x"]));
        let salaries = out.column("salary").expect("salary").values();
        assert_eq!(salaries[0], Value::Integer(100));
        assert_eq!(salaries[1], Value::Integer(120));
    }

    #[test]
    fn reverse_flips_the_resolved_order() {
        let out = staff().arrange(&["type", "salary"], &[FrameOption::ArrangeReverse(true)]);
        assert_eq!(ids(&out), strs(&["x", "e", "d", "b", "a"]));
    }

    #[test]
    fn unknown_keys_are_dropped() {
        let df = staff();
        assert_eq!(df.arrange(&["nope"], &[]), df);
        let out = df.arrange(&["nope", "salary"], &[]);
        assert_eq!(ids(&out), strs(&["x", "a", "b", "d", "e"]));
    }

    fn keyed(key: Vector) -> DataFrame {
        DataFrame::new(
            vec![key.with_name("k"), Vector::integer(vec![3, 1, 2]).with_name("v")],
            &[],
        )
    }

    #[test]
    fn mixed_domain_any_keys_tie_only_where_groups_merge() {
        let df = keyed(Vector::any(vec![
            Value::Integer(1),
            Value::Boolean(true),
            Value::Float(1.0),
        ]));
        assert_eq!(
            df.group_by(&["k"]).groups(),
            Some(&[vec![1], vec![2], vec![3]][..])
        );
        let out = df.arrange(&["k", "v"], &[]);
        assert_eq!(
            out.column("v").expect("v").values(),
            vec![Value::Integer(1), Value::Integer(3), Value::Integer(2)]
        );
    }

    #[test]
    fn signed_nan_keys_form_one_tie() {
        let df = keyed(Vector::float(vec![f64::NAN, -f64::NAN, f64::NAN]));
        assert_eq!(df.group_by(&["k"]).groups(), Some(&[vec![1, 2, 3]][..]));
        let out = df.arrange(&["k", "v"], &[]);
        assert_eq!(
            out.column("v").expect("v").values(),
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
        );
    }

    #[test]
    fn arrange_keeps_grouping_on_new_row_order() {
        let out = staff().group_by(&["type"]).arrange(&["salary"], &[]);
        assert_eq!(out.grouped_by(), ["type"]);
        // salary order: x(NA) a(1) b(1) d(2) e(2)
        assert_eq!(out.groups(), Some(&[vec![2, 3], vec![4, 5], vec![1]][..]));
    }
}
