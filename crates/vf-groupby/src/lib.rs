#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;
use vf_columnar::Vector;
use vf_frame::{DataFrame, FrameOption};
use vf_types::{Domain, TypeError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GroupByError {
    #[error("aggregation column `{name}` does not exist")]
    UnknownColumn { name: String },
    #[error("cannot {func} column `{column}`: {source}")]
    Type {
        func: AggFunc,
        column: String,
        #[source]
        source: TypeError,
    },
}

/// Aggregation function selector for [`summarize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggFunc {
    Sum,
    Mean,
    Count,
    Min,
    Max,
}

impl AggFunc {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Count => "count",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

impl std::fmt::Display for AggFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    pub column: String,
    pub func: AggFunc,
    /// Output column name; defaults to `{func}_{column}`.
    pub output: Option<String>,
}

impl Aggregation {
    pub fn new(column: impl Into<String>, func: AggFunc) -> Self {
        Self {
            column: column.into(),
            func,
            output: None,
        }
    }

    #[must_use]
    pub fn named(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    fn output_name(&self) -> String {
        self.output
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.func, self.column))
    }
}

/// Non-missing values of `column` at the 1-based `rows`, as `f64`.
fn numeric_values(column: &Vector, rows: &[usize]) -> Result<Vec<f64>, TypeError> {
    let mut values = Vec::with_capacity(rows.len());
    for &row in rows {
        let value = column.value(row - 1);
        if value.is_na() {
            continue;
        }
        values.push(value.to_f64()?);
    }
    Ok(values)
}

fn aggregate(column: &Vector, groups: &[Vec<usize>], func: AggFunc) -> Result<Vector, TypeError> {
    if func == AggFunc::Count {
        let counts = groups
            .iter()
            .map(|rows| rows.iter().filter(|&&row| !column.is_na(row - 1)).count() as i64)
            .collect();
        return Ok(Vector::integer(counts));
    }

    let domain = column.domain();
    if !domain.is_numeric() && !matches!(domain, Domain::Any | Domain::Na) {
        return Err(TypeError::NonNumeric { domain });
    }

    let mut out = Vec::with_capacity(groups.len());
    for rows in groups {
        let values = numeric_values(column, rows)?;
        let result = match func {
            AggFunc::Sum => Some(values.iter().sum()),
            AggFunc::Mean => {
                (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
            }
            AggFunc::Min => (!values.is_empty())
                .then(|| values.iter().copied().fold(f64::INFINITY, f64::min)),
            AggFunc::Max => (!values.is_empty())
                .then(|| values.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
            AggFunc::Count => None,
        };
        out.push(result);
    }
    Ok(Vector::from_options(out))
}

/// One row per group, in partition order: the grouping key columns, then
/// one column per aggregation. An ungrouped frame is a single group.
///
/// Missing values are skipped. Sum of an empty group is `0`; Mean, Min and
/// Max of an empty group are NA. Count is integer, everything else float.
pub fn summarize(
    frame: &DataFrame,
    aggregations: &[Aggregation],
) -> Result<DataFrame, GroupByError> {
    let whole: Vec<Vec<usize>>;
    let groups: &[Vec<usize>] = match frame.groups() {
        Some(groups) => groups,
        None => {
            whole = vec![(1..=frame.row_count()).collect()];
            &whole
        }
    };
    trace!(
        groups = groups.len(),
        aggregations = aggregations.len(),
        "summarize"
    );

    let firsts: Vec<usize> = groups
        .iter()
        .map(|rows| rows.first().copied().unwrap_or(0))
        .collect();

    let mut columns = Vec::with_capacity(frame.grouped_by().len() + aggregations.len());
    let mut names = Vec::with_capacity(columns.capacity());
    for key in frame.grouped_by() {
        if let Some(column) = frame.column(key) {
            columns.push(column.by_indices(&firsts));
            names.push(key.clone());
        }
    }

    for aggregation in aggregations {
        let column = frame
            .column(&aggregation.column)
            .ok_or_else(|| GroupByError::UnknownColumn {
                name: aggregation.column.clone(),
            })?;
        let aggregated =
            aggregate(column, groups, aggregation.func).map_err(|source| GroupByError::Type {
                func: aggregation.func,
                column: aggregation.column.clone(),
                source,
            })?;
        columns.push(aggregated);
        names.push(aggregation.output_name());
    }

    Ok(DataFrame::new(columns, &[FrameOption::ColumnNames(names)]))
}

/// Convenience: per-group sum of one column, named `sum_{column}`.
pub fn sum(frame: &DataFrame, column: &str) -> Result<DataFrame, GroupByError> {
    summarize(frame, &[Aggregation::new(column, AggFunc::Sum)])
}
