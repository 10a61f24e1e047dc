#![forbid(unsafe_code)]

mod arrange;
mod filter;
mod options;
mod select;

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, trace};
use vf_columnar::{Vector, partition_rows};

pub use filter::{Row, RowFilter};
pub use options::{Anchor, FrameOption, FrameOptions, Grouping};
pub use select::{ColumnRef, Selector};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("duplicate column name `{name}`")]
    DuplicateColumnName { name: String },
    #[error("expected {expected} column names, got {actual}")]
    ColumnCountMismatch { expected: usize, actual: usize },
}

/// Ordered collection of equal-length named columns, optionally carrying a
/// group partition.
///
/// Operators never mutate a frame; they return a new frame whose columns share
/// buffers with the input wherever the data is unchanged. Only the name
/// setters work in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataFrame {
    columns: Vec<Vector>,
    column_names: Vec<String>,
    row_count: usize,
    grouping: Option<Grouping>,
}

fn saturating_i64_to_usize(value: i64) -> usize {
    if value < 0 {
        0
    } else {
        usize::try_from(value).unwrap_or(usize::MAX)
    }
}

fn saturating_i64_abs_to_usize(value: i64) -> usize {
    usize::try_from(value.unsigned_abs()).unwrap_or(usize::MAX)
}

fn normalize_head_take(n: i64, len: usize) -> usize {
    if n >= 0 {
        saturating_i64_to_usize(n).min(len)
    } else {
        len.saturating_sub(saturating_i64_abs_to_usize(n))
    }
}

fn normalize_tail_window(n: i64, len: usize) -> (usize, usize) {
    if n >= 0 {
        let take = saturating_i64_to_usize(n).min(len);
        (len - take, take)
    } else {
        let skip = saturating_i64_abs_to_usize(n).min(len);
        (skip, len - skip)
    }
}

impl DataFrame {
    /// Build a frame from columns of possibly different lengths.
    ///
    /// The row count is the longest column's length and shorter columns are
    /// padded with NA. Column `i` is named by the `ColumnNames` option when it
    /// has an `i`-th entry, else by the vector's own name, else `V{i+1}`.
    #[must_use]
    pub fn new(columns: Vec<Vector>, options: &[FrameOption]) -> Self {
        let options = FrameOptions::merge(options);
        let names = options.column_names.unwrap_or_default();
        let named = columns
            .into_iter()
            .enumerate()
            .map(|(i, column)| {
                let name = names
                    .get(i)
                    .cloned()
                    .or_else(|| column.name().map(str::to_owned))
                    .unwrap_or_else(|| format!("V{}", i + 1));
                (name, column)
            })
            .collect();

        let frame = Self::assemble(named);
        match options.group_index {
            Some(grouping) => frame.attach_grouping(grouping),
            None => frame,
        }
    }

    fn assemble(named: Vec<(String, Vector)>) -> Self {
        let row_count = named
            .iter()
            .map(|(_, column)| column.len())
            .max()
            .unwrap_or(0);
        let mut columns = Vec::with_capacity(named.len());
        let mut column_names = Vec::with_capacity(named.len());
        for (name, column) in named {
            columns.push(column.fit(row_count).with_name(name.clone()));
            column_names.push(name);
        }
        Self {
            columns,
            column_names,
            row_count,
            grouping: None,
        }
    }

    fn named_columns(&self) -> impl Iterator<Item = (String, Vector)> + '_ {
        self.column_names
            .iter()
            .cloned()
            .zip(self.columns.iter().cloned())
    }

    fn attach_grouping(mut self, grouping: Grouping) -> Self {
        let keys_exist = grouping.keys().iter().all(|key| self.column(key).is_some());
        if !grouping.keys().is_empty() && keys_exist && grouping.fits(self.row_count) {
            self.grouping = Some(grouping);
        } else {
            debug!(
                keys = ?grouping.keys(),
                rows = self.row_count,
                "group index does not fit frame; leaving frame ungrouped"
            );
        }
        self
    }

    fn compute_grouping(&self, keys: Vec<String>) -> Grouping {
        let key_columns: Vec<&Vector> = keys.iter().filter_map(|key| self.column(key)).collect();
        let rows: Vec<usize> = (1..=self.row_count).collect();
        let groups = partition_rows(&key_columns, &rows);
        Grouping::new(keys, groups)
    }

    /// Recompute the partition for whichever of `keys` still name a column.
    fn regrouped(mut self, keys: &[String]) -> Self {
        let retained: Vec<String> = keys
            .iter()
            .filter(|key| self.column(key).is_some())
            .cloned()
            .collect();
        let grouping = (!retained.is_empty()).then(|| self.compute_grouping(retained));
        self.grouping = grouping;
        self
    }

    /// Take over `source`'s grouping for a frame with the same rows. The
    /// partition is reused when every key column survived.
    fn carry_grouping(mut self, source: &DataFrame) -> Self {
        match &source.grouping {
            Some(grouping) if grouping.keys().iter().all(|key| self.column(key).is_some()) => {
                self.grouping = Some(grouping.clone());
                self
            }
            _ => self.regrouped(&source.group_keys()),
        }
    }

    fn group_keys(&self) -> Vec<String> {
        self.grouping
            .as_ref()
            .map(|grouping| grouping.keys().to_vec())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn column_names_vector(&self) -> Vector {
        Vector::string(self.column_names.clone())
    }

    #[must_use]
    pub fn columns(&self) -> &[Vector] {
        &self.columns
    }

    /// First column carrying `name`.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Vector> {
        self.column_position(name).map(|pos| &self.columns[pos])
    }

    /// Column at a 0-based position.
    #[must_use]
    pub fn column_at(&self, position: usize) -> Option<&Vector> {
        self.columns.get(position)
    }

    #[must_use]
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|candidate| candidate == name)
    }

    #[must_use]
    pub fn is_grouped(&self) -> bool {
        self.grouping.is_some()
    }

    /// Active grouping column names; empty when ungrouped.
    #[must_use]
    pub fn grouped_by(&self) -> &[String] {
        match &self.grouping {
            Some(grouping) => grouping.keys(),
            None => &[],
        }
    }

    #[must_use]
    pub fn groups(&self) -> Option<&[Vec<usize>]> {
        self.grouping.as_ref().map(Grouping::groups)
    }

    #[must_use]
    pub fn grouping(&self) -> Option<&Grouping> {
        self.grouping.as_ref()
    }

    fn apply_names(&mut self, names: Vec<String>) {
        let keys: Vec<String> = self
            .group_keys()
            .iter()
            .map(|key| match self.column_position(key) {
                Some(pos) => names[pos].clone(),
                None => key.clone(),
            })
            .collect();
        if let Some(grouping) = &mut self.grouping {
            grouping.replace_keys(keys);
        }
        for (column, name) in self.columns.iter_mut().zip(&names) {
            column.set_name(name.clone());
        }
        self.column_names = names;
    }

    /// Replace every column name at once. Names must be unique and match the
    /// column count.
    pub fn set_column_names(&mut self, names: Vec<String>) -> Result<(), FrameError> {
        if names.len() != self.column_count() {
            return Err(FrameError::ColumnCountMismatch {
                expected: self.column_count(),
                actual: names.len(),
            });
        }
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(FrameError::DuplicateColumnName { name: name.clone() });
            }
        }
        self.apply_names(names);
        Ok(())
    }

    /// Rename the first column called `from`. Unknown names are a no-op; a
    /// target name already in use is rejected.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), FrameError> {
        let Some(pos) = self.column_position(from) else {
            debug!(column = from, "rename ignores unknown column");
            return Ok(());
        };
        if from == to {
            return Ok(());
        }
        if self.column_position(to).is_some() {
            return Err(FrameError::DuplicateColumnName { name: to.to_owned() });
        }
        let mut names = self.column_names.clone();
        names[pos] = to.to_owned();
        self.apply_names(names);
        Ok(())
    }

    /// Rows by 1-based index; `0` and out-of-range indices give NA rows.
    #[must_use]
    pub fn by_indices(&self, indices: &[usize]) -> Self {
        let named = self
            .column_names
            .iter()
            .cloned()
            .zip(self.columns.iter().map(|column| column.by_indices(indices)))
            .collect();
        Self::assemble(named).regrouped(&self.group_keys())
    }

    /// First `n` rows; a negative `n` keeps all but the last `-n` rows.
    #[must_use]
    pub fn head(&self, n: i64) -> Self {
        let take = normalize_head_take(n, self.row_count);
        let rows: Vec<usize> = (1..=take).collect();
        self.by_indices(&rows)
    }

    /// Last `n` rows; a negative `n` drops the first `-n` rows.
    #[must_use]
    pub fn tail(&self, n: i64) -> Self {
        let (start, take) = normalize_tail_window(n, self.row_count);
        let rows: Vec<usize> = (start + 1..=start + take).collect();
        self.by_indices(&rows)
    }

    /// Attach a partition by the named key columns. Unknown names are
    /// dropped; with no known name left the frame is returned unchanged.
    #[must_use]
    pub fn group_by<S: AsRef<str>>(&self, keys: &[S]) -> Self {
        let mut resolved: Vec<String> = Vec::with_capacity(keys.len());
        for key in keys {
            let key = key.as_ref();
            if self.column(key).is_none() {
                debug!(column = key, "group_by ignores unknown column");
                continue;
            }
            if !resolved.iter().any(|known| known == key) {
                resolved.push(key.to_owned());
            }
        }
        if resolved.is_empty() {
            return self.clone();
        }
        trace!(keys = ?resolved, rows = self.row_count, "group_by");
        self.clone().regrouped(&resolved)
    }

    #[must_use]
    pub fn ungroup(&self) -> Self {
        let mut frame = self.clone();
        frame.grouping = None;
        frame
    }

    /// Columns of every frame side by side, padded to the tallest frame.
    #[must_use]
    pub fn bind_columns(&self, others: &[&DataFrame]) -> Self {
        let mut named: Vec<(String, Vector)> = self.named_columns().collect();
        for other in others {
            named.extend(other.named_columns());
        }
        Self::assemble(named)
    }

    /// Rows of every frame stacked under this frame's schema. Appended frames
    /// contribute their same-named column, or an NA block of their row count.
    #[must_use]
    pub fn bind_rows(&self, others: &[&DataFrame]) -> Self {
        let named = self
            .named_columns()
            .map(|(name, column)| {
                let combined = others.iter().fold(column, |acc, other| {
                    let segment = other
                        .column(&name)
                        .cloned()
                        .unwrap_or_else(|| Vector::na(other.row_count));
                    acc.append(&segment)
                });
                (name, combined)
            })
            .collect();
        Self::assemble(named)
    }
}
