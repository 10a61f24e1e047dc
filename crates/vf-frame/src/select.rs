use tracing::{debug, trace};
use vf_columnar::Vector;

use crate::{Anchor, DataFrame, FrameOption, FrameOptions};

/// A column addressed by name or by 1-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    Name(String),
    Index(usize),
}

impl From<&str> for ColumnRef {
    fn from(value: &str) -> Self {
        Self::Name(value.to_owned())
    }
}

impl From<String> for ColumnRef {
    fn from(value: String) -> Self {
        Self::Name(value)
    }
}

impl From<usize> for ColumnRef {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}

/// One step of a column selection, evaluated against the running working
/// set of columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Name(String),
    Exclude(String),
    /// 1-based position in the original column order.
    Index(usize),
    /// Cycled or truncated to the column count.
    Mask(Vec<bool>),
    /// Inclusive; walks backwards when `to` precedes `from`.
    Range { from: ColumnRef, to: ColumnRef },
}

impl Selector {
    pub fn range(from: impl Into<ColumnRef>, to: impl Into<ColumnRef>) -> Self {
        Self::Range {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// `"-name"` excludes `name`; any other string selects by name.
impl From<&str> for Selector {
    fn from(value: &str) -> Self {
        match value.strip_prefix('-') {
            Some(name) => Self::Exclude(name.to_owned()),
            None => Self::Name(value.to_owned()),
        }
    }
}

impl From<String> for Selector {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<usize> for Selector {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}

impl From<Vec<bool>> for Selector {
    fn from(value: Vec<bool>) -> Self {
        Self::Mask(value)
    }
}

fn include(working: &mut Vec<usize>, position: usize) {
    if !working.contains(&position) {
        working.push(position);
    }
}

impl DataFrame {
    fn resolve_column(&self, column: &ColumnRef) -> Option<usize> {
        match column {
            ColumnRef::Name(name) => self.column_position(name),
            ColumnRef::Index(index) => index
                .checked_sub(1)
                .filter(|&position| position < self.column_count()),
        }
    }

    /// 0-based column positions chosen by `selectors`, in selection order.
    fn selected_positions(&self, selectors: &[Selector]) -> Vec<usize> {
        let count = self.column_count();
        // A leading exclusion removes from the full schema.
        let mut working: Vec<usize> = match selectors.first() {
            Some(Selector::Exclude(_)) => (0..count).collect(),
            _ => Vec::new(),
        };

        for selector in selectors {
            match selector {
                Selector::Name(name) => match self.column_position(name) {
                    Some(position) => include(&mut working, position),
                    None => debug!(column = %name, "select ignores unknown column"),
                },
                Selector::Exclude(name) => {
                    working.retain(|&position| self.column_names[position] != *name);
                }
                Selector::Index(index) => match self.resolve_column(&ColumnRef::Index(*index)) {
                    Some(position) => include(&mut working, position),
                    None => debug!(index, "select ignores out-of-range column index"),
                },
                Selector::Mask(mask) => {
                    if mask.is_empty() {
                        debug!("select ignores empty column mask");
                        continue;
                    }
                    for position in 0..count {
                        if mask[position % mask.len()] {
                            include(&mut working, position);
                        }
                    }
                }
                Selector::Range { from, to } => {
                    match (self.resolve_column(from), self.resolve_column(to)) {
                        (Some(start), Some(end)) if start <= end => {
                            for position in start..=end {
                                include(&mut working, position);
                            }
                        }
                        (Some(start), Some(end)) => {
                            for position in (end..=start).rev() {
                                include(&mut working, position);
                            }
                        }
                        _ => debug!(?from, ?to, "select ignores unresolvable column range"),
                    }
                }
            }
        }
        working
    }

    /// Slot in `order` (0-based column positions) where a block anchored at
    /// `anchor` is inserted.
    fn anchor_slot(&self, order: &[usize], anchor: &Anchor) -> Option<usize> {
        let (name, offset) = match anchor {
            Anchor::Before(name) => (name, 0),
            Anchor::After(name) => (name, 1),
        };
        let slot = order
            .iter()
            .position(|&position| self.column_names[position] == *name)
            .map(|index| index + offset);
        if slot.is_none() {
            debug!(anchor = %name, "unresolvable anchor; appending at the end");
        }
        slot
    }

    fn insertion_slot(&self, order: &[usize], options: &[FrameOption]) -> usize {
        FrameOptions::merge(options)
            .anchor
            .and_then(|anchor| self.anchor_slot(order, &anchor))
            .unwrap_or(order.len())
    }

    fn project(&self, positions: &[usize]) -> Self {
        let named = positions
            .iter()
            .map(|&position| {
                (
                    self.column_names[position].clone(),
                    self.columns[position].clone(),
                )
            })
            .collect();
        Self::assemble(named).carry_grouping(self)
    }

    /// Columns chosen by `selectors`, evaluated left to right. Unknown or
    /// invalid selectors are ignored.
    #[must_use]
    pub fn select(&self, selectors: &[Selector]) -> Self {
        trace!(selectors = selectors.len(), columns = self.column_count(), "select");
        self.project(&self.selected_positions(selectors))
    }

    /// Move the selected columns as one block to the end, or next to the
    /// `Before`/`After` anchor column.
    #[must_use]
    pub fn relocate(&self, selectors: &[Selector], options: &[FrameOption]) -> Self {
        let moved = self.selected_positions(selectors);
        if moved.is_empty() {
            return self.clone();
        }
        let mut order: Vec<usize> = (0..self.column_count())
            .filter(|position| !moved.contains(position))
            .collect();
        let at = self.insertion_slot(&order, options);
        order.splice(at..at, moved);
        self.project(&order)
    }

    /// Insert or replace named columns. Replacements keep their position; new
    /// columns go as one block at the anchor, or at the end. Every column is
    /// padded or truncated to the frame's row count.
    #[must_use]
    pub fn mutate(&self, columns: Vec<Vector>, options: &[FrameOption]) -> Self {
        let target = if self.columns.is_empty() {
            columns.iter().map(Vector::len).max().unwrap_or(0)
        } else {
            self.row_count
        };

        let mut named: Vec<(String, Vector)> = self.named_columns().collect();
        let mut added: Vec<(String, Vector)> = Vec::new();
        for column in columns {
            let Some(name) = column.name().map(str::to_owned) else {
                debug!(domain = %column.domain(), "mutate skips unnamed column");
                continue;
            };
            let column = column.fit(target);
            if let Some(slot) = named.iter_mut().find(|(existing, _)| *existing == name) {
                slot.1 = column;
            } else if let Some(slot) = added.iter_mut().find(|(existing, _)| *existing == name) {
                slot.1 = column;
            } else {
                added.push((name, column));
            }
        }

        let order: Vec<usize> = (0..named.len()).collect();
        let at = self.insertion_slot(&order, options);
        named.splice(at..at, added);
        Self::assemble(named).regrouped(&self.group_keys())
    }
}
