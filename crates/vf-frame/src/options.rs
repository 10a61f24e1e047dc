use serde::{Deserialize, Serialize};

/// Group partition attached to a grouped frame: the grouping column names and
/// the 1-based row groups in first-occurrence order, NA-keyed rows last.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Grouping {
    keys: Vec<String>,
    groups: Vec<Vec<usize>>,
}

impl Grouping {
    #[must_use]
    pub fn new(keys: Vec<String>, groups: Vec<Vec<usize>>) -> Self {
        Self { keys, groups }
    }

    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    #[must_use]
    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    pub(crate) fn replace_keys(&mut self, keys: Vec<String>) {
        self.keys = keys;
    }

    /// A grouping fits a frame when every row `1..=row_count` appears in
    /// exactly one group.
    pub(crate) fn fits(&self, row_count: usize) -> bool {
        let mut seen = vec![false; row_count];
        for &row in self.groups.iter().flatten() {
            let Some(slot) = row.checked_sub(1).and_then(|pos| seen.get_mut(pos)) else {
                return false;
            };
            if *slot {
                return false;
            }
            *slot = true;
        }
        seen.into_iter().all(|hit| hit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    Before(String),
    After(String),
}

/// One named configuration value accepted by frame operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameOption {
    ColumnNames(Vec<String>),
    Before(String),
    After(String),
    ArrangeReverse(bool),
    JoinBy(Vec<String>),
    GroupIndex(Grouping),
}

/// Resolved option set. Each operator reads only the fields it understands.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameOptions {
    pub column_names: Option<Vec<String>>,
    pub anchor: Option<Anchor>,
    pub arrange_reverse: bool,
    pub join_by: Option<Vec<String>>,
    pub group_index: Option<Grouping>,
}

impl FrameOptions {
    /// Fold options left to right; later values overwrite earlier ones.
    /// `Before` and `After` share the anchor slot.
    #[must_use]
    pub fn merge(options: &[FrameOption]) -> Self {
        let mut merged = Self::default();
        for option in options {
            match option {
                FrameOption::ColumnNames(names) => merged.column_names = Some(names.clone()),
                FrameOption::Before(name) => merged.anchor = Some(Anchor::Before(name.clone())),
                FrameOption::After(name) => merged.anchor = Some(Anchor::After(name.clone())),
                FrameOption::ArrangeReverse(reverse) => merged.arrange_reverse = *reverse,
                FrameOption::JoinBy(names) => merged.join_by = Some(names.clone()),
                FrameOption::GroupIndex(grouping) => merged.group_index = Some(grouping.clone()),
            }
        }
        merged
    }
}
