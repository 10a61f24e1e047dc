#![forbid(unsafe_code)]

use std::{collections::HashMap, mem::size_of};

use bumpalo::{Bump, collections::Vec as BumpVec};
use tracing::{debug, trace};
use vf_columnar::Vector;
use vf_frame::{DataFrame, FrameOption, FrameOptions};
use vf_types::GroupKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

pub const DEFAULT_ARENA_BUDGET_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinExecutionOptions {
    pub use_arena: bool,
    pub arena_budget_bytes: usize,
}

impl Default for JoinExecutionOptions {
    fn default() -> Self {
        Self {
            use_arena: true,
            arena_budget_bytes: DEFAULT_ARENA_BUDGET_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JoinExecutionTrace {
    used_arena: bool,
    output_rows: usize,
    estimated_bytes: usize,
}

#[derive(Debug, Default)]
struct JoinNode<'a> {
    children: HashMap<GroupKey<'a>, usize>,
    /// 1-based rows; only leaves keep theirs.
    rows: Vec<usize>,
}

/// Key index over one table: level `i` splits each parent's rows by key
/// column `i`. Nodes live in one arena and refer to children by position.
/// Rows with a missing key component get no node, so they never match.
#[derive(Debug)]
struct JoinTree<'a> {
    nodes: Vec<JoinNode<'a>>,
    leaves: Vec<usize>,
}

impl<'a> JoinTree<'a> {
    fn build(keys: &[&'a Vector], row_count: usize) -> Self {
        let mut nodes = vec![JoinNode {
            children: HashMap::new(),
            rows: (1..=row_count).collect(),
        }];
        let mut frontier = vec![0];

        for &key in keys {
            let mut next = Vec::new();
            for parent in frontier {
                let rows = std::mem::take(&mut nodes[parent].rows);
                for group in key.group_rows(&rows) {
                    let Some(value) = group
                        .first()
                        .and_then(|row| row.checked_sub(1))
                        .and_then(|pos| key.key_at(pos))
                    else {
                        continue;
                    };
                    let child = nodes.len();
                    nodes.push(JoinNode {
                        children: HashMap::new(),
                        rows: group,
                    });
                    nodes[parent].children.insert(value, child);
                    next.push(child);
                }
            }
            frontier = next;
        }

        Self {
            nodes,
            leaves: frontier,
        }
    }

    fn leaf_rows(&self, leaf: usize) -> &[usize] {
        &self.nodes[leaf].rows
    }

    /// Rows whose key tuple equals `tuple`; empty when any component is absent.
    fn rows_for(&self, tuple: &[GroupKey<'a>]) -> &[usize] {
        let mut node = 0;
        for key in tuple {
            match self.nodes[node].children.get(key) {
                Some(&child) => node = child,
                None => return &[],
            }
        }
        &self.nodes[node].rows
    }
}

fn key_tuple<'a>(keys: &[&'a Vector], row: usize) -> Option<Vec<GroupKey<'a>>> {
    let pos = row.checked_sub(1)?;
    keys.iter().map(|key| key.key_at(pos)).collect()
}

/// Key columns for a join: the `JoinBy` names, or every left column name,
/// restricted to names present on both sides.
fn join_columns(left: &DataFrame, right: &DataFrame, options: &[FrameOption]) -> Vec<String> {
    let candidates = FrameOptions::merge(options)
        .join_by
        .unwrap_or_else(|| left.column_names().to_vec());
    let mut keys: Vec<String> = Vec::with_capacity(candidates.len());
    for name in candidates {
        let on_both = left.column(&name).is_some() && right.column(&name).is_some();
        if !on_both {
            debug!(column = %name, "join key is not present on both sides; skipping");
            continue;
        }
        if !keys.contains(&name) {
            keys.push(name);
        }
    }
    keys
}

fn estimate_output_rows(
    matches: &[(&[usize], &[usize])],
    unkeyed_left: usize,
    join_type: JoinType,
) -> usize {
    let matched: usize = matches
        .iter()
        .map(|(left_rows, right_rows)| match (right_rows.len(), join_type) {
            (0, JoinType::Left) => left_rows.len(),
            (n, _) => left_rows.len().saturating_mul(n),
        })
        .sum();
    match join_type {
        JoinType::Inner => matched,
        JoinType::Left => matched.saturating_add(unkeyed_left),
    }
}

fn estimate_intermediate_bytes(output_rows: usize) -> usize {
    output_rows.saturating_mul(size_of::<Option<usize>>().saturating_mul(2))
}

/// Emit 0-based `(left, right)` position pairs in left-tree leaf order. Left
/// joins pair unmatched rows, and rows with a missing key, with `None`.
fn fill_positions(
    matches: &[(&[usize], &[usize])],
    left_rows: usize,
    join_type: JoinType,
    mut push: impl FnMut(Option<usize>, Option<usize>),
) {
    let mut covered = vec![false; left_rows];
    for (lefts, rights) in matches {
        for &left_row in *lefts {
            let left_pos = left_row - 1;
            covered[left_pos] = true;
            if rights.is_empty() {
                if join_type == JoinType::Left {
                    push(Some(left_pos), None);
                }
                continue;
            }
            for &right_row in *rights {
                push(Some(left_pos), Some(right_row - 1));
            }
        }
    }
    if join_type == JoinType::Left {
        for (pos, hit) in covered.into_iter().enumerate() {
            if !hit {
                push(Some(pos), None);
            }
        }
    }
}

/// All left columns, then the right columns that are not join keys.
fn materialize(
    left: &DataFrame,
    right: &DataFrame,
    keys: &[String],
    left_positions: &[Option<usize>],
    right_positions: &[Option<usize>],
) -> DataFrame {
    let mut columns = Vec::with_capacity(left.column_count() + right.column_count());
    let mut names = Vec::with_capacity(columns.capacity());
    for (name, column) in left.column_names().iter().zip(left.columns()) {
        columns.push(column.take(left_positions));
        names.push(name.clone());
    }
    for (name, column) in right.column_names().iter().zip(right.columns()) {
        if keys.contains(name) {
            continue;
        }
        columns.push(column.take(right_positions));
        names.push(name.clone());
    }
    DataFrame::new(columns, &[FrameOption::ColumnNames(names)])
}

fn join_with_global_allocator(
    left: &DataFrame,
    right: &DataFrame,
    keys: &[String],
    matches: &[(&[usize], &[usize])],
    join_type: JoinType,
    output_rows: usize,
) -> DataFrame {
    let mut left_positions = Vec::<Option<usize>>::with_capacity(output_rows);
    let mut right_positions = Vec::<Option<usize>>::with_capacity(output_rows);
    fill_positions(matches, left.row_count(), join_type, |l, r| {
        left_positions.push(l);
        right_positions.push(r);
    });
    materialize(left, right, keys, &left_positions, &right_positions)
}

fn join_with_arena(
    left: &DataFrame,
    right: &DataFrame,
    keys: &[String],
    matches: &[(&[usize], &[usize])],
    join_type: JoinType,
    output_rows: usize,
) -> DataFrame {
    let arena = Bump::new();
    let mut left_positions = BumpVec::<Option<usize>>::with_capacity_in(output_rows, &arena);
    let mut right_positions = BumpVec::<Option<usize>>::with_capacity_in(output_rows, &arena);
    fill_positions(matches, left.row_count(), join_type, |l, r| {
        left_positions.push(l);
        right_positions.push(r);
    });
    materialize(
        left,
        right,
        keys,
        left_positions.as_slice(),
        right_positions.as_slice(),
    )
}

fn join_with_trace(
    left: &DataFrame,
    right: &DataFrame,
    join_type: JoinType,
    options: &[FrameOption],
    execution: JoinExecutionOptions,
) -> (DataFrame, JoinExecutionTrace) {
    let keys = join_columns(left, right, options);
    if keys.is_empty() {
        debug!(?join_type, "join has no key columns; returning left frame");
        return (
            left.clone(),
            JoinExecutionTrace {
                used_arena: false,
                output_rows: left.row_count(),
                estimated_bytes: 0,
            },
        );
    }

    let left_keys: Vec<&Vector> = keys.iter().filter_map(|key| left.column(key)).collect();
    let right_keys: Vec<&Vector> = keys.iter().filter_map(|key| right.column(key)).collect();
    let left_tree = JoinTree::build(&left_keys, left.row_count());
    let right_tree = JoinTree::build(&right_keys, right.row_count());

    let matches: Vec<(&[usize], &[usize])> = left_tree
        .leaves
        .iter()
        .map(|&leaf| {
            let rows = left_tree.leaf_rows(leaf);
            let partners = rows
                .first()
                .and_then(|&row| key_tuple(&left_keys, row))
                .map_or(&[][..], |tuple| right_tree.rows_for(&tuple));
            (rows, partners)
        })
        .collect();

    let keyed_left: usize = matches.iter().map(|(rows, _)| rows.len()).sum();
    let output_rows = estimate_output_rows(&matches, left.row_count() - keyed_left, join_type);
    let estimated_bytes = estimate_intermediate_bytes(output_rows);
    let use_arena = execution.use_arena && estimated_bytes <= execution.arena_budget_bytes;

    trace!(
        ?join_type,
        keys = ?keys,
        left_rows = left.row_count(),
        right_rows = right.row_count(),
        output_rows,
        use_arena,
        "join"
    );

    let joined = if use_arena {
        join_with_arena(left, right, &keys, &matches, join_type, output_rows)
    } else {
        join_with_global_allocator(left, right, &keys, &matches, join_type, output_rows)
    };

    (
        joined,
        JoinExecutionTrace {
            used_arena: use_arena,
            output_rows,
            estimated_bytes,
        },
    )
}

/// Join two frames on equal key tuples. Keys come from the `JoinBy` option,
/// else all column names common to both frames. The result is ungrouped;
/// with no usable key column the left frame is returned unchanged.
#[must_use]
pub fn join(
    left: &DataFrame,
    right: &DataFrame,
    join_type: JoinType,
    options: &[FrameOption],
) -> DataFrame {
    join_with_options(left, right, join_type, options, JoinExecutionOptions::default())
}

#[must_use]
pub fn join_with_options(
    left: &DataFrame,
    right: &DataFrame,
    join_type: JoinType,
    options: &[FrameOption],
    execution: JoinExecutionOptions,
) -> DataFrame {
    let (joined, _) = join_with_trace(left, right, join_type, options, execution);
    joined
}

#[must_use]
pub fn inner_join(left: &DataFrame, right: &DataFrame, options: &[FrameOption]) -> DataFrame {
    join(left, right, JoinType::Inner, options)
}

/// Like [`inner_join`], but every left row is kept; unmatched rows get NA in
/// the right-hand columns.
#[must_use]
pub fn left_join(left: &DataFrame, right: &DataFrame, options: &[FrameOption]) -> DataFrame {
    join(left, right, JoinType::Left, options)
}
