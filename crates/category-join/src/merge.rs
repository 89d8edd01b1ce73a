//! Relational merge of two frames on `unique_id`.

use std::collections::BTreeMap;

use sync_core::{Cell, JoinPolicy, TableData, UNIQUE_ID_COLUMN};
use tracing::debug;

/// Merge `right` into `left` on their `unique_id` columns.
///
/// The output holds `unique_id`, then the other columns of `left`, then the
/// other columns of `right`. A column name present on both sides gets `_x` on
/// the left and `_y` on the right. Every matching pair of rows produces one
/// output row.
///
/// - [`JoinPolicy::Inner`] keeps ids present on both sides, in `left` order.
/// - [`JoinPolicy::Outer`] keeps every id, ascending, with nulls on the side
///   that lacks it.
///
/// Rows whose id is null or not an integer never match and are dropped.
pub fn merge_frames(left: &TableData, right: &TableData, policy: JoinPolicy) -> TableData {
    let left_key = left.column_index(UNIQUE_ID_COLUMN);
    let right_key = right.column_index(UNIQUE_ID_COLUMN);
    let left_rest = other_columns(left, left_key);
    let right_rest = other_columns(right, right_key);

    let mut columns = vec![UNIQUE_ID_COLUMN.to_string()];
    columns.extend(suffixed(left, &left_rest, right, &right_rest, "_x"));
    columns.extend(suffixed(right, &right_rest, left, &left_rest, "_y"));
    let mut out = TableData::new(columns);

    let left_index = index_by_id(left, left_key);
    let right_index = index_by_id(right, right_key);

    let pick = |row: &[Cell], cols: &[usize]| -> Vec<Cell> {
        cols.iter().map(|&i| row[i].clone()).collect()
    };
    let nulls = |n: usize| vec![Cell::Null; n];
    let mut emit = |id: i64, l: Vec<Cell>, r: Vec<Cell>| {
        let mut row = Vec::with_capacity(1 + l.len() + r.len());
        row.push(Cell::Int(id));
        row.extend(l);
        row.extend(r);
        out.rows.push(row);
    };

    match policy {
        JoinPolicy::Inner => {
            for row in &left.rows {
                let Some(id) = key_of(row, left_key) else {
                    continue;
                };
                for &r in right_index.get(&id).into_iter().flatten() {
                    emit(id, pick(row, &left_rest), pick(&right.rows[r], &right_rest));
                }
            }
        }
        JoinPolicy::Outer => {
            let mut ids: Vec<i64> = left_index.keys().chain(right_index.keys()).copied().collect();
            ids.sort_unstable();
            ids.dedup();
            for id in ids {
                match (left_index.get(&id), right_index.get(&id)) {
                    (Some(ls), Some(rs)) => {
                        for &l in ls {
                            for &r in rs {
                                emit(
                                    id,
                                    pick(&left.rows[l], &left_rest),
                                    pick(&right.rows[r], &right_rest),
                                );
                            }
                        }
                    }
                    (Some(ls), None) => {
                        for &l in ls {
                            emit(id, pick(&left.rows[l], &left_rest), nulls(right_rest.len()));
                        }
                    }
                    (None, Some(rs)) => {
                        for &r in rs {
                            emit(id, nulls(left_rest.len()), pick(&right.rows[r], &right_rest));
                        }
                    }
                    (None, None) => {}
                }
            }
        }
    }

    debug!(
        "{} merge: {} x {} rows -> {} rows",
        policy,
        left.len(),
        right.len(),
        out.len()
    );
    out
}

fn other_columns(frame: &TableData, key: Option<usize>) -> Vec<usize> {
    (0..frame.columns.len()).filter(|&i| Some(i) != key).collect()
}

fn suffixed(
    frame: &TableData,
    cols: &[usize],
    other: &TableData,
    other_cols: &[usize],
    suffix: &str,
) -> Vec<String> {
    cols.iter()
        .map(|&i| {
            let name = &frame.columns[i];
            let collides = other_cols.iter().any(|&j| &other.columns[j] == name);
            if collides {
                format!("{name}{suffix}")
            } else {
                name.clone()
            }
        })
        .collect()
}

fn key_of(row: &[Cell], key: Option<usize>) -> Option<i64> {
    key.and_then(|k| row.get(k)).and_then(Cell::as_i64)
}

fn index_by_id(frame: &TableData, key: Option<usize>) -> BTreeMap<i64, Vec<usize>> {
    let mut index: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (pos, row) in frame.rows.iter().enumerate() {
        if let Some(id) = key_of(row, key) {
            index.entry(id).or_default().push(pos);
        }
    }
    index
}
