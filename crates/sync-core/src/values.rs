//! Row and cell types moved between the source, staging and joined tables.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Timestamp format used in CSV artifacts and logs.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One reading fetched from a source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRow {
    pub timestamp: NaiveDateTime,
    pub value: Option<f64>,
}

/// A reading with its assigned sequential id, ready to append to staging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedRow {
    pub unique_id: i64,
    pub timestamp: NaiveDateTime,
    pub value: Option<f64>,
}

/// A single value in a staging or joined table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Timestamp(NaiveDateTime),
    Text(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(v) => Some(*v),
            Cell::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Cell::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::Timestamp(ts) => Some(*ts),
            Cell::Text(s) => NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT).ok(),
            _ => None,
        }
    }
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Cell::Null, Cell::Float)
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Int(v) => write!(f, "{v}"),
            Cell::Float(v) => write!(f, "{v}"),
            Cell::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

/// Column names in schema order plus row-major cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl TableData {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build staging-table contents from staged rows.
    pub fn from_staged(value_column: &str, rows: &[StagedRow]) -> Self {
        Self {
            columns: vec![
                crate::UNIQUE_ID_COLUMN.to_string(),
                crate::TIMESTAMP_COLUMN.to_string(),
                value_column.to_string(),
            ],
            rows: rows
                .iter()
                .map(|r| {
                    vec![
                        Cell::Int(r.unique_id),
                        Cell::Timestamp(r.timestamp),
                        Cell::from(r.value),
                    ]
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, compared case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Project the given column positions, renaming them as listed.
    pub fn select(&self, picks: &[(usize, String)]) -> TableData {
        TableData {
            columns: picks.iter().map(|(_, name)| name.clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| {
                    picks
                        .iter()
                        .map(|(idx, _)| row.get(*idx).cloned().unwrap_or(Cell::Null))
                        .collect()
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(Cell::Null.to_string(), "");
        assert_eq!(Cell::Int(7).to_string(), "7");
        assert_eq!(Cell::Float(21.5).to_string(), "21.5");
        assert_eq!(Cell::Timestamp(ts(3)).to_string(), "2025-01-02 03:00:00");
    }

    #[test]
    fn test_cell_conversions() {
        assert_eq!(Cell::Float(4.0).as_i64(), Some(4));
        assert_eq!(Cell::Float(4.5).as_i64(), None);
        assert_eq!(Cell::Text("12".into()).as_i64(), Some(12));
        assert_eq!(
            Cell::Text("2025-01-02 03:00:00".into()).as_timestamp(),
            Some(ts(3))
        );
    }

    #[test]
    fn test_select_renames_and_projects() {
        let rows = [StagedRow {
            unique_id: 1,
            timestamp: ts(1),
            value: Some(2.5),
        }];
        let data = TableData::from_staged("temp", &rows);
        assert_eq!(data.column_index("TIMESTAMP"), Some(1));

        let picked = data.select(&[(0, "unique_id".into()), (2, "temp_x".into())]);
        assert_eq!(picked.columns, vec!["unique_id", "temp_x"]);
        assert_eq!(picked.rows[0], vec![Cell::Int(1), Cell::Float(2.5)]);
    }
}
