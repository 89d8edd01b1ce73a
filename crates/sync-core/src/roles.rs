//! Column-role derivation for staging and joined tables.
//!
//! These are pure functions over discovered column names so they can be
//! tested without a database connection.

use crate::{Category, PipelineError, TIMESTAMP_COLUMN, UNIQUE_ID_COLUMN};

/// Staging tables need `unique_id`, `timestamp` and a value column.
pub const MIN_STAGING_COLUMNS: usize = 3;

/// Which columns of a staging table take part in a category join, and the
/// names they carry in the joined output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRoles {
    /// Identifier column as spelled in the table
    pub id_column: String,
    /// Timestamp column as spelled in the table, when it is selected
    pub timestamp_column: Option<String>,
    /// Value column as spelled in the table
    pub value_column: String,
    /// Output name of the timestamp column, when it is selected
    pub output_timestamp: Option<String>,
}

impl ColumnRoles {
    /// `(input column, output column)` pairs in output order.
    pub fn projection(&self) -> Vec<(String, String)> {
        let mut out = vec![(self.id_column.clone(), UNIQUE_ID_COLUMN.to_string())];
        if let (Some(input), Some(output)) = (&self.timestamp_column, &self.output_timestamp) {
            out.push((input.clone(), output.clone()));
        }
        out.push((self.value_column.clone(), self.value_column.clone()));
        out
    }
}

fn is_reserved(column: &str) -> bool {
    column.eq_ignore_ascii_case(UNIQUE_ID_COLUMN) || column.eq_ignore_ascii_case(TIMESTAMP_COLUMN)
}

fn find<'a>(columns: &'a [String], name: &str) -> Option<&'a String> {
    columns.iter().find(|c| c.eq_ignore_ascii_case(name))
}

/// Derive the roles of a table's columns for a category join.
///
/// The value column is the first column, in schema order, that is neither
/// `timestamp` nor `unique_id`; extra value columns are ignored. The base
/// table (first in the category) always keeps its timestamp; later tables
/// keep theirs only in outer-family categories, where it is renamed to
/// `timestamp_<value_column>`.
pub fn derive_column_roles(
    category: Category,
    table: &str,
    columns: &[String],
    is_base: bool,
) -> Result<ColumnRoles, PipelineError> {
    if !is_base && columns.len() < MIN_STAGING_COLUMNS {
        return Err(PipelineError::schema(
            table,
            format!(
                "has {} columns, expected at least {MIN_STAGING_COLUMNS}",
                columns.len()
            ),
        ));
    }

    let value_column = columns
        .iter()
        .find(|c| !is_reserved(c))
        .ok_or_else(|| PipelineError::schema(table, "no value column besides timestamp/unique_id"))?
        .clone();

    let id_column = find(columns, UNIQUE_ID_COLUMN)
        .ok_or_else(|| PipelineError::schema(table, "missing unique_id column"))?
        .clone();

    let keep_timestamp = is_base || category.tags_timestamps();
    let (timestamp_column, output_timestamp) = if keep_timestamp {
        let input = find(columns, TIMESTAMP_COLUMN)
            .ok_or_else(|| PipelineError::schema(table, "missing timestamp column"))?
            .clone();
        let output = if category.tags_timestamps() {
            format!("{TIMESTAMP_COLUMN}_{value_column}")
        } else {
            TIMESTAMP_COLUMN.to_string()
        };
        (Some(input), Some(output))
    } else {
        (None, None)
    };

    Ok(ColumnRoles {
        id_column,
        timestamp_column,
        value_column,
        output_timestamp,
    })
}

/// Timestamp column a reader of a joined table should filter and order on.
///
/// Inner-family tables use the literal `timestamp` column; outer-family
/// tables use their first provenance-tagged `timestamp_<value>` column.
pub fn resolve_timestamp_column(category: Category, columns: &[String]) -> String {
    let resolved = if category.tags_timestamps() {
        columns
            .iter()
            .find(|c| c.starts_with("timestamp_"))
            .or_else(|| columns.iter().find(|c| c.as_str() == TIMESTAMP_COLUMN))
    } else {
        columns
            .iter()
            .find(|c| c.as_str() == TIMESTAMP_COLUMN)
            .or_else(|| {
                columns
                    .iter()
                    .find(|c| c.to_lowercase().contains(TIMESTAMP_COLUMN))
            })
    };

    resolved
        .or_else(|| columns.first())
        .cloned()
        .unwrap_or_else(|| UNIQUE_ID_COLUMN.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_inner_base_keeps_plain_timestamp() {
        let roles = derive_column_roles(
            Category::Type1,
            "rf_temp",
            &cols(&["unique_id", "timestamp", "temp"]),
            true,
        )
        .unwrap();
        assert_eq!(
            roles.projection(),
            vec![
                ("unique_id".to_string(), "unique_id".to_string()),
                ("timestamp".to_string(), "timestamp".to_string()),
                ("temp".to_string(), "temp".to_string()),
            ]
        );
    }

    #[test]
    fn test_inner_subsequent_drops_timestamp() {
        let roles = derive_column_roles(
            Category::Type2,
            "rf_rh",
            &cols(&["unique_id", "timestamp", "rh"]),
            false,
        )
        .unwrap();
        assert_eq!(roles.timestamp_column, None);
        assert_eq!(roles.projection().len(), 2);
    }

    #[test]
    fn test_outer_tags_timestamps() {
        for is_base in [true, false] {
            let roles = derive_column_roles(
                Category::Other,
                "rf_co2",
                &cols(&["unique_id", "timestamp", "co2"]),
                is_base,
            )
            .unwrap();
            assert_eq!(roles.output_timestamp.as_deref(), Some("timestamp_co2"));
        }
    }

    #[test]
    fn test_first_non_reserved_column_wins() {
        let roles = derive_column_roles(
            Category::Less50,
            "t",
            &cols(&["Timestamp", "UNIQUE_ID", "a", "b"]),
            false,
        )
        .unwrap();
        assert_eq!(roles.value_column, "a");
        assert_eq!(roles.id_column, "UNIQUE_ID");
        assert_eq!(roles.timestamp_column.as_deref(), Some("Timestamp"));
    }

    #[test]
    fn test_schema_mismatches() {
        let too_few = derive_column_roles(
            Category::Type1,
            "t",
            &cols(&["unique_id", "v"]),
            false,
        );
        assert!(matches!(too_few, Err(PipelineError::SchemaMismatch { .. })));

        let no_value = derive_column_roles(
            Category::Type1,
            "t",
            &cols(&["unique_id", "timestamp"]),
            true,
        );
        assert!(matches!(no_value, Err(PipelineError::SchemaMismatch { .. })));

        let no_id = derive_column_roles(
            Category::Type1,
            "t",
            &cols(&["id", "timestamp", "v"]),
            false,
        );
        assert!(matches!(no_id, Err(PipelineError::SchemaMismatch { .. })));

        let no_ts_in_outer = derive_column_roles(
            Category::Other,
            "t",
            &cols(&["unique_id", "v", "w"]),
            false,
        );
        assert!(matches!(
            no_ts_in_outer,
            Err(PipelineError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_resolve_timestamp_column() {
        assert_eq!(
            resolve_timestamp_column(Category::Type1, &cols(&["unique_id", "timestamp", "t"])),
            "timestamp"
        );
        assert_eq!(
            resolve_timestamp_column(Category::Type1, &cols(&["unique_id", "read_Timestamp"])),
            "read_Timestamp"
        );
        assert_eq!(
            resolve_timestamp_column(
                Category::Other,
                &cols(&["unique_id", "timestamp_a", "a", "timestamp_b", "b"])
            ),
            "timestamp_a"
        );
        assert_eq!(
            resolve_timestamp_column(Category::Less50, &cols(&["unique_id", "timestamp", "a"])),
            "timestamp"
        );
        assert_eq!(
            resolve_timestamp_column(Category::Less50, &cols(&["unique_id", "a"])),
            "unique_id"
        );
        assert_eq!(resolve_timestamp_column(Category::Type2, &[]), "unique_id");
    }
}
