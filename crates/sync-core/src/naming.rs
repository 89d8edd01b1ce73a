//! Deterministic naming of staging tables and their value columns.

const AHUR_MARKER: &str = "ahur";

/// Derive the value-column name for a source table.
///
/// 1. If the name contains `ahur` (any case), the column is the tail of the
///    name starting at that match.
/// 2. Otherwise the name is split on `_`. When the last token starts with a
///    digit the column is `<second_to_last>_<last>`, else it is `<last>`.
/// 3. Every character outside `[A-Za-z0-9_]` is replaced with `_`.
///
/// A name ending in `_` has an empty last token; the whole table name is used
/// in that case so the column is never empty.
pub fn value_column_name(table: &str) -> String {
    let raw = match find_ascii_case_insensitive(table, AHUR_MARKER) {
        Some(pos) => &table[pos..],
        None => tail_tokens(table),
    };
    let raw = if raw.is_empty() { table } else { raw };
    sanitize(raw)
}

/// Staging tables are named after the source table, lowercased.
pub fn staging_table_name(table: &str) -> String {
    table.to_lowercase()
}

fn tail_tokens(table: &str) -> &str {
    let Some(last_sep) = table.rfind('_') else {
        return table;
    };
    let last = &table[last_sep + 1..];
    let starts_with_digit = last.chars().next().is_some_and(|c| c.is_ascii_digit());
    if !starts_with_digit {
        return last;
    }
    match table[..last_sep].rfind('_') {
        Some(prev_sep) => &table[prev_sep + 1..],
        None => table,
    }
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    haystack.char_indices().map(|(i, _)| i).find(|&i| {
        haystack
            .get(i..i + needle.len())
            .is_some_and(|window| window.eq_ignore_ascii_case(needle))
    })
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ahur_tail() {
        assert_eq!(value_column_name("SOMEPREFIX_ahur_temp"), "ahur_temp");
        assert_eq!(value_column_name("RF_AHUR3_SUPPLY_TEMP"), "AHUR3_SUPPLY_TEMP");
        assert_eq!(value_column_name("xAhUr"), "AhUr");
    }

    #[test]
    fn test_numeric_last_token_keeps_previous_token() {
        assert_eq!(value_column_name("site_data_2024"), "data_2024");
        assert_eq!(value_column_name("RF_FAN_1"), "FAN_1");
        assert_eq!(value_column_name("2024"), "2024");
        assert_eq!(value_column_name("data_2024"), "data_2024");
    }

    #[test]
    fn test_plain_last_token() {
        assert_eq!(value_column_name("sensor_humidity"), "humidity");
        assert_eq!(value_column_name("humidity"), "humidity");
    }

    #[test]
    fn test_sanitizes_special_characters() {
        assert_eq!(value_column_name("site_co2-ppm"), "co2_ppm");
        assert_eq!(value_column_name("rf_ahur.temp%"), "ahur_temp_");
        assert_eq!(value_column_name("rf_temp°c"), "temp_c");
    }

    #[test]
    fn test_trailing_separator_falls_back_to_whole_name() {
        assert_eq!(value_column_name("rf_temp_"), "rf_temp_");
    }

    #[test]
    fn test_staging_table_name_is_lowercase() {
        assert_eq!(staging_table_name("RF_AHUR_TEMP"), "rf_ahur_temp");
    }
}
