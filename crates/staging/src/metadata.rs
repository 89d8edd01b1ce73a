//! Per-table sync metadata.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// One row of the sync metadata table, keyed by lowercased table name.
///
/// `last_used_id` is the highest `unique_id` ever assigned to the table. It
/// never decreases, whatever the retention purge has removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub table_name: String,
    pub last_run_date: NaiveDate,
    pub last_run_timestamp: NaiveDateTime,
    pub last_used_id: i64,
}

impl SyncMetadata {
    pub fn new(table_name: &str, now: NaiveDateTime, last_used_id: i64) -> Self {
        Self {
            table_name: table_name.to_lowercase(),
            last_run_date: now.date(),
            last_run_timestamp: now,
            last_used_id,
        }
    }
}

/// Number of tables whose last run falls within `window` of `now`.
pub fn count_fresh(metadata: &[SyncMetadata], now: NaiveDateTime, window: Duration) -> usize {
    let threshold = now.checked_sub_signed(window).unwrap_or(NaiveDateTime::MIN);
    metadata
        .iter()
        .filter(|m| m.last_run_timestamp > threshold)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_new_lowercases_key() {
        let meta = SyncMetadata::new("RF_TEMP", at(16, 9), 42);
        assert_eq!(meta.table_name, "rf_temp");
        assert_eq!(meta.last_run_date, NaiveDate::from_ymd_opt(2025, 10, 16).unwrap());
    }

    #[test]
    fn test_count_fresh() {
        let rows = vec![
            SyncMetadata::new("a", at(16, 9), 1),
            SyncMetadata::new("b", at(15, 10), 1),
            SyncMetadata::new("c", at(14, 9), 1),
        ];
        assert_eq!(count_fresh(&rows, at(16, 9), Duration::hours(24)), 2);
        assert_eq!(count_fresh(&rows, at(20, 0), Duration::hours(24)), 0);
    }

    #[test]
    fn test_count_fresh_with_unbounded_window() {
        let rows = vec![SyncMetadata::new("a", at(1, 0), 1)];
        assert_eq!(count_fresh(&rows, at(16, 9), Duration::MAX), 1);
    }
}
