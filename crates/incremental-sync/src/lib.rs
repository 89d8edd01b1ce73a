//! Incremental sync for biosphere-sync
//!
//! Copies new readings from source tables into per-table staging tables,
//! assigning sequential `unique_id`s from a per-table watermark, purging rows
//! outside the rolling retention window and recording per-table sync metadata.

mod engine;
mod memory;
mod plan;
mod source;
pub mod testing;

pub use engine::{
    resolve_cursor, resolve_watermark, run_incremental_sync, FetchOutcome, SyncReport,
    TableReport, TableState,
};
pub use memory::MemorySource;
pub use plan::{plan_incremental_sync, TablePlan};
pub use source::{PostgresSource, SourceReader};

use chrono::{Duration, NaiveDate, NaiveDateTime};

/// PostgreSQL source connection options
#[derive(Clone, Debug)]
pub struct SourceOpts {
    /// PostgreSQL connection URI
    pub source_uri: String,
    /// Schema holding the source tables
    pub source_schema: String,
    /// Timestamp column of every source table
    pub timestamp_column: String,
    /// Value column of every source table
    pub value_column: String,
}

/// Sync options (non-connection related)
#[derive(Clone, Debug)]
pub struct SyncOpts {
    /// Retention window in days
    pub rolling_window_days: i64,
    /// Added to the latest staged timestamp to form the fetch cursor
    pub timestamp_buffer_secs: u64,
    /// Name of the sync metadata table
    pub metadata_table: String,
}

impl Default for SyncOpts {
    fn default() -> Self {
        Self {
            rolling_window_days: 30,
            timestamp_buffer_secs: 10,
            metadata_table: biosphere_staging::DEFAULT_METADATA_TABLE.to_string(),
        }
    }
}

impl SyncOpts {
    /// Midnight of (today − window). Backfill start and purge cutoff.
    ///
    /// Saturates at the earliest representable date.
    pub fn window_start(&self, now: NaiveDateTime) -> NaiveDateTime {
        midnight(window_start_date(now.date(), self.rolling_window_days).unwrap_or(NaiveDate::MIN))
    }

    /// Midnight of tomorrow. Exclusive upper bound of every fetch.
    pub fn fetch_upper_bound(&self, now: NaiveDateTime) -> NaiveDateTime {
        midnight(now.date().succ_opt().unwrap_or(NaiveDate::MAX))
    }

    /// Latest staged timestamp plus the buffer, or None when that overflows.
    pub fn buffered_cursor(&self, latest: NaiveDateTime) -> Option<NaiveDateTime> {
        let buffer = Duration::try_seconds(i64::try_from(self.timestamp_buffer_secs).ok()?)?;
        latest.checked_add_signed(buffer)
    }
}

/// `today - days`, or None when the window does not fit the calendar.
pub fn window_start_date(today: NaiveDate, days: i64) -> Option<NaiveDate> {
    today.checked_sub_signed(Duration::try_days(days)?)
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}
