//! Incremental sync engine.
//!
//! Tables are processed one at a time in catalog order. Each table walks the
//! same sequence of states:
//!
//! ```text
//! Start → WatermarkResolved → CursorResolved → Fetched
//!       → {Appended | NoNewData | FetchFailed} → Purged → MetadataUpdated → Done
//! ```
//!
//! A fetch or append failure only skips the append. Purge and the metadata
//! upsert always run, so every catalog table gets a fresh metadata row on every
//! run, with `last_used_id` unchanged when nothing was appended.

use biosphere_staging::{StagingStore, SyncMetadata};
use chrono::NaiveDateTime;
use sync_core::{
    staging_table_name, value_column_name, Catalog, Identifier, IdentifierAllowList,
    PipelineError, SourceRow, StagedRow,
};
use tracing::{debug, info, warn};

use crate::{SourceReader, SyncOpts};

/// Per-table sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Start,
    WatermarkResolved,
    CursorResolved,
    Fetched,
    Appended,
    NoNewData,
    FetchFailed,
    Purged,
    MetadataUpdated,
    Done,
}

impl TableState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableState::Start => "start",
            TableState::WatermarkResolved => "watermark_resolved",
            TableState::CursorResolved => "cursor_resolved",
            TableState::Fetched => "fetched",
            TableState::Appended => "appended",
            TableState::NoNewData => "no_new_data",
            TableState::FetchFailed => "fetch_failed",
            TableState::Purged => "purged",
            TableState::MetadataUpdated => "metadata_updated",
            TableState::Done => "done",
        }
    }
}

impl std::fmt::Display for TableState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the fetch/append step for one table.
#[derive(Debug)]
pub enum FetchOutcome {
    Appended(u64),
    NoNewData,
    FetchFailed(PipelineError),
    AppendFailed(PipelineError),
}

impl FetchOutcome {
    pub fn rows_appended(&self) -> u64 {
        match self {
            FetchOutcome::Appended(n) => *n,
            _ => 0,
        }
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            FetchOutcome::FetchFailed(e) | FetchOutcome::AppendFailed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<&FetchOutcome> for TableState {
    fn from(outcome: &FetchOutcome) -> Self {
        match outcome {
            FetchOutcome::Appended(_) => TableState::Appended,
            FetchOutcome::NoNewData => TableState::NoNewData,
            // An append failure leaves the table exactly where a fetch failure does
            FetchOutcome::FetchFailed(_) | FetchOutcome::AppendFailed(_) => TableState::FetchFailed,
        }
    }
}

/// What happened to one table during a sync run.
#[derive(Debug)]
pub struct TableReport {
    pub table: String,
    pub staging_table: String,
    pub value_column: String,
    pub watermark: i64,
    pub cursor: NaiveDateTime,
    pub outcome: FetchOutcome,
    pub purge: Result<u64, PipelineError>,
    pub metadata: Result<(), PipelineError>,
    /// `last_used_id` written (or attempted) to the metadata table
    pub last_used_id: i64,
}

impl TableReport {
    pub fn rows_appended(&self) -> u64 {
        self.outcome.rows_appended()
    }

    pub fn has_failure(&self) -> bool {
        self.outcome.error().is_some() || self.purge.is_err() || self.metadata.is_err()
    }
}

/// Outcome of a whole sync run.
#[derive(Debug)]
pub struct SyncReport {
    pub started_at: NaiveDateTime,
    pub tables: Vec<TableReport>,
    /// Catalog tables whose names could not be used as identifiers
    pub rejected: Vec<PipelineError>,
}

impl SyncReport {
    pub fn rows_appended(&self) -> u64 {
        self.tables.iter().map(TableReport::rows_appended).sum()
    }

    pub fn rows_purged(&self) -> u64 {
        self.tables
            .iter()
            .filter_map(|t| t.purge.as_ref().ok())
            .sum()
    }

    pub fn failed_tables(&self) -> usize {
        self.tables.iter().filter(|t| t.has_failure()).count() + self.rejected.len()
    }

    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables
            .iter()
            .find(|t| t.table.eq_ignore_ascii_case(name))
    }
}

/// Highest `unique_id` already assigned to a staging table.
///
/// Takes the larger of the metadata value and the staging table's own maximum,
/// so a crash between append and metadata upsert is repaired on the next run.
/// Lookups that fail are logged and ignored; with nothing to go on the
/// watermark is 0.
pub async fn resolve_watermark<S: StagingStore + ?Sized>(store: &S, table: &Identifier) -> i64 {
    let from_metadata = store
        .metadata_last_used_id(table)
        .await
        .unwrap_or_else(|e| {
            warn!("Metadata lookup failed for {}: {:#}", table, e);
            None
        });
    let from_staging = store.max_unique_id(table).await.unwrap_or_else(|e| {
        warn!("Max unique_id lookup failed for {}: {:#}", table, e);
        None
    });
    if let (Some(meta), Some(staged)) = (from_metadata, from_staging) {
        if staged > meta {
            warn!(
                "Metadata for {} is stale (last_used_id {}, staging max {}), resuming from staging",
                table, meta, staged
            );
        }
    }
    from_metadata.into_iter().chain(from_staging).max().unwrap_or(0)
}

/// Lower (exclusive) timestamp bound of the next fetch.
///
/// Latest staged timestamp plus the buffer, or the start of the retention
/// window when the staging table has no rows.
pub async fn resolve_cursor<S: StagingStore + ?Sized>(
    store: &S,
    table: &Identifier,
    opts: &SyncOpts,
    now: NaiveDateTime,
) -> NaiveDateTime {
    match store.max_timestamp(table).await {
        Ok(Some(latest)) => opts.buffered_cursor(latest).unwrap_or(NaiveDateTime::MAX),
        Ok(None) => opts.window_start(now),
        Err(e) => {
            warn!(
                "Max timestamp lookup failed for {}, backfilling the retention window: {:#}",
                table, e
            );
            opts.window_start(now)
        }
    }
}

/// Number rows consecutively from `watermark + 1`, in timestamp order.
pub fn assign_ids(watermark: i64, rows: &[SourceRow]) -> Vec<StagedRow> {
    let mut sorted: Vec<&SourceRow> = rows.iter().collect();
    sorted.sort_by_key(|r| r.timestamp);
    sorted
        .into_iter()
        .zip(watermark + 1..)
        .map(|(row, unique_id)| StagedRow {
            unique_id,
            timestamp: row.timestamp,
            value: row.value,
        })
        .collect()
}

/// Sync every catalog table from `source` into `store`.
///
/// Never aborts: per-table failures are logged and recorded in the report.
/// Source connection failures happen before this is called.
pub async fn run_incremental_sync<S, R>(
    catalog: &Catalog,
    store: &S,
    source: &R,
    opts: &SyncOpts,
    now: NaiveDateTime,
) -> SyncReport
where
    S: StagingStore + ?Sized,
    R: SourceReader + ?Sized,
{
    let mut report = SyncReport {
        started_at: now,
        tables: Vec::with_capacity(catalog.len()),
        rejected: Vec::new(),
    };
    if catalog.is_empty() {
        warn!("Catalog has no tables, nothing to sync");
        return report;
    }

    info!(
        "Starting incremental sync of {} tables from {}",
        catalog.len(),
        source.source_type()
    );
    let allow = catalog.allow_list(&opts.metadata_table);

    for table in catalog.sync_tables() {
        match sync_table(table, &allow, store, source, opts, now).await {
            Ok(table_report) => report.tables.push(table_report),
            Err(e) => {
                warn!("Skipping table {} [{}]: {}", table, e.kind(), e);
                report.rejected.push(e);
            }
        }
    }

    info!(
        "Incremental sync finished: {} tables, {} rows appended, {} rows purged, {} with failures",
        report.tables.len(),
        report.rows_appended(),
        report.rows_purged(),
        report.failed_tables()
    );
    report
}

async fn sync_table<S, R>(
    table: &str,
    allow: &IdentifierAllowList,
    store: &S,
    source: &R,
    opts: &SyncOpts,
    now: NaiveDateTime,
) -> Result<TableReport, PipelineError>
where
    S: StagingStore + ?Sized,
    R: SourceReader + ?Sized,
{
    let source_table = Identifier::new(table)?;
    let staging = allow.table(&staging_table_name(table))?;
    let value_column = Identifier::new(&value_column_name(table))?;
    debug!("{}: {}", table, TableState::Start);

    let watermark = resolve_watermark(store, &staging).await;
    debug!("{}: {} ({})", table, TableState::WatermarkResolved, watermark);

    let cursor = resolve_cursor(store, &staging, opts, now).await;
    debug!("{}: {} ({})", table, TableState::CursorResolved, cursor);

    let outcome = match source
        .fetch_rows(&source_table, cursor, opts.fetch_upper_bound(now))
        .await
    {
        Err(e) => FetchOutcome::FetchFailed(PipelineError::source_query(table, e)),
        Ok(rows) if rows.is_empty() => FetchOutcome::NoNewData,
        Ok(rows) => {
            debug!("{}: {} ({} rows)", table, TableState::Fetched, rows.len());
            let staged = assign_ids(watermark, &rows);
            match store.append_rows(&staging, &value_column, &staged).await {
                Ok(appended) => FetchOutcome::Appended(appended),
                Err(e) => FetchOutcome::AppendFailed(PipelineError::destination(table, "append", e)),
            }
        }
    };
    if let Some(e) = outcome.error() {
        warn!("{} [{}]: {}", table, e.kind(), e);
    }
    debug!("{}: {}", table, TableState::from(&outcome));

    let purge = store
        .purge_older_than(&staging, opts.window_start(now))
        .await
        .map_err(|e| PipelineError::destination(table, "purge", e));
    match &purge {
        Ok(purged) => debug!("{}: {} ({} rows)", table, TableState::Purged, purged),
        Err(e) => warn!("{} [{}]: {}", table, e.kind(), e),
    }

    let last_used_id = watermark + outcome.rows_appended() as i64;
    let metadata = store
        .upsert_metadata(&SyncMetadata::new(staging.as_str(), now, last_used_id))
        .await
        .map_err(|e| PipelineError::destination(table, "metadata", e));
    match &metadata {
        Ok(()) => debug!("{}: {}", table, TableState::MetadataUpdated),
        Err(e) => warn!("{} [{}]: {}", table, e.kind(), e),
    }

    info!(
        "{}: {} rows appended, last_used_id {}",
        table,
        outcome.rows_appended(),
        last_used_id
    );
    debug!("{}: {}", table, TableState::Done);

    Ok(TableReport {
        table: table.to_string(),
        staging_table: staging.as_str().to_string(),
        value_column: value_column.as_str().to_string(),
        watermark,
        cursor,
        outcome,
        purge,
        metadata,
        last_used_id,
    })
}
