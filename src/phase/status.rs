//! Status report: last runs, staging row counts, joined tables and freshness.

use std::fmt;

use anyhow::Result;
use biosphere_staging::{count_fresh, StagingStore, SyncMetadata, TableSummary};
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use sync_core::{resolve_timestamp_column, Catalog, Category, Identifier, TIMESTAMP_COLUMN};
use tracing::warn;

use super::connect_staging;
use crate::PipelineConfig;

/// State of one category's joined table.
#[derive(Debug, Clone, Serialize)]
pub struct JoinedTableStatus {
    pub category: Category,
    pub table: String,
    /// Column the time range is read from
    pub timestamp_column: Option<String>,
    /// None when the table doesn't exist yet
    pub summary: Option<TableSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub generated_at: NaiveDateTime,
    pub latest_run: Option<NaiveDateTime>,
    pub tables_processed: usize,
    pub fresh_tables: usize,
    pub freshness_window_secs: i64,
    /// Most recent run first
    pub metadata: Vec<SyncMetadata>,
    pub staging_tables: Vec<TableSummary>,
    pub joined_tables: Vec<JoinedTableStatus>,
}

impl StatusReport {
    pub fn is_fresh(&self) -> bool {
        self.fresh_tables > 0
    }
}

/// Gather the status report from a staging store.
pub async fn collect_status<S: StagingStore + ?Sized>(
    store: &S,
    catalog: &Catalog,
    metadata_table: &str,
    freshness_window: Duration,
    now: NaiveDateTime,
) -> Result<StatusReport> {
    let metadata = store.list_metadata().await?;
    let allow = catalog.allow_list(metadata_table);
    let timestamp = Identifier::new(TIMESTAMP_COLUMN)?;

    let mut staging_tables = Vec::new();
    for entry in catalog.entries() {
        let staging = entry.staging_table();
        let summary = match allow.table(&staging) {
            Ok(ident) => store.table_summary(&ident, Some(&timestamp)).await,
            Err(e) => Err(e.into()),
        };
        match summary {
            Ok(Some(summary)) => staging_tables.push(summary),
            Ok(None) => {}
            Err(e) => warn!("Cannot summarize {}: {:#}", staging, e),
        }
    }

    let mut joined_tables = Vec::with_capacity(Category::ALL.len());
    for category in Category::ALL {
        joined_tables.push(joined_status(store, category).await);
    }

    Ok(StatusReport {
        generated_at: now,
        latest_run: metadata.iter().map(|m| m.last_run_timestamp).max(),
        tables_processed: metadata.len(),
        fresh_tables: count_fresh(&metadata, now, freshness_window),
        freshness_window_secs: freshness_window.num_seconds(),
        metadata,
        staging_tables,
        joined_tables,
    })
}

async fn joined_status<S: StagingStore + ?Sized>(store: &S, category: Category) -> JoinedTableStatus {
    let table = category.joined_table_name();
    let (timestamp_column, summary) = match summarize_joined(store, category, &table).await {
        Ok(Some((column, summary))) => (Some(column), summary),
        Ok(None) => (None, None),
        Err(e) => {
            warn!("Cannot summarize {}: {:#}", table, e);
            (None, None)
        }
    };
    JoinedTableStatus {
        category,
        table,
        timestamp_column,
        summary,
    }
}

async fn summarize_joined<S: StagingStore + ?Sized>(
    store: &S,
    category: Category,
    table: &str,
) -> Result<Option<(String, Option<TableSummary>)>> {
    let ident = Identifier::new(table)?;
    let Some(columns) = store.table_columns(&ident).await? else {
        return Ok(None);
    };
    let column = resolve_timestamp_column(category, &columns);
    let summary = store
        .table_summary(&ident, Some(&Identifier::new(&column)?))
        .await?;
    Ok(Some((column, summary)))
}

fn format_range(summary: &TableSummary) -> String {
    match (summary.earliest, summary.latest) {
        (Some(earliest), Some(latest)) => format!("{earliest} .. {latest}"),
        _ => "no timestamps".to_string(),
    }
}

/// Plain-text rendering for the terminal.
impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(72);
        writeln!(f, "{rule}")?;
        writeln!(
            f,
            "BIOSPHERE PIPELINE STATUS ({})",
            self.generated_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(f, "{rule}")?;

        writeln!(f, "\nPipeline")?;
        match self.latest_run {
            Some(latest) => {
                writeln!(f, "  Latest run: {latest}")?;
                writeln!(f, "  Tables processed: {}", self.tables_processed)?;
            }
            None => writeln!(f, "  No pipeline runs found")?,
        }

        writeln!(f, "\nStaging tables ({})", self.staging_tables.len())?;
        for summary in &self.staging_tables {
            writeln!(
                f,
                "  {}: {} rows, {}",
                summary.table,
                summary.row_count,
                format_range(summary)
            )?;
        }

        writeln!(f, "\nJoined tables")?;
        for joined in &self.joined_tables {
            match &joined.summary {
                Some(summary) => writeln!(
                    f,
                    "  {}: {} rows, {}",
                    joined.table,
                    summary.row_count,
                    format_range(summary)
                )?,
                None => writeln!(f, "  {}: not built", joined.table)?,
            }
        }

        let hours = self.freshness_window_secs as f64 / 3600.0;
        writeln!(f)?;
        if self.is_fresh() {
            writeln!(
                f,
                "Data is fresh: {} tables updated in the last {hours} hours",
                self.fresh_tables
            )
        } else {
            writeln!(f, "Data may be stale: no tables updated in the last {hours} hours")
        }
    }
}

/// Run the status command against the configured staging database.
pub async fn run_status(
    config: &PipelineConfig,
    catalog: &Catalog,
    json: bool,
    now: NaiveDateTime,
) -> Result<StatusReport> {
    let store = connect_staging(config)?;
    let report = collect_status(
        &store,
        catalog,
        &config.metadata_table,
        config.freshness_window()?,
        now,
    )
    .await?;
    store.disconnect().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(report)
}
