//! Extract phase: incremental sync of every catalog table.

use anyhow::{Context, Result};
use biosphere_incremental_sync::{
    plan_incremental_sync, run_incremental_sync, PostgresSource, SyncReport,
};
use chrono::NaiveDateTime;
use sync_core::Catalog;
use tracing::{info, warn};

use super::connect_staging;
use crate::PipelineConfig;

/// Run the extract phase.
///
/// Returns None for dry runs and empty catalogs. Fails only when the source
/// or staging database cannot be reached; per-table failures are in the
/// report.
pub async fn run_extract(
    config: &PipelineConfig,
    catalog: &Catalog,
    dry_run: bool,
    now: NaiveDateTime,
) -> Result<Option<SyncReport>> {
    if dry_run {
        let plans = plan_incremental_sync(catalog);
        info!("[dry-run] extract would sync {} tables", plans.len());
        return Ok(None);
    }
    if catalog.is_empty() {
        warn!("Catalog is empty, skipping extract");
        return Ok(None);
    }

    let sync_opts = config.sync_opts()?;
    let source = PostgresSource::connect(&config.source_opts()?)
        .await
        .context("Extract aborted")?;
    let store = connect_staging(config)?;

    let report = run_incremental_sync(catalog, &store, &source, &sync_opts, now).await;
    for table in report.tables.iter().filter(|t| t.has_failure()) {
        warn!(
            "Extract failures for {} (last_used_id {})",
            table.table, table.last_used_id
        );
    }

    store.disconnect().await?;
    Ok(Some(report))
}
