//! Transform phase: category joins into the joined tables.

use anyhow::Result;
use biosphere_category_join::{plan_category_join, run_category_join, JoinReport};
use chrono::NaiveDateTime;
use sync_core::Catalog;
use tracing::{info, warn};

use super::connect_staging;
use crate::PipelineConfig;

/// Run the transform phase. Returns None for dry runs.
pub async fn run_transform(
    config: &PipelineConfig,
    catalog: &Catalog,
    dry_run: bool,
    now: NaiveDateTime,
) -> Result<Option<JoinReport>> {
    if dry_run {
        let plan = plan_category_join(catalog);
        let tables: usize = plan.iter().map(|(_, tables)| tables.len()).sum();
        info!(
            "[dry-run] transform would join {} tables across {} categories",
            tables,
            plan.len()
        );
        return Ok(None);
    }

    let store = connect_staging(config)?;
    let report = run_category_join(catalog, &store, &config.join_opts(), now).await;
    for category in report.categories.iter().filter(|c| !c.skipped.is_empty()) {
        warn!(
            "{}: {} tables skipped",
            category.category,
            category.skipped.len()
        );
    }

    store.disconnect().await?;
    Ok(Some(report))
}
