//! Pipeline phases run by the CLI.
//!
//! - `extract` - incremental sync, source → staging
//! - `transform` - category join, staging → joined tables
//! - `status` - metadata, row counts and freshness of the staging database

pub mod extract;
pub mod status;
pub mod transform;

use anyhow::Result;
use biosphere_staging::{new_mysql_pool, sanitize_connection_string, MySqlStagingStore};
use sync_core::Identifier;
use tracing::info;

use crate::PipelineConfig;

/// Open a pooled staging store from the configured URI.
pub fn connect_staging(config: &PipelineConfig) -> Result<MySqlStagingStore> {
    let uri = config.staging_uri()?;
    let pool = new_mysql_pool(uri)?;
    info!("Using staging database {}", sanitize_connection_string(uri));
    Ok(
        MySqlStagingStore::new(pool, Identifier::new(&config.metadata_table)?)
            .with_batch_size(config.batch_size),
    )
}
