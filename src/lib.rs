//! Biosphere Sync Library
//!
//! Moves time-series sensor readings from the source operational database into
//! a MySQL staging database and builds per-category joined tables from them.
//!
//! # Crates
//!
//! - `sync_core` - Categories, value-column naming, column roles, catalog
//! - `biosphere_staging` - Staging store (staging tables, metadata, joined tables)
//! - `biosphere_incremental_sync` - Source → staging, with rolling retention
//! - `biosphere_category_join` - Staging → joined tables and CSV artifacts
//!
//! # CLI Usage
//!
//! ```bash
//! # Incremental sync of every manifest table
//! biosphere-sync extract --source-uri postgresql://... --staging-uri mysql://...
//!
//! # Rebuild the joined tables
//! biosphere-sync transform --staging-uri mysql://...
//!
//! # Both, in order
//! biosphere-sync all --config pipeline.toml
//!
//! # Metadata, row counts and freshness
//! biosphere-sync status --staging-uri mysql://... --json
//! ```

use std::path::PathBuf;

use clap::Parser;

pub mod config;
pub mod logging;
pub mod phase;

pub use config::PipelineConfig;

/// Options shared by every command
#[derive(Parser, Clone, Debug, Default)]
pub struct PipelineArgs {
    /// TOML configuration file
    #[arg(long, env = "BIOSPHERE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Manifest CSV mapping tables to categories
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Only sync manifest rows of this biome
    #[arg(long)]
    pub biome: Option<String>,

    /// Retention window in days
    #[arg(long)]
    pub rolling_window_days: Option<i64>,

    /// Batch size for staging inserts
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Directory for the run log file
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Dry run mode - list what would be done without touching any database
    #[arg(long)]
    pub dry_run: bool,
}

/// Source database connection options
#[derive(Parser, Clone, Debug, Default)]
pub struct SourceArgs {
    /// PostgreSQL connection URI of the source database
    #[arg(long, env = "SOURCE_URI")]
    pub source_uri: Option<String>,

    /// Schema holding the source tables
    #[arg(long, env = "SOURCE_SCHEMA")]
    pub source_schema: Option<String>,
}

/// Staging database connection options
#[derive(Parser, Clone, Debug, Default)]
pub struct StagingArgs {
    /// MySQL connection URI of the staging database
    #[arg(long, env = "STAGING_URI")]
    pub staging_uri: Option<String>,
}

/// Everything a pipeline command accepts
#[derive(Parser, Clone, Debug, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub staging: StagingArgs,
}
