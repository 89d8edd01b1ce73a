//! Pipeline configuration.
//!
//! Built once at process start from, lowest to highest precedence: built-in
//! defaults, an optional TOML file, then command-line flags and environment
//! variables. The resulting [`PipelineConfig`] is passed by reference to every
//! phase.

mod duration;

pub use duration::{parse_duration, parse_duration_to_secs};

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use biosphere_category_join::JoinOpts;
use biosphere_incremental_sync::{window_start_date, SourceOpts, SyncOpts};
use serde::{Deserialize, Serialize};
use sync_core::{Identifier, PipelineError};

use crate::RunArgs;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rows older than midnight of (today − window) are purged
    pub rolling_window_days: i64,
    /// Added to the latest staged timestamp to form the fetch cursor
    pub timestamp_buffer: String,
    pub source_schema: String,
    pub source_timestamp_column: String,
    pub source_value_column: String,
    pub manifest_path: PathBuf,
    /// Manifest rows of other biomes are ignored
    pub biome: Option<String>,
    pub joined_tables_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub metadata_table: String,
    pub batch_size: usize,
    /// Window of the status command's freshness count
    pub freshness_window: String,
    pub source_uri: Option<String>,
    pub staging_uri: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rolling_window_days: 30,
            timestamp_buffer: "10s".to_string(),
            source_schema: "BIO2CONTROLSALL".to_string(),
            source_timestamp_column: "timestamp".to_string(),
            source_value_column: "value".to_string(),
            manifest_path: PathBuf::from("data/tables_list/manifest.csv"),
            biome: Some("Rainforest".to_string()),
            joined_tables_dir: PathBuf::from("data/joined_tables"),
            logs_dir: PathBuf::from("logs"),
            metadata_table: biosphere_staging::DEFAULT_METADATA_TABLE.to_string(),
            batch_size: 1000,
            freshness_window: "24h".to_string(),
            source_uri: None,
            staging_uri: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file. Missing keys take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Defaults, overlaid with the file at `path` when one is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Overlay command-line flags and environment variables.
    pub fn apply_args(&mut self, args: &RunArgs) {
        let pipeline = &args.pipeline;
        if let Some(manifest) = &pipeline.manifest {
            self.manifest_path = manifest.clone();
        }
        if let Some(biome) = &pipeline.biome {
            self.biome = Some(biome.clone());
        }
        if let Some(days) = pipeline.rolling_window_days {
            self.rolling_window_days = days;
        }
        if let Some(batch_size) = pipeline.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(log_dir) = &pipeline.log_dir {
            self.logs_dir = log_dir.clone();
        }
        if let Some(uri) = &args.source.source_uri {
            self.source_uri = Some(uri.clone());
        }
        if let Some(schema) = &args.source.source_schema {
            self.source_schema = schema.clone();
        }
        if let Some(uri) = &args.staging.staging_uri {
            self.staging_uri = Some(uri.clone());
        }
    }

    /// Reject values no run could use.
    pub fn validate(&self) -> Result<()> {
        if self.rolling_window_days < 0 {
            anyhow::bail!(
                "rolling_window_days must not be negative, got {}",
                self.rolling_window_days
            );
        }
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        let now = chrono::Local::now().naive_local();
        window_start_date(now.date(), self.rolling_window_days).with_context(|| {
            format!(
                "rolling_window_days is out of range, got {}",
                self.rolling_window_days
            )
        })?;
        let buffer = self.timestamp_buffer().context("Invalid timestamp_buffer")?;
        now.checked_add_signed(buffer)
            .context("Invalid timestamp_buffer: out of range")?;
        let window = self.freshness_window().context("Invalid freshness_window")?;
        now.checked_sub_signed(window)
            .context("Invalid freshness_window: out of range")?;
        for name in [
            &self.source_schema,
            &self.source_timestamp_column,
            &self.source_value_column,
            &self.metadata_table,
        ] {
            Identifier::new(name)?;
        }
        Ok(())
    }

    pub fn freshness_window(&self) -> Result<chrono::Duration> {
        parse_duration(&self.freshness_window)
    }

    fn timestamp_buffer(&self) -> Result<chrono::Duration> {
        parse_duration(&self.timestamp_buffer)
    }

    pub fn sync_opts(&self) -> Result<SyncOpts> {
        Ok(SyncOpts {
            rolling_window_days: self.rolling_window_days,
            timestamp_buffer_secs: self.timestamp_buffer()?.num_seconds().unsigned_abs(),
            metadata_table: self.metadata_table.clone(),
        })
    }

    pub fn source_opts(&self) -> Result<SourceOpts, PipelineError> {
        let source_uri = self.source_uri.clone().ok_or_else(|| {
            PipelineError::ConfigurationMissing(
                "source URI (--source-uri or SOURCE_URI)".to_string(),
            )
        })?;
        Ok(SourceOpts {
            source_uri,
            source_schema: self.source_schema.clone(),
            timestamp_column: self.source_timestamp_column.clone(),
            value_column: self.source_value_column.clone(),
        })
    }

    pub fn staging_uri(&self) -> Result<&str, PipelineError> {
        self.staging_uri.as_deref().ok_or_else(|| {
            PipelineError::ConfigurationMissing(
                "staging URI (--staging-uri or STAGING_URI)".to_string(),
            )
        })
    }

    pub fn join_opts(&self) -> JoinOpts {
        JoinOpts {
            output_dir: self.joined_tables_dir.clone(),
            metadata_table: self.metadata_table.clone(),
        }
    }
}
