//! Error kinds shared by the sync and join engines.

/// Error type for pipeline operations.
///
/// Only [`PipelineError::SourceUnavailable`] aborts a run. Every other kind is
/// isolated to the table or category it concerns and reported through logs.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Cannot connect or authenticate to the source database
    #[error("Source database unavailable: {0}")]
    SourceUnavailable(String),

    /// Fetching new rows for a table failed
    #[error("Source query failed for table '{table}': {detail}")]
    SourceQueryFailed { table: String, detail: String },

    /// An append, purge, metadata or materialization statement failed
    #[error("Destination write failed for '{table}' during {step}: {detail}")]
    DestinationWriteFailed {
        table: String,
        step: &'static str,
        detail: String,
    },

    /// Manifest absent or malformed
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    /// Expected column absent during a join
    #[error("Schema mismatch in table '{table}': {detail}")]
    SchemaMismatch { table: String, detail: String },

    /// Identifier rejected by the allow-list or the identifier character rules
    #[error("Identifier '{0}' is not allowed")]
    InvalidIdentifier(String),
}

impl PipelineError {
    /// Short kind label used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::SourceUnavailable(_) => "source_unavailable",
            PipelineError::SourceQueryFailed { .. } => "source_query_failed",
            PipelineError::DestinationWriteFailed { .. } => "destination_write_failed",
            PipelineError::ConfigurationMissing(_) => "configuration_missing",
            PipelineError::SchemaMismatch { .. } => "schema_mismatch",
            PipelineError::InvalidIdentifier(_) => "invalid_identifier",
        }
    }

    /// Whether the error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::SourceUnavailable(_))
    }

    pub fn destination(table: &str, step: &'static str, err: impl std::fmt::Display) -> Self {
        PipelineError::DestinationWriteFailed {
            table: table.to_string(),
            step,
            detail: format!("{err:#}"),
        }
    }

    pub fn source_query(table: &str, err: impl std::fmt::Display) -> Self {
        PipelineError::SourceQueryFailed {
            table: table.to_string(),
            detail: format!("{err:#}"),
        }
    }

    pub fn schema(table: &str, detail: impl Into<String>) -> Self {
        PipelineError::SchemaMismatch {
            table: table.to_string(),
            detail: detail.into(),
        }
    }
}
