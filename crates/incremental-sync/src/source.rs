//! Source database readers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use biosphere_staging::sanitize_connection_string;
use chrono::NaiveDateTime;
use sync_core::{Identifier, PipelineError, SourceRow};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info};

use crate::SourceOpts;

/// Trait for reading new readings from a source table.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Get the source database type identifier
    fn source_type(&self) -> &'static str;

    /// Rows with `after < timestamp < before`, ascending by timestamp.
    async fn fetch_rows(
        &self,
        table: &Identifier,
        after: NaiveDateTime,
        before: NaiveDateTime,
    ) -> Result<Vec<SourceRow>>;
}

/// Reads source tables from PostgreSQL.
pub struct PostgresSource {
    client: Client,
    schema: Identifier,
    timestamp_column: Identifier,
    value_column: Identifier,
}

impl PostgresSource {
    /// Connect to the source database.
    ///
    /// Any failure here is [`PipelineError::SourceUnavailable`], which aborts
    /// the run.
    pub async fn connect(opts: &SourceOpts) -> Result<Self, PipelineError> {
        let schema = Identifier::new(&opts.source_schema)?;
        let timestamp_column = Identifier::new(&opts.timestamp_column)?;
        let value_column = Identifier::new(&opts.value_column)?;

        let (client, connection) = tokio_postgres::connect(&opts.source_uri, NoTls)
            .await
            .map_err(|e| {
                PipelineError::SourceUnavailable(format!(
                    "{}: {e}",
                    sanitize_connection_string(&opts.source_uri)
                ))
            })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {e}");
            }
        });

        info!(
            "Connected to source database {}",
            sanitize_connection_string(&opts.source_uri)
        );
        Ok(Self {
            client,
            schema,
            timestamp_column,
            value_column,
        })
    }
}

fn fetch_sql(
    schema: &Identifier,
    timestamp_column: &Identifier,
    value_column: &Identifier,
    table: &Identifier,
) -> String {
    let ts = timestamp_column.postgres();
    format!(
        "SELECT {ts}::timestamp, ROUND({value}::numeric, 2)::float8 \
         FROM {schema}.{table} \
         WHERE {ts} > $1::timestamp AND {ts} < $2::timestamp \
         ORDER BY {ts} ASC",
        value = value_column.postgres(),
        schema = schema.postgres(),
        table = table.postgres(),
    )
}

#[async_trait]
impl SourceReader for PostgresSource {
    fn source_type(&self) -> &'static str {
        "postgresql"
    }

    async fn fetch_rows(
        &self,
        table: &Identifier,
        after: NaiveDateTime,
        before: NaiveDateTime,
    ) -> Result<Vec<SourceRow>> {
        let sql = fetch_sql(
            &self.schema,
            &self.timestamp_column,
            &self.value_column,
            table,
        );
        debug!("Fetching {} rows in ({}, {})", table, after, before);
        let rows = self
            .client
            .query(sql.as_str(), &[&after, &before])
            .await
            .with_context(|| format!("Failed to query source table {table}"))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let timestamp: Option<NaiveDateTime> = row.try_get(0)?;
            let value: Option<f64> = row.try_get(1)?;
            if let Some(timestamp) = timestamp {
                out.push(SourceRow { timestamp, value });
            }
        }
        Ok(out)
    }
}
