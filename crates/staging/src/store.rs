//! Staging store trait and shared types
//!
//! This module defines the StagingStore trait for backend-agnostic access to
//! staging tables, the sync metadata table and joined tables.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;
use sync_core::{Identifier, StagedRow, TableData};

use crate::SyncMetadata;

/// Row count and time range of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub table: String,
    pub row_count: u64,
    pub earliest: Option<NaiveDateTime>,
    pub latest: Option<NaiveDateTime>,
}

/// Trait for staging storage operations.
///
/// Every method is an independent unit of work: it opens what it needs,
/// commits, and releases it. Callers never hold a transaction across calls.
/// Table names arrive as [`Identifier`]s already checked against the
/// catalog allow-list.
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// `last_used_id` recorded in the metadata table.
    ///
    /// Returns None if the metadata table or the table's row doesn't exist.
    async fn metadata_last_used_id(&self, table: &Identifier) -> Result<Option<i64>>;

    /// Highest `unique_id` currently present in a staging table.
    ///
    /// Returns None if the table doesn't exist or is empty.
    async fn max_unique_id(&self, table: &Identifier) -> Result<Option<i64>>;

    /// Latest `timestamp` currently present in a staging table.
    ///
    /// Returns None if the table doesn't exist or is empty.
    async fn max_timestamp(&self, table: &Identifier) -> Result<Option<NaiveDateTime>>;

    /// Append staged rows in a single transaction, creating the table on
    /// first use. Existing rows are never rewritten.
    async fn append_rows(
        &self,
        table: &Identifier,
        value_column: &Identifier,
        rows: &[StagedRow],
    ) -> Result<u64>;

    /// Delete rows with `timestamp` strictly before `cutoff`.
    ///
    /// A missing table purges nothing.
    async fn purge_older_than(&self, table: &Identifier, cutoff: NaiveDateTime) -> Result<u64>;

    /// Insert or update the metadata row, creating the metadata table if needed.
    async fn upsert_metadata(&self, metadata: &SyncMetadata) -> Result<()>;

    /// Every metadata row, most recent run first.
    async fn list_metadata(&self) -> Result<Vec<SyncMetadata>>;

    /// Column names in schema order, or None if the table doesn't exist.
    async fn table_columns(&self, table: &Identifier) -> Result<Option<Vec<String>>>;

    /// Full contents of a table, or None if it doesn't exist.
    async fn read_table(&self, table: &Identifier) -> Result<Option<TableData>>;

    /// Replace a table with the given contents.
    ///
    /// If building the new contents fails, the previous table is left in place.
    async fn replace_table(&self, table: &Identifier, data: &TableData) -> Result<()>;

    /// Row count and the range of `timestamp_column`, or None if the table
    /// doesn't exist.
    async fn table_summary(
        &self,
        table: &Identifier,
        timestamp_column: Option<&Identifier>,
    ) -> Result<Option<TableSummary>>;
}
