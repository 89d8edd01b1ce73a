//! In-memory staging store.
//!
//! Used to exercise the engines without a database. Failures can be injected
//! per step and per table to drive the error-isolation paths.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sync_core::{Cell, Identifier, StagedRow, TableData, TIMESTAMP_COLUMN, UNIQUE_ID_COLUMN};

use crate::{StagingStore, SyncMetadata, TableSummary};

/// Store operation that can be made to fail for a given table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailOn {
    MetadataRead,
    MaxUniqueId,
    MaxTimestamp,
    Append,
    Purge,
    MetadataWrite,
    Read,
    Replace,
}

#[derive(Default)]
struct Inner {
    tables: BTreeMap<String, TableData>,
    metadata: BTreeMap<String, SyncMetadata>,
    failures: HashSet<(FailOn, String)>,
}

/// In-process implementation of [`StagingStore`].
#[derive(Default)]
pub struct MemoryStagingStore {
    inner: Mutex<Inner>,
}

impl MemoryStagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make `step` fail for `table` until [`clear_failures`](Self::clear_failures).
    pub fn fail(&self, step: FailOn, table: &str) {
        self.lock().failures.insert((step, table.to_lowercase()));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Seed a table with contents.
    pub fn insert_table(&self, table: &str, data: TableData) {
        self.lock().tables.insert(table.to_lowercase(), data);
    }

    pub fn drop_table(&self, table: &str) {
        self.lock().tables.remove(&table.to_lowercase());
    }

    pub fn table(&self, table: &str) -> Option<TableData> {
        self.lock().tables.get(&table.to_lowercase()).cloned()
    }

    pub fn metadata(&self, table: &str) -> Option<SyncMetadata> {
        self.lock().metadata.get(&table.to_lowercase()).cloned()
    }

    /// Seed or overwrite a metadata row.
    pub fn set_metadata(&self, metadata: SyncMetadata) {
        self.lock()
            .metadata
            .insert(metadata.table_name.to_lowercase(), metadata);
    }

    pub fn remove_metadata(&self, table: &str) {
        self.lock().metadata.remove(&table.to_lowercase());
    }

    /// `unique_id` values of a staging table, in stored order.
    pub fn unique_ids(&self, table: &str) -> Vec<i64> {
        self.table(table)
            .map(|data| {
                let idx = data.column_index(UNIQUE_ID_COLUMN);
                data.rows
                    .iter()
                    .filter_map(|row| idx.and_then(|i| row[i].as_i64()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Inner {
    fn check(&self, step: FailOn, table: &str) -> Result<()> {
        if self.failures.contains(&(step, table.to_lowercase())) {
            bail!("injected {step:?} failure for table {table}");
        }
        Ok(())
    }

    fn column_values<'a>(
        &'a self,
        table: &str,
        column: &str,
    ) -> Option<impl Iterator<Item = &'a Cell> + 'a> {
        let data = self.tables.get(&table.to_lowercase())?;
        let idx = data.column_index(column)?;
        Some(data.rows.iter().map(move |row| &row[idx]))
    }
}

#[async_trait]
impl StagingStore for MemoryStagingStore {
    async fn metadata_last_used_id(&self, table: &Identifier) -> Result<Option<i64>> {
        let inner = self.lock();
        inner.check(FailOn::MetadataRead, table.as_str())?;
        Ok(inner
            .metadata
            .get(&table.as_str().to_lowercase())
            .map(|m| m.last_used_id))
    }

    async fn max_unique_id(&self, table: &Identifier) -> Result<Option<i64>> {
        let inner = self.lock();
        inner.check(FailOn::MaxUniqueId, table.as_str())?;
        Ok(inner
            .column_values(table.as_str(), UNIQUE_ID_COLUMN)
            .and_then(|cells| cells.filter_map(Cell::as_i64).max()))
    }

    async fn max_timestamp(&self, table: &Identifier) -> Result<Option<NaiveDateTime>> {
        let inner = self.lock();
        inner.check(FailOn::MaxTimestamp, table.as_str())?;
        Ok(inner
            .column_values(table.as_str(), TIMESTAMP_COLUMN)
            .and_then(|cells| cells.filter_map(Cell::as_timestamp).max()))
    }

    async fn append_rows(
        &self,
        table: &Identifier,
        value_column: &Identifier,
        rows: &[StagedRow],
    ) -> Result<u64> {
        let mut inner = self.lock();
        inner.check(FailOn::Append, table.as_str())?;
        let staged = TableData::from_staged(value_column.as_str(), rows);
        let data = inner
            .tables
            .entry(table.as_str().to_lowercase())
            .or_insert_with(|| TableData::new(staged.columns.clone()));
        data.rows.extend(staged.rows);
        Ok(rows.len() as u64)
    }

    async fn purge_older_than(&self, table: &Identifier, cutoff: NaiveDateTime) -> Result<u64> {
        let mut inner = self.lock();
        inner.check(FailOn::Purge, table.as_str())?;
        let Some(data) = inner.tables.get_mut(&table.as_str().to_lowercase()) else {
            return Ok(0);
        };
        let Some(idx) = data.column_index(TIMESTAMP_COLUMN) else {
            bail!("table {table} has no timestamp column");
        };
        let before = data.rows.len();
        data.rows
            .retain(|row| row[idx].as_timestamp().map_or(true, |ts| ts >= cutoff));
        Ok((before - data.rows.len()) as u64)
    }

    async fn upsert_metadata(&self, metadata: &SyncMetadata) -> Result<()> {
        let mut inner = self.lock();
        inner.check(FailOn::MetadataWrite, &metadata.table_name)?;
        inner
            .metadata
            .insert(metadata.table_name.to_lowercase(), metadata.clone());
        Ok(())
    }

    async fn list_metadata(&self) -> Result<Vec<SyncMetadata>> {
        let mut rows: Vec<SyncMetadata> = self.lock().metadata.values().cloned().collect();
        rows.sort_by(|a, b| b.last_run_timestamp.cmp(&a.last_run_timestamp));
        Ok(rows)
    }

    async fn table_columns(&self, table: &Identifier) -> Result<Option<Vec<String>>> {
        let inner = self.lock();
        inner.check(FailOn::Read, table.as_str())?;
        Ok(inner
            .tables
            .get(&table.as_str().to_lowercase())
            .map(|data| data.columns.clone()))
    }

    async fn read_table(&self, table: &Identifier) -> Result<Option<TableData>> {
        let inner = self.lock();
        inner.check(FailOn::Read, table.as_str())?;
        Ok(inner.tables.get(&table.as_str().to_lowercase()).cloned())
    }

    async fn replace_table(&self, table: &Identifier, data: &TableData) -> Result<()> {
        let mut inner = self.lock();
        inner.check(FailOn::Replace, table.as_str())?;
        inner
            .tables
            .insert(table.as_str().to_lowercase(), data.clone());
        Ok(())
    }

    async fn table_summary(
        &self,
        table: &Identifier,
        timestamp_column: Option<&Identifier>,
    ) -> Result<Option<TableSummary>> {
        let inner = self.lock();
        inner.check(FailOn::Read, table.as_str())?;
        let Some(data) = inner.tables.get(&table.as_str().to_lowercase()) else {
            return Ok(None);
        };
        let timestamps: Vec<NaiveDateTime> = timestamp_column
            .and_then(|col| data.column_index(col.as_str()))
            .map(|idx| {
                data.rows
                    .iter()
                    .filter_map(|row| row[idx].as_timestamp())
                    .collect()
            })
            .unwrap_or_default();
        Ok(Some(TableSummary {
            table: table.as_str().to_lowercase(),
            row_count: data.rows.len() as u64,
            earliest: timestamps.iter().min().copied(),
            latest: timestamps.iter().max().copied(),
        }))
    }
}
