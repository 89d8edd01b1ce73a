//! In-memory source reader.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sync_core::{Identifier, SourceRow};

use crate::SourceReader;

#[derive(Default)]
struct Inner {
    tables: BTreeMap<String, Vec<SourceRow>>,
    failing: HashSet<String>,
}

/// Source tables held in memory, with per-table fetch failure injection.
#[derive(Default)]
pub struct MemorySource {
    inner: Mutex<Inner>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add readings to a source table, creating it if needed.
    pub fn insert_rows(&self, table: &str, rows: impl IntoIterator<Item = SourceRow>) {
        self.lock()
            .tables
            .entry(table.to_lowercase())
            .or_default()
            .extend(rows);
    }

    /// Make every fetch from `table` fail.
    pub fn fail_table(&self, table: &str) {
        self.lock().failing.insert(table.to_lowercase());
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    fn source_type(&self) -> &'static str {
        "memory"
    }

    async fn fetch_rows(
        &self,
        table: &Identifier,
        after: NaiveDateTime,
        before: NaiveDateTime,
    ) -> Result<Vec<SourceRow>> {
        let inner = self.lock();
        let key = table.as_str().to_lowercase();
        if inner.failing.contains(&key) {
            bail!("injected fetch failure for table {table}");
        }
        let Some(rows) = inner.tables.get(&key) else {
            bail!("relation \"{key}\" does not exist");
        };
        let mut out: Vec<SourceRow> = rows
            .iter()
            .filter(|r| r.timestamp > after && r.timestamp < before)
            .map(|r| SourceRow {
                timestamp: r.timestamp,
                value: r.value.map(|v| (v * 100.0).round() / 100.0),
            })
            .collect();
        out.sort_by_key(|r| r.timestamp);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_is_exclusive_sorted_and_rounded() {
        let source = MemorySource::new();
        source.insert_rows(
            "RF_TEMP",
            [
                SourceRow { timestamp: at(3, 0), value: Some(3.0) },
                SourceRow { timestamp: at(1, 0), value: Some(1.0) },
                SourceRow { timestamp: at(2, 0), value: Some(2.456) },
                SourceRow { timestamp: at(4, 0), value: None },
            ],
        );
        let table = Identifier::new("rf_temp").unwrap();
        let rows = source.fetch_rows(&table, at(1, 0), at(4, 0)).await.unwrap();
        assert_eq!(
            rows,
            vec![
                SourceRow { timestamp: at(2, 0), value: Some(2.46) },
                SourceRow { timestamp: at(3, 0), value: Some(3.0) },
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_and_failing_tables() {
        let source = MemorySource::new();
        source.insert_rows("rf_temp", Vec::new());
        let missing = Identifier::new("rf_other").unwrap();
        assert!(source.fetch_rows(&missing, at(1, 0), at(2, 0)).await.is_err());

        let table = Identifier::new("rf_temp").unwrap();
        source.fail_table("RF_TEMP");
        assert!(source.fetch_rows(&table, at(1, 0), at(2, 0)).await.is_err());
        source.clear_failures();
        assert!(source.fetch_rows(&table, at(1, 0), at(2, 0)).await.unwrap().is_empty());
    }
}
