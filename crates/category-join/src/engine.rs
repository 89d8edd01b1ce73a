//! Category join engine.

use std::path::PathBuf;

use biosphere_staging::StagingStore;
use chrono::NaiveDateTime;
use sync_core::{
    derive_column_roles, Catalog, Category, IdentifierAllowList, PipelineError, TableData,
};
use tracing::{debug, info, warn};

use crate::{merge_frames, write_csv_artifact, JoinOpts};

/// What happened to one category during a join run.
#[derive(Debug)]
pub struct CategoryReport {
    pub category: Category,
    /// Tables merged into the result, in merge order
    pub tables_joined: Vec<String>,
    /// Tables left out, with the reason
    pub skipped: Vec<(String, PipelineError)>,
    pub rows: usize,
    /// None when there was nothing to write
    pub artifact: Option<Result<PathBuf, PipelineError>>,
    /// None when there was nothing to write
    pub destination: Option<Result<(), PipelineError>>,
}

impl CategoryReport {
    fn new(category: Category) -> Self {
        Self {
            category,
            tables_joined: Vec::new(),
            skipped: Vec::new(),
            rows: 0,
            artifact: None,
            destination: None,
        }
    }

    /// Whether the destination table was replaced.
    pub fn replaced(&self) -> bool {
        matches!(self.destination, Some(Ok(())))
    }

    pub fn has_failure(&self) -> bool {
        matches!(self.artifact, Some(Err(_))) || matches!(self.destination, Some(Err(_)))
    }
}

/// Outcome of a whole join run.
#[derive(Debug)]
pub struct JoinReport {
    pub started_at: NaiveDateTime,
    pub categories: Vec<CategoryReport>,
}

impl JoinReport {
    pub fn category(&self, category: Category) -> Option<&CategoryReport> {
        self.categories.iter().find(|c| c.category == category)
    }

    pub fn tables_replaced(&self) -> usize {
        self.categories.iter().filter(|c| c.replaced()).count()
    }
}

/// Staging tables each category would join, in merge order.
pub fn plan_category_join(catalog: &Catalog) -> Vec<(Category, Vec<String>)> {
    Category::ALL
        .into_iter()
        .map(|category| {
            let tables = catalog.tables_for(category);
            info!(
                "[dry-run] {} ({} join) -> {}: {:?}",
                category,
                category.join_policy(),
                category.joined_table_name(),
                tables
            );
            (category, tables)
        })
        .collect()
}

/// Join every category, one after the other.
pub async fn run_category_join<S: StagingStore + ?Sized>(
    catalog: &Catalog,
    store: &S,
    opts: &JoinOpts,
    now: NaiveDateTime,
) -> JoinReport {
    info!("Starting category join into {}", opts.output_dir.display());
    let allow = catalog.allow_list(&opts.metadata_table);
    let mut report = JoinReport {
        started_at: now,
        categories: Vec::with_capacity(Category::ALL.len()),
    };
    for category in Category::ALL {
        report
            .categories
            .push(join_category(category, catalog, &allow, store, opts, now).await);
    }
    info!(
        "Category join finished: {} of {} joined tables replaced",
        report.tables_replaced(),
        report.categories.len()
    );
    report
}

/// Join one category's staging tables and materialize the result.
///
/// Tables that cannot be read or lack the expected columns are skipped. The
/// first table that can be used becomes the base. When the result is empty
/// nothing is written and the previous joined table stays in place.
pub async fn join_category<S: StagingStore + ?Sized>(
    category: Category,
    catalog: &Catalog,
    allow: &IdentifierAllowList,
    store: &S,
    opts: &JoinOpts,
    now: NaiveDateTime,
) -> CategoryReport {
    let mut report = CategoryReport::new(category);
    let tables = catalog.tables_for(category);
    if tables.is_empty() {
        info!("{}: no tables in catalog, skipping", category);
        return report;
    }
    info!(
        "{}: joining {} tables ({} join)",
        category,
        tables.len(),
        category.join_policy()
    );

    let mut joined: Option<TableData> = None;
    for table in tables {
        match load_frame(category, &table, allow, store, joined.is_none()).await {
            Ok(frame) => {
                debug!("{}: {} contributes {} rows", category, table, frame.len());
                joined = Some(match joined {
                    None => frame,
                    Some(acc) => merge_frames(&acc, &frame, category.join_policy()),
                });
                report.tables_joined.push(table);
            }
            Err(e) => {
                warn!("{}: skipping {} [{}]: {}", category, table, e.kind(), e);
                report.skipped.push((table, e));
            }
        }
    }

    let Some(joined) = joined.filter(|data| !data.is_empty()) else {
        warn!("{}: join produced no rows, leaving joined table untouched", category);
        return report;
    };
    report.rows = joined.len();

    let file_name = category.artifact_file_name(now);
    let artifact = write_csv_artifact(&opts.output_dir, &file_name, &joined)
        .map_err(|e| PipelineError::destination(&file_name, "artifact", e));
    if let Err(e) = &artifact {
        warn!("{}: [{}] {}", category, e.kind(), e);
    }
    report.artifact = Some(artifact);

    let destination_name = category.joined_table_name();
    let destination = match allow.table(&destination_name) {
        Ok(ident) => store
            .replace_table(&ident, &joined)
            .await
            .map_err(|e| PipelineError::destination(&destination_name, "replace", e)),
        Err(e) => Err(e),
    };
    match &destination {
        Ok(()) => info!(
            "{}: replaced {} with {} rows",
            category, destination_name, report.rows
        ),
        Err(e) => warn!("{}: [{}] {}", category, e.kind(), e),
    }
    report.destination = Some(destination);
    report
}

/// Read a staging table and project it to its join columns.
async fn load_frame<S: StagingStore + ?Sized>(
    category: Category,
    table: &str,
    allow: &IdentifierAllowList,
    store: &S,
    is_base: bool,
) -> Result<TableData, PipelineError> {
    let ident = allow.table(table)?;
    let data = store
        .read_table(&ident)
        .await
        .map_err(|e| PipelineError::source_query(table, e))?
        .ok_or_else(|| PipelineError::schema(table, "table does not exist"))?;

    let roles = derive_column_roles(category, table, &data.columns, is_base)?;
    let picks = roles
        .projection()
        .into_iter()
        .map(|(input, output)| {
            data.column_index(&input)
                .map(|idx| (idx, output))
                .ok_or_else(|| PipelineError::schema(table, format!("missing column {input}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(data.select(&picks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use biosphere_staging::{FailOn, MemoryStagingStore};
    use chrono::NaiveDate;
    use sync_core::{Cell, CatalogEntry, Identifier, StagedRow};

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn staging(value_column: &str, ids: &[i64]) -> TableData {
        let rows: Vec<StagedRow> = ids
            .iter()
            .map(|&id| StagedRow {
                unique_id: id,
                timestamp: at(10, id as u32),
                value: Some(id as f64),
            })
            .collect();
        TableData::from_staged(value_column, &rows)
    }

    fn catalog(category: Category, tables: &[&str]) -> Catalog {
        Catalog::new(
            tables
                .iter()
                .map(|t| CatalogEntry {
                    table: t.to_string(),
                    category: Some(category),
                })
                .collect(),
        )
    }

    fn opts(dir: &tempfile::TempDir) -> JoinOpts {
        JoinOpts {
            output_dir: dir.path().join("joined_tables"),
            metadata_table: "staging_metadata".into(),
        }
    }

    fn ids(data: &TableData) -> Vec<i64> {
        data.rows.iter().filter_map(|r| r[0].as_i64()).collect()
    }

    #[tokio::test]
    async fn test_inner_category_join() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStagingStore::new();
        store.insert_table("rf_temp", staging("TEMP", &[1, 2, 3]));
        store.insert_table("rf_hum", staging("HUM", &[2, 3, 4]));
        let catalog = catalog(Category::Type1, &["RF_TEMP", "RF_HUM"]);

        let report = run_category_join(&catalog, &store, &opts(&dir), at(16, 9)).await;
        let type1 = report.category(Category::Type1).unwrap();
        assert!(type1.replaced());
        assert_eq!(type1.rows, 2);
        assert_eq!(type1.tables_joined, vec!["rf_temp", "rf_hum"]);

        let joined = store.table("joined_rainforest_ids_type1").unwrap();
        assert_eq!(joined.columns, vec!["unique_id", "timestamp", "TEMP", "HUM"]);
        assert_eq!(ids(&joined), vec![2, 3]);

        let artifact = type1.artifact.as_ref().unwrap().as_ref().unwrap();
        assert_eq!(
            artifact.file_name().unwrap().to_str().unwrap(),
            "joined_tables_ids_type1_20251016_090000.csv"
        );
        assert!(artifact.exists());

        // Categories without tables write nothing
        assert!(report.category(Category::Type2).unwrap().destination.is_none());
        assert!(store.table("joined_rainforest_ids_type2").is_none());
        assert_eq!(report.tables_replaced(), 1);
    }

    #[tokio::test]
    async fn test_outer_category_join_tags_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStagingStore::new();
        store.insert_table("rf_co2", staging("CO2", &[1, 2, 3]));
        store.insert_table("rf_o2", staging("O2", &[2, 3, 4]));
        let catalog = catalog(Category::Less50, &["RF_CO2", "RF_O2"]);

        run_category_join(&catalog, &store, &opts(&dir), at(16, 9)).await;

        let joined = store.table("joined_rainforest_ids_less50").unwrap();
        assert_eq!(
            joined.columns,
            vec!["unique_id", "timestamp_CO2", "CO2", "timestamp_O2", "O2"]
        );
        assert_eq!(ids(&joined), vec![1, 2, 3, 4]);
        assert_eq!(
            joined.rows[0],
            vec![
                Cell::Int(1),
                Cell::Timestamp(at(10, 1)),
                Cell::Float(1.0),
                Cell::Null,
                Cell::Null
            ]
        );
        assert_eq!(
            joined.rows[3],
            vec![
                Cell::Int(4),
                Cell::Null,
                Cell::Null,
                Cell::Timestamp(at(10, 4)),
                Cell::Float(4.0)
            ]
        );
    }

    #[tokio::test]
    async fn test_rerun_produces_identical_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStagingStore::new();
        store.insert_table("rf_co2", staging("CO2", &[1, 2, 3]));
        store.insert_table("rf_o2", staging("O2", &[2, 3, 4]));
        let catalog = catalog(Category::Other, &["RF_CO2", "RF_O2"]);

        run_category_join(&catalog, &store, &opts(&dir), at(16, 9)).await;
        let first = store.table("joined_rainforest_ids_other").unwrap();
        run_category_join(&catalog, &store, &opts(&dir), at(16, 10)).await;
        let second = store.table("joined_rainforest_ids_other").unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unusable_tables_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStagingStore::new();
        store.insert_table("rf_broken", staging("X", &[1]));
        store.fail(FailOn::Read, "rf_broken");
        store.insert_table("rf_temp", staging("TEMP", &[1, 2]));
        store.insert_table(
            "rf_narrow",
            TableData {
                columns: vec!["unique_id".into(), "HUM".into()],
                rows: vec![vec![Cell::Int(1), Cell::Float(1.0)]],
            },
        );
        store.insert_table("rf_co2", staging("CO2", &[2]));
        let catalog = catalog(
            Category::Type2,
            &["RF_BROKEN", "RF_MISSING", "RF_TEMP", "RF_NARROW", "RF_CO2"],
        );

        let report = run_category_join(&catalog, &store, &opts(&dir), at(16, 9)).await;
        let type2 = report.category(Category::Type2).unwrap();
        let skipped: Vec<(&str, &str)> = type2
            .skipped
            .iter()
            .map(|(t, e)| (t.as_str(), e.kind()))
            .collect();
        assert_eq!(
            skipped,
            vec![
                ("rf_broken", "source_query_failed"),
                ("rf_missing", "schema_mismatch"),
                ("rf_narrow", "schema_mismatch"),
            ]
        );
        assert_eq!(type2.tables_joined, vec!["rf_temp", "rf_co2"]);

        let joined = store.table("joined_rainforest_ids_type2").unwrap();
        assert_eq!(joined.columns, vec!["unique_id", "timestamp", "TEMP", "CO2"]);
        assert_eq!(ids(&joined), vec![2]);
    }

    #[tokio::test]
    async fn test_empty_result_leaves_previous_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStagingStore::new();
        let previous = staging("TEMP", &[7]);
        store.insert_table("joined_rainforest_ids_type1", previous.clone());
        store.insert_table("rf_temp", staging("TEMP", &[1, 2]));
        store.insert_table("rf_hum", staging("HUM", &[3, 4]));
        let catalog = catalog(Category::Type1, &["RF_TEMP", "RF_HUM"]);

        let report = run_category_join(&catalog, &store, &opts(&dir), at(16, 9)).await;
        let type1 = report.category(Category::Type1).unwrap();
        assert_eq!(type1.rows, 0);
        assert!(type1.artifact.is_none());
        assert!(type1.destination.is_none());
        assert_eq!(store.table("joined_rainforest_ids_type1"), Some(previous));
        assert!(!dir.path().join("joined_tables").exists());
    }

    #[tokio::test]
    async fn test_replace_failure_keeps_previous_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStagingStore::new();
        let previous = staging("TEMP", &[7]);
        store.insert_table("joined_rainforest_ids_type1", previous.clone());
        store.insert_table("rf_temp", staging("TEMP", &[1, 2]));
        store.fail(FailOn::Replace, "joined_rainforest_ids_type1");
        let catalog = catalog(Category::Type1, &["RF_TEMP"]);

        let report = run_category_join(&catalog, &store, &opts(&dir), at(16, 9)).await;
        let type1 = report.category(Category::Type1).unwrap();
        assert!(type1.has_failure());
        assert!(matches!(type1.artifact, Some(Ok(_))));
        assert_eq!(store.table("joined_rainforest_ids_type1"), Some(previous));
    }

    #[tokio::test]
    async fn test_artifact_failure_still_replaces_table() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "x").unwrap();
        let store = MemoryStagingStore::new();
        store.insert_table("rf_temp", staging("TEMP", &[1]));
        let catalog = catalog(Category::Type1, &["RF_TEMP"]);
        let opts = JoinOpts {
            output_dir: blocker,
            metadata_table: "staging_metadata".into(),
        };

        let report = run_category_join(&catalog, &store, &opts, at(16, 9)).await;
        let type1 = report.category(Category::Type1).unwrap();
        assert!(matches!(type1.artifact, Some(Err(_))));
        assert!(type1.replaced());
    }

    #[test]
    fn test_plan_lists_categories() {
        let catalog = catalog(Category::Between50And100, &["RF_A", "RF_B"]);
        let plan = plan_category_join(&catalog);
        assert_eq!(plan.len(), Category::ALL.len());
        let (_, tables) = plan
            .iter()
            .find(|(c, _)| *c == Category::Between50And100)
            .unwrap();
        assert_eq!(tables, &vec!["rf_a".to_string(), "rf_b".to_string()]);
        // Identifiers in the plan are valid allow-listed names
        let allow = catalog.allow_list("staging_metadata");
        assert!(tables.iter().all(|t| allow.table(t).is_ok()));
        assert!(Identifier::new(&Category::Between50And100.joined_table_name()).is_ok());
    }
}
