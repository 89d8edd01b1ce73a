//! Catalog loader: the table → category manifest.
//!
//! The manifest is a CSV file. Header spellings used by the controls-history
//! exports are accepted alongside the canonical ones:
//!
//! | Meaning  | Accepted headers                          |
//! |----------|-------------------------------------------|
//! | table    | `table_name`, `TABLE_NAME`, `Table Name`  |
//! | category | `category`, `Id`, `CATEGORY`              |
//! | biome    | `biome`, `BIOMNAME`                       |
//!
//! A missing or malformed manifest yields an empty catalog, never an error.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::{staging_table_name, Category, Identifier, IdentifierAllowList, PipelineError};

#[derive(Debug, Deserialize)]
struct ManifestRecord {
    #[serde(alias = "TABLE_NAME", alias = "Table Name")]
    table_name: String,
    #[serde(default, alias = "Id", alias = "CATEGORY")]
    category: Option<String>,
    #[serde(default, alias = "BIOMNAME")]
    biome: Option<String>,
}

/// One source table listed in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Source table name as written in the manifest
    pub table: String,
    /// Join category, when the manifest assigns one from the closed set
    pub category: Option<Category>,
}

impl CatalogEntry {
    pub fn staging_table(&self) -> String {
        staging_table_name(&self.table)
    }
}

/// Ordered list of catalog tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every table to sync, in manifest order.
    pub fn sync_tables(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.table.as_str())
    }

    /// Staging tables belonging to a category, in manifest order.
    pub fn tables_for(&self, category: Category) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.category == Some(category))
            .map(CatalogEntry::staging_table)
            .collect()
    }

    /// Tables the pipeline may name in SQL: staging tables, the metadata
    /// table and every joined destination table.
    pub fn allow_list(&self, metadata_table: &str) -> IdentifierAllowList {
        let mut allow = IdentifierAllowList::new().with(metadata_table);
        for entry in &self.entries {
            allow.allow(&entry.staging_table());
        }
        for category in Category::ALL {
            allow.allow(&category.joined_table_name());
        }
        allow
    }
}

/// Read the manifest, logging and returning an empty catalog on failure.
pub fn load_catalog(path: impl AsRef<Path>, biome: Option<&str>) -> Catalog {
    let path = path.as_ref();
    info!("Reading table configuration from: {}", path.display());
    match try_load_catalog(path, biome) {
        Ok(catalog) => {
            info!("Found {} tables in the configuration file", catalog.len());
            catalog
        }
        Err(e) => {
            error!(kind = e.kind(), "{e}");
            Catalog::default()
        }
    }
}

/// Read the manifest, surfacing [`PipelineError::ConfigurationMissing`].
pub fn try_load_catalog(path: &Path, biome: Option<&str>) -> Result<Catalog, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| {
            PipelineError::ConfigurationMissing(format!(
                "cannot open manifest '{}': {e}",
                path.display()
            ))
        })?;

    let mut entries = Vec::new();
    let mut seen = HashSet::new();

    for record in reader.deserialize::<ManifestRecord>() {
        let record = record.map_err(|e| {
            PipelineError::ConfigurationMissing(format!(
                "malformed manifest '{}': {e}",
                path.display()
            ))
        })?;

        if let (Some(wanted), Some(actual)) = (biome, record.biome.as_deref()) {
            if !actual.eq_ignore_ascii_case(wanted) {
                continue;
            }
        }

        let table = record.table_name.trim().to_string();
        if let Err(e) = Identifier::new(&table) {
            warn!("Skipping manifest row: {e}");
            continue;
        }
        if !seen.insert(table.to_lowercase()) {
            continue;
        }

        let category = match record.category.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match raw.parse::<Category>() {
                Ok(category) => Some(category),
                Err(_) => {
                    warn!("Table {table} has unknown category '{raw}'; it will not be joined");
                    None
                }
            },
        };

        entries.push(CatalogEntry { table, category });
    }

    Ok(Catalog::new(entries))
}
