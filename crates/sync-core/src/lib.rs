//! Core types for the biosphere staging pipeline.
//!
//! This crate provides the foundational types shared by the sync and join
//! engines:
//!
//! - [`Category`] / [`JoinPolicy`] - The closed set of join categories
//! - [`value_column_name`] - Deterministic value-column naming per source table
//! - [`derive_column_roles`] - Pure column-role derivation for the join engine
//! - [`IdentifierAllowList`] - Catalog-derived allow-list for SQL identifiers
//! - [`Cell`] / [`TableData`] - Tabular values moved between stores
//! - [`Catalog`] - Table → category manifest loader
//! - [`PipelineError`] - Error kinds shared across the pipeline
//!
//! # Architecture
//!
//! ```text
//! sync-core (this crate)
//!    │
//!    ├─── biosphere-staging          (stores staging tables and metadata)
//!    ├─── biosphere-incremental-sync (source → staging)
//!    └─── biosphere-category-join    (staging → joined tables)
//! ```

pub mod catalog;
pub mod category;
pub mod error;
pub mod ident;
pub mod naming;
pub mod roles;
pub mod values;

pub use catalog::{load_catalog, Catalog, CatalogEntry};
pub use category::{Category, JoinPolicy};
pub use error::PipelineError;
pub use ident::{Identifier, IdentifierAllowList};
pub use naming::{staging_table_name, value_column_name};
pub use roles::{derive_column_roles, resolve_timestamp_column, ColumnRoles};
pub use values::{Cell, SourceRow, StagedRow, TableData};

/// Name of the sequential identifier column in every staging and joined table.
pub const UNIQUE_ID_COLUMN: &str = "unique_id";

/// Name of the timestamp column in every staging table.
pub const TIMESTAMP_COLUMN: &str = "timestamp";
