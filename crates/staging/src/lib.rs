//! Staging store for biosphere-sync
//!
//! Holds the three kinds of tables the pipeline writes:
//! - staging tables (`unique_id`, `timestamp`, value column), one per source table
//! - the sync metadata table, one row per staging table
//! - joined tables, one per category, replaced wholesale on every join run
//!
//! ## Storage Backends
//!
//! - `MySqlStagingStore` - MySQL staging database via `mysql_async`
//! - `MemoryStagingStore` - In-process store with failure injection, used by
//!   tests and dry runs of the engines

mod client;
mod memory;
mod metadata;
mod mysql;
mod store;

pub use client::{new_mysql_pool, sanitize_connection_string};
pub use memory::{FailOn, MemoryStagingStore};
pub use metadata::{count_fresh, SyncMetadata};
pub use mysql::MySqlStagingStore;
pub use store::{StagingStore, TableSummary};

/// Default name of the sync metadata table.
pub const DEFAULT_METADATA_TABLE: &str = "staging_metadata";
