//! Category join for biosphere-sync
//!
//! Joins the staging tables of each category on `unique_id` and materializes
//! the result twice: as a timestamped CSV artifact and as a destination table
//! that is replaced wholesale on every run.
//!
//! Inner-family categories keep only ids present in every table. Outer-family
//! categories keep the union of ids and a provenance-tagged timestamp column
//! per table.

mod artifact;
mod engine;
mod merge;

pub use artifact::write_csv_artifact;
pub use engine::{
    join_category, plan_category_join, run_category_join, CategoryReport, JoinReport,
};
pub use merge::merge_frames;

use std::path::PathBuf;

/// Join options
#[derive(Clone, Debug)]
pub struct JoinOpts {
    /// Directory receiving the CSV artifacts
    pub output_dir: PathBuf,
    /// Name of the sync metadata table
    pub metadata_table: String,
}
