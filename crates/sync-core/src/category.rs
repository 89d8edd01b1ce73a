//! Join categories and their join policies.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// How the tables of a category are merged on `unique_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinPolicy {
    /// Keep only ids present on both sides
    Inner,
    /// Keep the union of ids, filling the absent side with nulls
    Outer,
}

impl JoinPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinPolicy::Inner => "inner",
            JoinPolicy::Outer => "outer",
        }
    }
}

impl std::fmt::Display for JoinPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fixed named grouping of staging tables.
///
/// The set is closed; each category is statically assigned a join policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Type1,
    Type2,
    Less50,
    Between50And100,
    Other,
}

impl Category {
    /// Every category, in processing order.
    pub const ALL: [Category; 5] = [
        Category::Type1,
        Category::Type2,
        Category::Less50,
        Category::Between50And100,
        Category::Other,
    ];

    /// Convert to string representation for manifests, table and file naming
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Type1 => "type1",
            Category::Type2 => "type2",
            Category::Less50 => "less50",
            Category::Between50And100 => "between50and100",
            Category::Other => "other",
        }
    }

    pub fn join_policy(&self) -> JoinPolicy {
        match self {
            Category::Type1 | Category::Type2 => JoinPolicy::Inner,
            Category::Less50 | Category::Between50And100 | Category::Other => JoinPolicy::Outer,
        }
    }

    /// Outer-family categories keep a provenance-tagged timestamp per table.
    pub fn tags_timestamps(&self) -> bool {
        self.join_policy() == JoinPolicy::Outer
    }

    /// Destination table fully replaced on every join run.
    pub fn joined_table_name(&self) -> String {
        format!("joined_rainforest_ids_{}", self.as_str())
    }

    /// File name of the CSV artifact written at `now`.
    pub fn artifact_file_name(&self, now: NaiveDateTime) -> String {
        format!(
            "joined_tables_ids_{}_{}.csv",
            self.as_str(),
            now.format("%Y%m%d_%H%M%S")
        )
    }
}

impl std::str::FromStr for Category {
    type Err = crate::PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                crate::PipelineError::ConfigurationMissing(format!("Unknown category: {wanted}"))
            })
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
