use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Medallion tier a dataset belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetTier {
    Raw,
    Enriched,
    Analytics,
}

impl DatasetTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetTier::Raw => "raw",
            DatasetTier::Enriched => "enriched",
            DatasetTier::Analytics => "analytics",
        }
    }
}

/// Registry entry for one logical table.
///
/// Registration is idempotent: re-registering an existing dataset only bumps
/// `current_minor_version` and `updated_at`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub dataset_name: String,
    pub tier: DatasetTier,
    pub domain: String,
    pub major_version: u32,
    pub current_minor_version: u32,
    pub grain: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One provenance record per (dataset, flush).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineageRecord {
    pub id: i64,
    pub dataset_name: String,
    pub source_ledger_start: u32,
    pub source_ledger_end: u32,
    pub pipeline_version: String,
    pub processor_name: String,
    pub row_count: u64,
    pub worker_id: u32,
    pub trigger: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one quality check over one flush's buffer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualityRecord {
    pub id: i64,
    pub dataset_name: String,
    pub check_name: String,
    pub passed: bool,
    pub detail: String,
    pub ledger_start: u32,
    pub ledger_end: u32,
    pub created_at: DateTime<Utc>,
}

/// Append-only log entry for dataset version changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaChangeRecord {
    pub id: i64,
    pub dataset_name: String,
    pub from_minor_version: u32,
    pub to_minor_version: u32,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
