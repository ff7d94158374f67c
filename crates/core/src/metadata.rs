//! Metadata plane: dataset registry, per-flush lineage and quality records.
//!
//! Appends are single INSERT statements with caller-generated, time-based
//! ids, so concurrent workers never coordinate beyond the catalog itself.

use chrono::Utc;
use duckdb::types::Value;

use crate::error::IngestError;
use crate::lakehouse::schema::{
    timestamp_value, CHANGES_TABLE, DATASETS_TABLE, LINEAGE_TABLE, QUALITY_TABLE,
};
use crate::lakehouse::{build_insert_sql, Lakehouse, Table};
use lumenlake_config::constants::METADATA_INSERT_DEADLINE;
use lumenlake_types::{DatasetRecord, DatasetTier, LineageRecord, QualityRecord};

const LINEAGE_COLUMNS: &[&str] = &[
    "id",
    "dataset_name",
    "source_ledger_start",
    "source_ledger_end",
    "pipeline_version",
    "processor_name",
    "row_count",
    "worker_id",
    "flush_trigger",
    "created_at",
];

const QUALITY_COLUMNS: &[&str] = &[
    "id",
    "dataset_name",
    "check_name",
    "passed",
    "detail",
    "ledger_start",
    "ledger_end",
    "created_at",
];

/// The datasets this pipeline populates, one per persisted table.
pub fn known_datasets() -> Vec<DatasetRecord> {
    let now = Utc::now();
    let dataset = |table: Table, tier: DatasetTier, major: u32, grain: &str| DatasetRecord {
        dataset_name: table.name().to_string(),
        tier,
        domain: "stellar".to_string(),
        major_version: major,
        current_minor_version: 1,
        grain: grain.to_string(),
        created_at: now,
        updated_at: now,
    };
    vec![
        dataset(Table::Ledgers, DatasetTier::Raw, 2, "ledger"),
        dataset(Table::Transactions, DatasetTier::Raw, 2, "transaction"),
        dataset(Table::Operations, DatasetTier::Raw, 2, "operation"),
        dataset(Table::Balances, DatasetTier::Enriched, 1, "account-ledger"),
    ]
}

/// Caller-generated id: microsecond timestamp plus an ordinal to keep ids
/// unique within one append batch.
pub fn time_based_id(ordinal: usize) -> i64 {
    Utc::now().timestamp_micros() + ordinal as i64
}

#[derive(Clone)]
pub struct MetadataPlane {
    lakehouse: Lakehouse,
}

impl MetadataPlane {
    pub fn new(lakehouse: Lakehouse) -> Self {
        Self { lakehouse }
    }

    /// Idempotent registration: insert absent datasets, bump the minor
    /// version and `updated_at` of existing ones. Version bumps are logged to
    /// the schema-change table.
    pub async fn register_datasets(&self, datasets: Vec<DatasetRecord>) -> Result<(), IngestError> {
        let config = self.lakehouse.config().clone();
        self.lakehouse
            .run_blocking(METADATA_INSERT_DEADLINE, DATASETS_TABLE, move |conn| {
                let registry = config.qualified_meta(DATASETS_TABLE);
                let changes = config.qualified_meta(CHANGES_TABLE);
                for (ordinal, dataset) in datasets.iter().enumerate() {
                    let existing: Option<u32> = match conn.query_row(
                        &format!(
                            "SELECT current_minor_version FROM {registry} WHERE dataset_name = ?"
                        ),
                        [dataset.dataset_name.as_str()],
                        |row| row.get(0),
                    ) {
                        Ok(version) => Some(version),
                        Err(duckdb::Error::QueryReturnedNoRows) => None,
                        Err(err) => return Err(err.into()),
                    };
                    match existing {
                        None => {
                            conn.execute(
                                &format!(
                                    "INSERT INTO {registry} (dataset_name, tier, domain, \
                                     major_version, current_minor_version, grain, created_at, \
                                     updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
                                ),
                                duckdb::params_from_iter(vec![
                                    Value::Text(dataset.dataset_name.clone()),
                                    Value::Text(dataset.tier.as_str().to_string()),
                                    Value::Text(dataset.domain.clone()),
                                    Value::UInt(dataset.major_version),
                                    Value::UInt(dataset.current_minor_version),
                                    Value::Text(dataset.grain.clone()),
                                    timestamp_value(&dataset.created_at),
                                    timestamp_value(&dataset.updated_at),
                                ]),
                            )?;
                        }
                        Some(version) => {
                            conn.execute(
                                &format!(
                                    "UPDATE {registry} SET current_minor_version = ?, \
                                     updated_at = ? WHERE dataset_name = ?"
                                ),
                                duckdb::params_from_iter(vec![
                                    Value::UInt(dataset.current_minor_version),
                                    timestamp_value(&Utc::now()),
                                    Value::Text(dataset.dataset_name.clone()),
                                ]),
                            )?;
                            if version != dataset.current_minor_version {
                                conn.execute(
                                    &format!(
                                        "INSERT INTO {changes} (id, dataset_name, \
                                         from_minor_version, to_minor_version, description, \
                                         created_at) VALUES (?, ?, ?, ?, ?, ?)"
                                    ),
                                    duckdb::params_from_iter(vec![
                                        Value::BigInt(time_based_id(ordinal)),
                                        Value::Text(dataset.dataset_name.clone()),
                                        Value::UInt(version),
                                        Value::UInt(dataset.current_minor_version),
                                        Value::Text("minor version bump at startup".to_string()),
                                        timestamp_value(&Utc::now()),
                                    ]),
                                )?;
                            }
                        }
                    }
                }
                Ok(())
            })
            .await
    }

    /// Appends all lineage rows of one flush in a single batched INSERT.
    pub async fn append_lineage(&self, records: Vec<LineageRecord>) -> Result<(), IngestError> {
        if records.is_empty() {
            return Ok(());
        }
        let qualified = self.lakehouse.config().qualified_meta(LINEAGE_TABLE);
        let sql = build_insert_sql(&qualified, LINEAGE_COLUMNS, records.len());
        self.lakehouse
            .run_blocking(METADATA_INSERT_DEADLINE, LINEAGE_TABLE, move |conn| {
                let params: Vec<Value> = records
                    .iter()
                    .flat_map(|record| {
                        vec![
                            Value::BigInt(record.id),
                            Value::Text(record.dataset_name.clone()),
                            Value::UInt(record.source_ledger_start),
                            Value::UInt(record.source_ledger_end),
                            Value::Text(record.pipeline_version.clone()),
                            Value::Text(record.processor_name.clone()),
                            Value::UBigInt(record.row_count),
                            Value::UInt(record.worker_id),
                            Value::Text(record.trigger.clone()),
                            timestamp_value(&record.created_at),
                        ]
                    })
                    .collect();
                let mut stmt = conn.prepare(&sql)?;
                Ok(stmt.execute(duckdb::params_from_iter(params))?)
            })
            .await?;
        Ok(())
    }

    pub async fn append_quality(&self, records: Vec<QualityRecord>) -> Result<(), IngestError> {
        if records.is_empty() {
            return Ok(());
        }
        let qualified = self.lakehouse.config().qualified_meta(QUALITY_TABLE);
        let sql = build_insert_sql(&qualified, QUALITY_COLUMNS, records.len());
        self.lakehouse
            .run_blocking(METADATA_INSERT_DEADLINE, QUALITY_TABLE, move |conn| {
                let params: Vec<Value> = records
                    .iter()
                    .flat_map(|record| {
                        vec![
                            Value::BigInt(record.id),
                            Value::Text(record.dataset_name.clone()),
                            Value::Text(record.check_name.clone()),
                            Value::Boolean(record.passed),
                            Value::Text(record.detail.clone()),
                            Value::UInt(record.ledger_start),
                            Value::UInt(record.ledger_end),
                            timestamp_value(&record.created_at),
                        ]
                    })
                    .collect();
                let mut stmt = conn.prepare(&sql)?;
                Ok(stmt.execute(duckdb::params_from_iter(params))?)
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_lakehouse;

    #[tokio::test]
    async fn registration_is_idempotent() {
        let (_dir, config) = test_lakehouse();
        let lakehouse = Lakehouse::connect(&config).unwrap();
        let plane = MetadataPlane::new(lakehouse.clone());
        plane.register_datasets(known_datasets()).await.unwrap();
        plane.register_datasets(known_datasets()).await.unwrap();
        assert_eq!(
            lakehouse
                .table_count(&config.qualified_meta(DATASETS_TABLE))
                .unwrap(),
            4
        );
    }

    #[tokio::test]
    async fn version_bump_is_logged_to_changes() {
        let (_dir, config) = test_lakehouse();
        let lakehouse = Lakehouse::connect(&config).unwrap();
        let plane = MetadataPlane::new(lakehouse.clone());
        plane.register_datasets(known_datasets()).await.unwrap();
        let mut bumped = known_datasets();
        bumped[0].current_minor_version = 2;
        plane.register_datasets(bumped).await.unwrap();
        assert_eq!(
            lakehouse
                .table_count(&config.qualified_meta(CHANGES_TABLE))
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn lineage_rows_land_in_one_batch() {
        let (_dir, config) = test_lakehouse();
        let lakehouse = Lakehouse::connect(&config).unwrap();
        let plane = MetadataPlane::new(lakehouse.clone());
        let now = Utc::now();
        let records: Vec<LineageRecord> = (0..4)
            .map(|i| LineageRecord {
                id: time_based_id(i),
                dataset_name: format!("dataset_{i}"),
                source_ledger_start: 5000,
                source_ledger_end: 5099,
                pipeline_version: "0.4.2".to_string(),
                processor_name: "lumenlake-ingester".to_string(),
                row_count: 100,
                worker_id: 0,
                trigger: "size".to_string(),
                created_at: now,
            })
            .collect();
        plane.append_lineage(records).await.unwrap();
        assert_eq!(
            lakehouse
                .table_count(&config.qualified_meta(LINEAGE_TABLE))
                .unwrap(),
            4
        );
    }
}
