pub mod constants;

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_CATALOG_NAME, DEFAULT_COMMIT_INTERVAL, DEFAULT_INSERT_CHUNK_SIZE,
    DEFAULT_METADATA_SCHEMA, DEFAULT_SCHEMA_NAME, DEFAULT_STREAM_TIMEOUT,
};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file `{path}`: {source}")]
    Malformed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Upstream raw-ledger stream source.
#[derive(Clone, Debug, Deserialize)]
pub struct SourceConfig {
    /// gRPC endpoint of the raw ledger service, e.g. `http://localhost:50051`.
    pub endpoint: String,
    /// Network passphrase the envelopes were produced under.
    pub network_passphrase: String,
    pub start_ledger: u32,
    pub end_ledger: u32,
    /// Seconds of stream silence tolerated before the worker aborts.
    #[serde(default = "default_stream_timeout_seconds")]
    pub stream_timeout_seconds: u64,
}

impl SourceConfig {
    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_seconds)
    }
}

/// Object-store credentials installed as a catalog secret.
#[derive(Clone, Debug, Deserialize)]
pub struct ObjectStoreCredentials {
    pub key_id: String,
    pub secret: String,
    pub region: String,
    pub endpoint: Option<String>,
}

/// Lakehouse catalog attachment and write tuning.
#[derive(Clone, Debug, Deserialize)]
pub struct LakehouseConfig {
    /// Catalog URI passed to ATTACH. A `ducklake:` prefix selects the
    /// lakehouse extension; a plain path attaches a local database file.
    pub catalog_path: String,
    /// Object-store (or filesystem) root for table data files.
    pub data_path: Option<String>,
    #[serde(default = "default_catalog_name")]
    pub catalog_name: String,
    #[serde(default = "default_schema_name")]
    pub schema_name: String,
    #[serde(default = "default_metadata_schema")]
    pub metadata_schema: String,
    /// Ledgers buffered per worker before a size-triggered flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_commit_interval_seconds")]
    pub commit_interval_seconds: u64,
    /// Rows per multi-row INSERT statement.
    #[serde(default = "default_insert_chunk_size")]
    pub insert_chunk_size: usize,
    /// 1 runs the range on a single worker; N > 1 splits it across N workers.
    #[serde(default = "default_num_workers")]
    pub num_workers: u32,
    pub credentials: Option<ObjectStoreCredentials>,
}

impl LakehouseConfig {
    pub fn commit_interval(&self) -> Duration {
        Duration::from_secs(self.commit_interval_seconds)
    }

    /// Fully qualified name of a table in the data schema.
    pub fn qualified(&self, table: &str) -> String {
        format!("{}.{}.{}", self.catalog_name, self.schema_name, table)
    }

    /// Fully qualified name of a table in the metadata schema.
    pub fn qualified_meta(&self, table: &str) -> String {
        format!("{}.{}.{}", self.catalog_name, self.metadata_schema, table)
    }
}

/// Read-path configuration: where the hot row-store lives relative to the
/// cold catalog the ingester writes.
#[derive(Clone, Debug, Deserialize)]
pub struct ReaderConfig {
    /// Attachable URI of the hot row-store.
    pub hot_path: String,
    #[serde(default = "default_hot_schema")]
    pub hot_schema: String,
}

/// Top-level configuration for the ingestion pipeline binary.
#[derive(Clone, Debug, Deserialize)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub lakehouse: LakehouseConfig,
    pub reader: Option<ReaderConfig>,
}

impl PipelineConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Malformed {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.endpoint.is_empty() {
            return Err(ConfigError::Invalid("source.endpoint is empty".into()));
        }
        if self.source.end_ledger <= self.source.start_ledger {
            return Err(ConfigError::Invalid(format!(
                "source.end_ledger ({}) must be greater than source.start_ledger ({})",
                self.source.end_ledger, self.source.start_ledger
            )));
        }
        if self.lakehouse.num_workers == 0 {
            return Err(ConfigError::Invalid(
                "lakehouse.num_workers must be at least 1".into(),
            ));
        }
        if self.lakehouse.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "lakehouse.batch_size must be at least 1".into(),
            ));
        }
        if self.lakehouse.insert_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "lakehouse.insert_chunk_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_stream_timeout_seconds() -> u64 {
    DEFAULT_STREAM_TIMEOUT.as_secs()
}

fn default_catalog_name() -> String {
    DEFAULT_CATALOG_NAME.to_string()
}

fn default_schema_name() -> String {
    DEFAULT_SCHEMA_NAME.to_string()
}

fn default_metadata_schema() -> String {
    DEFAULT_METADATA_SCHEMA.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_commit_interval_seconds() -> u64 {
    DEFAULT_COMMIT_INTERVAL.as_secs()
}

fn default_insert_chunk_size() -> usize {
    DEFAULT_INSERT_CHUNK_SIZE
}

fn default_num_workers() -> u32 {
    1
}

fn default_hot_schema() -> String {
    "main".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<PipelineConfig, ConfigError> {
        let config: PipelineConfig = toml::from_str(raw).expect("syntactically valid toml");
        config.validate().map(|()| config)
    }

    const MINIMAL: &str = r#"
        [source]
        endpoint = "http://localhost:50051"
        network_passphrase = "Test SDF Network ; September 2015"
        start_ledger = 1000
        end_ledger = 2000

        [lakehouse]
        catalog_path = "ducklake:/tmp/catalog.ducklake"
        data_path = "/tmp/lake-data"
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = parse(MINIMAL).unwrap();
        assert_eq!(config.lakehouse.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.lakehouse.insert_chunk_size, DEFAULT_INSERT_CHUNK_SIZE);
        assert_eq!(config.lakehouse.num_workers, 1);
        assert_eq!(config.lakehouse.catalog_name, "lake");
        assert_eq!(config.source.stream_timeout(), DEFAULT_STREAM_TIMEOUT);
        assert!(config.reader.is_none());
    }

    #[test]
    fn qualified_names_join_catalog_schema_table() {
        let config = parse(MINIMAL).unwrap();
        assert_eq!(
            config.lakehouse.qualified("ledgers_row_v2"),
            "lake.ledger_data.ledgers_row_v2"
        );
        assert_eq!(
            config.lakehouse.qualified_meta("_meta_lineage"),
            "lake.meta._meta_lineage"
        );
    }

    #[test]
    fn rejects_inverted_ledger_range() {
        let raw = MINIMAL.replace("end_ledger = 2000", "end_ledger = 1000");
        assert!(matches!(parse(&raw), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_workers() {
        let raw = format!("{MINIMAL}\nnum_workers = 0");
        assert!(matches!(parse(&raw), Err(ConfigError::Invalid(_))));
    }
}
