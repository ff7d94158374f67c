//! Catalog lifecycle and write plumbing for the columnar store.
//!
//! The catalog is attached once per process and never dropped: table data
//! files in the object store would be orphaned by a DROP, so schema and
//! tables are only ever created if absent. All SQL runs on a blocking thread
//! under a caller-supplied deadline.

pub mod schema;

use duckdb::types::Value;
use duckdb::Connection;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{IngestError, LakehouseError};
use lumenlake_config::LakehouseConfig;
pub use schema::Table;

/// Handle over one catalog connection. Clones share the connection; use
/// [`Lakehouse::clone_connection`] to give a worker its own connection to the
/// same attached catalog.
#[derive(Clone)]
pub struct Lakehouse {
    conn: Arc<Mutex<Connection>>,
    config: LakehouseConfig,
}

impl Lakehouse {
    /// Opens the federation engine, attaches the catalog (creating it when it
    /// does not exist yet) and brings schemas and tables up to date.
    pub fn connect(config: &LakehouseConfig) -> Result<Self, LakehouseError> {
        let conn = Connection::open_in_memory()?;
        load_extensions(&conn, config)?;
        install_secret(&conn, config)?;
        attach_catalog(&conn, config)?;
        let lakehouse = Self {
            conn: Arc::new(Mutex::new(conn)),
            config: config.clone(),
        };
        lakehouse.ensure_schema()?;
        Ok(lakehouse)
    }

    /// A second connection to the same attached catalog, for a worker that
    /// must not share statement state with its siblings.
    pub fn clone_connection(&self) -> Result<Self, LakehouseError> {
        let conn = {
            let guard = self.lock();
            guard.try_clone()?
        };
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config: self.config.clone(),
        })
    }

    pub fn config(&self) -> &LakehouseConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("lakehouse connection lock is poisoned")
    }

    fn ensure_schema(&self) -> Result<(), LakehouseError> {
        let conn = self.lock();
        let config = &self.config;
        conn.execute_batch(&format!(
            "CREATE SCHEMA IF NOT EXISTS {}.{}; CREATE SCHEMA IF NOT EXISTS {}.{};",
            config.catalog_name, config.schema_name, config.catalog_name, config.metadata_schema
        ))?;
        for table in Table::ALL {
            conn.execute_batch(&table.create_sql(&config.qualified(table.name())))?;
        }
        for (table, ddl) in [
            (schema::DATASETS_TABLE, schema::DATASETS_DDL),
            (schema::LINEAGE_TABLE, schema::LINEAGE_DDL),
            (schema::QUALITY_TABLE, schema::QUALITY_DDL),
            (schema::CHANGES_TABLE, schema::CHANGES_DDL),
        ] {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} ({ddl})",
                config.qualified_meta(table)
            ))?;
        }
        Ok(())
    }

    /// Runs one blocking lakehouse operation under `deadline`. The deadline
    /// maps to [`IngestError::ChunkDeadlineExceeded`] for `context`.
    pub async fn run_blocking<T, F>(
        &self,
        deadline: Duration,
        context: &'static str,
        op: F,
    ) -> Result<T, IngestError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, LakehouseError> + Send + 'static,
    {
        let conn = self.conn.clone();
        let task = tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("lakehouse connection lock is poisoned");
            op(&guard)
        });
        match tokio::time::timeout(deadline, task).await {
            Err(_) => Err(IngestError::ChunkDeadlineExceeded {
                table: context,
                deadline,
            }),
            Ok(Err(join_err)) => {
                Err(LakehouseError::TaskAborted(join_err.to_string()).into())
            }
            Ok(Ok(result)) => result.map_err(Into::into),
        }
    }

    /// One multi-row INSERT of up to `insert_chunk_size` rows, positional
    /// placeholders, fixed column order per table.
    pub async fn insert_chunk(
        &self,
        table: Table,
        rows: Vec<Vec<Value>>,
        deadline: Duration,
    ) -> Result<usize, IngestError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let sql = build_insert_sql(
            &self.config.qualified(table.name()),
            table.columns(),
            rows.len(),
        );
        self.run_blocking(deadline, table.name(), move |conn| {
            let params: Vec<Value> = rows.into_iter().flatten().collect();
            let mut stmt = conn.prepare(&sql)?;
            Ok(stmt.execute(duckdb::params_from_iter(params))?)
        })
        .await
    }

    /// Row count of a fully qualified table. Read path for sanity checks and
    /// tests; the real read surface lives in the reader crate.
    pub fn table_count(&self, qualified: &str) -> Result<u64, LakehouseError> {
        let conn = self.lock();
        let count: u64 =
            conn.query_row(&format!("SELECT count(*) FROM {qualified}"), [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }

    /// Highest ledger sequence already present inside `[start, end]`, if any.
    /// Lets a worker surface overlap with earlier runs before it streams.
    pub fn max_sequence_between(
        &self,
        qualified: &str,
        start: u32,
        end: u32,
    ) -> Result<Option<u32>, LakehouseError> {
        let conn = self.lock();
        let max: Option<u32> = conn.query_row(
            &format!("SELECT max(sequence) FROM {qualified} WHERE sequence BETWEEN ? AND ?"),
            duckdb::params![start, end],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    /// Sequences currently present for a ledger-keyed table, ascending.
    pub fn sequences(&self, qualified: &str, column: &str) -> Result<Vec<u32>, LakehouseError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT {column} FROM {qualified} ORDER BY {column}"
        ))?;
        let rows = stmt.query_map([], |row| row.get::<_, u32>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

/// Builds `INSERT INTO t (c1, c2) VALUES (?, ?), (?, ?), …`.
pub fn build_insert_sql(qualified: &str, columns: &[&str], row_count: usize) -> String {
    let placeholder_row = format!(
        "({})",
        columns.iter().map(|_| "?").collect::<Vec<_>>().join(", ")
    );
    let placeholders = std::iter::repeat(placeholder_row.as_str())
        .take(row_count)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {qualified} ({}) VALUES {placeholders}",
        columns.join(", ")
    )
}

fn load_extensions(conn: &Connection, config: &LakehouseConfig) -> Result<(), LakehouseError> {
    if config.catalog_path.starts_with("ducklake:") {
        conn.execute_batch("INSTALL ducklake; LOAD ducklake;")?;
    }
    if config.credentials.is_some() {
        conn.execute_batch("INSTALL httpfs; LOAD httpfs;")?;
    }
    Ok(())
}

fn install_secret(conn: &Connection, config: &LakehouseConfig) -> Result<(), LakehouseError> {
    let Some(creds) = &config.credentials else {
        return Ok(());
    };
    let mut options = format!(
        "TYPE S3, KEY_ID '{}', SECRET '{}', REGION '{}'",
        sql_escape(&creds.key_id),
        sql_escape(&creds.secret),
        sql_escape(&creds.region)
    );
    if let Some(endpoint) = &creds.endpoint {
        options.push_str(&format!(", ENDPOINT '{}'", sql_escape(endpoint)));
    }
    conn.execute_batch(&format!(
        "CREATE OR REPLACE SECRET lake_object_store ({options});"
    ))?;
    Ok(())
}

/// Attaches the catalog. The first attempt omits the creation option so an
/// existing catalog keeps its recorded data path; only when the catalog does
/// not exist yet is the attach retried with `DATA_PATH`, which creating a new
/// catalog requires.
fn attach_catalog(conn: &Connection, config: &LakehouseConfig) -> Result<(), LakehouseError> {
    let plain = format!(
        "ATTACH IF NOT EXISTS '{}' AS {}",
        sql_escape(&config.catalog_path),
        config.catalog_name
    );
    let missing = match conn.execute_batch(&plain) {
        Ok(()) => return Ok(()),
        Err(err) if err.to_string().contains("does not exist") => err,
        Err(err) => {
            return Err(LakehouseError::AttachFailed {
                catalog: config.catalog_path.clone(),
                message: err.to_string(),
            })
        }
    };
    tracing::info!(
        catalog = %config.catalog_path,
        "catalog does not exist yet, attaching with creation options ({missing})"
    );
    let options = match &config.data_path {
        Some(data_path) => format!(" (DATA_PATH '{}')", sql_escape(data_path)),
        None => String::new(),
    };
    let create = format!(
        "ATTACH IF NOT EXISTS '{}' AS {}{}",
        sql_escape(&config.catalog_path),
        config.catalog_name,
        options
    );
    conn.execute_batch(&create)
        .map_err(|err| LakehouseError::AttachFailed {
            catalog: config.catalog_path.clone(),
            message: err.to_string(),
        })
}

fn sql_escape(raw: &str) -> String {
    raw.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_ledger_row, test_lakehouse};

    #[test]
    fn connect_is_idempotent() {
        let (dir, config) = test_lakehouse();
        let first = Lakehouse::connect(&config).unwrap();
        drop(first);
        // Second connect attaches the existing catalog and re-runs DDL.
        let second = Lakehouse::connect(&config).unwrap();
        assert_eq!(
            second
                .table_count(&config.qualified(Table::Ledgers.name()))
                .unwrap(),
            0
        );
        drop(dir);
    }

    #[tokio::test]
    async fn insert_chunk_lands_rows() {
        let (_dir, config) = test_lakehouse();
        let lakehouse = Lakehouse::connect(&config).unwrap();
        let rows: Vec<Vec<duckdb::types::Value>> = (0..5)
            .map(|i| schema::ledger_values(&sample_ledger_row(100 + i)))
            .collect();
        let inserted = lakehouse
            .insert_chunk(Table::Ledgers, rows, std::time::Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(inserted, 5);
        assert_eq!(
            lakehouse
                .sequences(&config.qualified(Table::Ledgers.name()), "sequence")
                .unwrap(),
            vec![100, 101, 102, 103, 104]
        );
    }

    #[test]
    fn insert_sql_shape() {
        let sql = build_insert_sql("lake.s.t", &["a", "b"], 2);
        assert_eq!(sql, "INSERT INTO lake.s.t (a, b) VALUES (?, ?), (?, ?)");
    }
}
