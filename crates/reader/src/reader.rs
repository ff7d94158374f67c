use duckdb::types::Value;
use duckdb::Connection;
use std::sync::Mutex;

use crate::cursor::{Cursor, CursorError};
use lumenlake_config::{LakehouseConfig, ReaderConfig};
use lumenlake_types::{BalanceFilter, OperationFilter, SortBy, SortOrder};

const BALANCES_TABLE: &str = "native_balances_snapshot_v1";
const OPERATIONS_TABLE: &str = "operations_row_v2";

const BALANCE_COLUMNS: &str = "account_id, ledger_sequence, balance, buying_liabilities, \
     selling_liabilities, num_subentries, num_sponsored, num_sponsoring, sequence_number, flags";

const OPERATION_COLUMNS: &str = "ledger_sequence, transaction_hash, operation_index, \
     operation_type, transaction_successful, source_account, destination, asset_type, \
     asset_code, asset_issuer, amount";

#[derive(thiserror::Error, Debug)]
pub enum ReaderError {
    #[error("failed to attach {store} store `{uri}`: {message}")]
    Attach {
        store: &'static str,
        uri: String,
        message: String,
    },
    #[error("sql error: {0}")]
    Sql(#[from] duckdb::Error),
    #[error(transparent)]
    Cursor(#[from] CursorError),
}

/// Current or historical native balance of one account, as served to clients.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct AccountBalance {
    pub account_id: String,
    pub last_modified_ledger: u32,
    pub balance: i64,
    pub buying_liabilities: i64,
    pub selling_liabilities: i64,
    pub num_subentries: u32,
    pub num_sponsored: u32,
    pub num_sponsoring: u32,
    pub sequence_number: i64,
    pub flags: u32,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct OperationRecord {
    pub ledger_sequence: u32,
    pub transaction_hash: String,
    pub operation_index: u32,
    pub operation_type: String,
    pub transaction_successful: bool,
    pub source_account: Option<String>,
    pub destination: Option<String>,
    pub asset_type: Option<String>,
    pub asset_code: Option<String>,
    pub asset_issuer: Option<String>,
    pub amount: Option<i64>,
}

/// One page of results plus the cursor for the next one. `next_cursor` is
/// present if and only if more rows exist past this page.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub next_cursor: Option<String>,
}

/// Federates the hot row-store and the cold columnar store behind one
/// connection. Merge queries tag every row with its source (1 = hot) and
/// deduplicate by primary key with hot winning.
pub struct UnifiedReader {
    conn: Mutex<Connection>,
    hot_prefix: String,
    cold_prefix: String,
}

impl UnifiedReader {
    pub fn connect(
        lakehouse: &LakehouseConfig,
        reader: &ReaderConfig,
    ) -> Result<Self, ReaderError> {
        let conn = Connection::open_in_memory().map_err(ReaderError::Sql)?;
        if lakehouse.catalog_path.starts_with("ducklake:") {
            conn.execute_batch("INSTALL ducklake; LOAD ducklake;")?;
        }
        if let Some(creds) = &lakehouse.credentials {
            conn.execute_batch("INSTALL httpfs; LOAD httpfs;")?;
            let mut options = format!(
                "TYPE S3, KEY_ID '{}', SECRET '{}', REGION '{}'",
                creds.key_id.replace('\'', "''"),
                creds.secret.replace('\'', "''"),
                creds.region.replace('\'', "''")
            );
            if let Some(endpoint) = &creds.endpoint {
                options.push_str(&format!(", ENDPOINT '{}'", endpoint.replace('\'', "''")));
            }
            conn.execute_batch(&format!(
                "CREATE OR REPLACE SECRET lake_object_store ({options});"
            ))?;
        }
        attach(&conn, "cold", &lakehouse.catalog_path, &lakehouse.catalog_name)?;
        attach(&conn, "hot", &reader.hot_path, "hot")?;
        tracing::debug!(
            cold = %lakehouse.catalog_path,
            hot = %reader.hot_path,
            "unified reader attached both stores"
        );
        Ok(Self {
            conn: Mutex::new(conn),
            hot_prefix: format!("hot.{}", reader.hot_schema),
            cold_prefix: format!("{}.{}", lakehouse.catalog_name, lakehouse.schema_name),
        })
    }

    fn balances_union(&self) -> String {
        format!(
            "SELECT {BALANCE_COLUMNS}, 1 AS source FROM {}.{BALANCES_TABLE} \
             UNION ALL \
             SELECT {BALANCE_COLUMNS}, 2 AS source FROM {}.{BALANCES_TABLE}",
            self.hot_prefix, self.cold_prefix
        )
    }

    fn operations_union(&self) -> String {
        format!(
            "SELECT {OPERATION_COLUMNS}, 1 AS source FROM {}.{OPERATIONS_TABLE} \
             UNION ALL \
             SELECT {OPERATION_COLUMNS}, 2 AS source FROM {}.{OPERATIONS_TABLE}",
            self.hot_prefix, self.cold_prefix
        )
    }

    /// The row with the highest last-modified ledger across both stores, the
    /// hot copy winning ties. `None` when neither store knows the account.
    pub fn get_current(&self, account_id: &str) -> Result<Option<AccountBalance>, ReaderError> {
        let sql = format!(
            "SELECT {BALANCE_COLUMNS} FROM ({}) \
             WHERE account_id = ? \
             ORDER BY ledger_sequence DESC, source ASC \
             LIMIT 1",
            self.balances_union()
        );
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map([account_id], map_balance)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Balance snapshots of one account in descending ledger order. The
    /// cursor is the last returned ledger sequence.
    pub fn get_history(
        &self,
        account_id: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page<AccountBalance>, ReaderError> {
        let before = Cursor::decode_history(cursor)?;
        let mut predicates = String::from("WHERE account_id = ?");
        let mut params: Vec<Value> = vec![Value::Text(account_id.to_string())];
        if let Some(before) = before {
            predicates.push_str(" AND ledger_sequence < ?");
            params.push(Value::UInt(before));
        }
        let sql = format!(
            "SELECT DISTINCT ON (ledger_sequence) {BALANCE_COLUMNS} FROM ({}) \
             {predicates} \
             ORDER BY ledger_sequence DESC, source ASC \
             LIMIT {}",
            self.balances_union(),
            limit + 1
        );
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(duckdb::params_from_iter(params), map_balance)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        drop(stmt);
        drop(conn);
        Ok(paginate(records, limit, |last| {
            Cursor::History {
                ledger_sequence: last.last_modified_ledger,
            }
            .encode()
        }))
    }

    /// Paginates the per-account current view. The cursor embeds the sort
    /// parameters it was minted under; replaying it with different ones is
    /// rejected.
    pub fn list(
        &self,
        filter: &BalanceFilter,
        sort_by: SortBy,
        sort_order: SortOrder,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page<AccountBalance>, ReaderError> {
        let resume = Cursor::decode_list(cursor, sort_by, sort_order)?;
        let mut predicates = String::from("WHERE 1 = 1");
        let mut params: Vec<Value> = Vec::new();
        if let Some(min_balance) = filter.min_balance {
            predicates.push_str(" AND balance >= ?");
            params.push(Value::BigInt(min_balance));
        }
        if let Some(max_balance) = filter.max_balance {
            predicates.push_str(" AND balance <= ?");
            params.push(Value::BigInt(max_balance));
        }
        if let Some(since) = filter.modified_since_ledger {
            predicates.push_str(" AND ledger_sequence >= ?");
            params.push(Value::UInt(since));
        }
        let comparator = match sort_order {
            SortOrder::Asc => ">",
            SortOrder::Desc => "<",
        };
        if let Some((sort_value, account_id)) = resume {
            match sort_by {
                SortBy::Balance => {
                    let value: i64 =
                        sort_value.parse().map_err(|_| CursorError::InvalidCursor)?;
                    predicates
                        .push_str(&format!(" AND (balance, account_id) {comparator} (?, ?)"));
                    params.push(Value::BigInt(value));
                    params.push(Value::Text(account_id));
                }
                SortBy::LastModifiedLedger => {
                    let value: u32 =
                        sort_value.parse().map_err(|_| CursorError::InvalidCursor)?;
                    predicates.push_str(&format!(
                        " AND (ledger_sequence, account_id) {comparator} (?, ?)"
                    ));
                    params.push(Value::UInt(value));
                    params.push(Value::Text(account_id));
                }
                SortBy::AccountId => {
                    predicates.push_str(&format!(" AND account_id {comparator} ?"));
                    params.push(Value::Text(account_id));
                }
            }
        }
        let direction = match sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let order_by = match sort_by {
            SortBy::Balance => format!("balance {direction}, account_id {direction}"),
            SortBy::LastModifiedLedger => {
                format!("ledger_sequence {direction}, account_id {direction}")
            }
            SortBy::AccountId => format!("account_id {direction}"),
        };
        let sql = format!(
            "WITH unified AS ({}), \
             current AS ( \
               SELECT DISTINCT ON (account_id) * FROM unified \
               ORDER BY account_id, ledger_sequence DESC, source ASC \
             ) \
             SELECT {BALANCE_COLUMNS} FROM current \
             {predicates} \
             ORDER BY {order_by} \
             LIMIT {}",
            self.balances_union(),
            limit + 1
        );
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(duckdb::params_from_iter(params), map_balance)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        drop(stmt);
        drop(conn);
        Ok(paginate(records, limit, |last| {
            let sort_value = match sort_by {
                SortBy::Balance => last.balance.to_string(),
                SortBy::LastModifiedLedger => last.last_modified_ledger.to_string(),
                SortBy::AccountId => last.account_id.clone(),
            };
            Cursor::List {
                sort_value,
                account_id: last.account_id.clone(),
                sort_by,
                sort_order,
            }
            .encode()
        }))
    }

    /// Merged operations in `(ledger_sequence DESC, operation_index DESC)`
    /// order. The cursor is the last returned `(ledger_sequence,
    /// operation_index)` pair.
    pub fn get_operations(
        &self,
        filter: &OperationFilter,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page<OperationRecord>, ReaderError> {
        let resume = Cursor::decode_operations(cursor)?;
        let mut predicates = String::from("WHERE 1 = 1");
        let mut params: Vec<Value> = Vec::new();
        if let Some(account) = &filter.account {
            predicates.push_str(" AND source_account = ?");
            params.push(Value::Text(account.clone()));
        }
        if let Some(hash) = &filter.transaction_hash {
            predicates.push_str(" AND transaction_hash = ?");
            params.push(Value::Text(hash.clone()));
        }
        if let Some(start) = filter.ledger_start {
            predicates.push_str(" AND ledger_sequence >= ?");
            params.push(Value::UInt(start));
        }
        if let Some(end) = filter.ledger_end {
            predicates.push_str(" AND ledger_sequence <= ?");
            params.push(Value::UInt(end));
        }
        let mut categories: Vec<&str> = Vec::new();
        if filter.payments_only {
            categories.extend(OperationFilter::PAYMENT_TYPES);
        }
        if filter.soroban_only {
            categories.extend(OperationFilter::SOROBAN_TYPES);
        }
        if !categories.is_empty() {
            let quoted: Vec<String> = categories
                .iter()
                .map(|category| format!("'{category}'"))
                .collect();
            predicates.push_str(&format!(" AND operation_type IN ({})", quoted.join(", ")));
        }
        if let Some((sequence, index)) = resume {
            predicates.push_str(" AND (ledger_sequence, operation_index) < (?, ?)");
            params.push(Value::UInt(sequence));
            params.push(Value::UInt(index));
        }
        let sql = format!(
            "SELECT * FROM ( \
               SELECT DISTINCT ON (ledger_sequence, transaction_hash, operation_index) \
                 {OPERATION_COLUMNS} FROM ({}) \
               {predicates} \
               ORDER BY ledger_sequence, transaction_hash, operation_index, source ASC \
             ) \
             ORDER BY ledger_sequence DESC, operation_index DESC \
             LIMIT {}",
            self.operations_union(),
            limit + 1
        );
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(duckdb::params_from_iter(params), map_operation)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        drop(stmt);
        drop(conn);
        Ok(paginate(records, limit, |last| {
            Cursor::Operations {
                ledger_sequence: last.ledger_sequence,
                operation_index: last.operation_index,
            }
            .encode()
        }))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("reader connection lock is poisoned")
    }
}

/// Request `limit + 1` rows; if all arrive there are more pages, so trim to
/// `limit` and mint the next cursor from the last returned row.
fn paginate<T>(mut records: Vec<T>, limit: usize, mint: impl Fn(&T) -> String) -> Page<T> {
    let has_more = records.len() > limit;
    if has_more {
        records.truncate(limit);
    }
    let next_cursor = if has_more {
        records.last().map(&mint)
    } else {
        None
    };
    Page {
        records,
        next_cursor,
    }
}

fn attach(
    conn: &Connection,
    store: &'static str,
    uri: &str,
    alias: &str,
) -> Result<(), ReaderError> {
    conn.execute_batch(&format!(
        "ATTACH IF NOT EXISTS '{}' AS {alias}",
        uri.replace('\'', "''")
    ))
    .map_err(|err| ReaderError::Attach {
        store,
        uri: uri.to_string(),
        message: err.to_string(),
    })
}

fn map_balance(row: &duckdb::Row<'_>) -> duckdb::Result<AccountBalance> {
    Ok(AccountBalance {
        account_id: row.get(0)?,
        last_modified_ledger: row.get(1)?,
        balance: row.get(2)?,
        buying_liabilities: row.get(3)?,
        selling_liabilities: row.get(4)?,
        num_subentries: row.get(5)?,
        num_sponsored: row.get(6)?,
        num_sponsoring: row.get(7)?,
        sequence_number: row.get(8)?,
        flags: row.get(9)?,
    })
}

fn map_operation(row: &duckdb::Row<'_>) -> duckdb::Result<OperationRecord> {
    Ok(OperationRecord {
        ledger_sequence: row.get(0)?,
        transaction_hash: row.get(1)?,
        operation_index: row.get(2)?,
        operation_type: row.get(3)?,
        transaction_successful: row.get(4)?,
        source_account: row.get(5)?,
        destination: row.get(6)?,
        asset_type: row.get(7)?,
        asset_code: row.get(8)?,
        asset_issuer: row.get(9)?,
        amount: row.get(10)?,
    })
}
