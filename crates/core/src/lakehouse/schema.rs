//! Fixed schemas for the persisted row tables and the metadata plane.
//!
//! Column order here is the binding order for multi-row INSERTs: the
//! `*_values` functions must stay in lockstep with the `columns` lists.

use chrono::{DateTime, Utc};
use duckdb::types::{TimeUnit, Value};
use std::time::Duration;

use lumenlake_config::constants::{
    BALANCES_INSERT_DEADLINE, LEDGERS_INSERT_DEADLINE, OPERATIONS_INSERT_DEADLINE,
    TRANSACTIONS_INSERT_DEADLINE,
};
use lumenlake_types::{BalanceRow, LedgerRow, OperationRow, TransactionRow};

/// The four row tables fed by the ingester. Table names carry a versioned
/// suffix; schema evolution happens by appending a new versioned table, never
/// by dropping one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    Ledgers,
    Transactions,
    Operations,
    Balances,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Ledgers,
        Table::Transactions,
        Table::Operations,
        Table::Balances,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Ledgers => "ledgers_row_v2",
            Table::Transactions => "transactions_row_v2",
            Table::Operations => "operations_row_v2",
            Table::Balances => "native_balances_snapshot_v1",
        }
    }

    pub fn insert_deadline(&self) -> Duration {
        match self {
            Table::Ledgers => LEDGERS_INSERT_DEADLINE,
            Table::Transactions => TRANSACTIONS_INSERT_DEADLINE,
            Table::Operations => OPERATIONS_INSERT_DEADLINE,
            Table::Balances => BALANCES_INSERT_DEADLINE,
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Ledgers => LEDGER_COLUMNS,
            Table::Transactions => TRANSACTION_COLUMNS,
            Table::Operations => OPERATION_COLUMNS,
            Table::Balances => BALANCE_COLUMNS,
        }
    }

    pub fn create_sql(&self, qualified: &str) -> String {
        let body = match self {
            Table::Ledgers => LEDGER_DDL,
            Table::Transactions => TRANSACTION_DDL,
            Table::Operations => OPERATION_DDL,
            Table::Balances => BALANCE_DDL,
        };
        format!("CREATE TABLE IF NOT EXISTS {qualified} ({body})")
    }
}

const LEDGER_COLUMNS: &[&str] = &[
    "sequence",
    "ledger_hash",
    "previous_ledger_hash",
    "closed_at",
    "protocol_version",
    "total_coins",
    "fee_pool",
    "inflation_seq",
    "id_pool",
    "base_fee",
    "base_reserve",
    "max_tx_set_size",
    "tx_set_hash",
    "transaction_count",
    "successful_tx_count",
    "failed_tx_count",
    "operation_count",
    "tx_set_operation_count",
    "soroban_fee_write_1kb",
    "total_byte_size_of_live_state",
    "evicted_key_count",
    "scp_signature_node",
    "scp_signature",
    "ledger_range",
];

const LEDGER_DDL: &str = "\
    sequence UINTEGER NOT NULL, \
    ledger_hash VARCHAR NOT NULL, \
    previous_ledger_hash VARCHAR NOT NULL, \
    closed_at TIMESTAMP NOT NULL, \
    protocol_version UINTEGER NOT NULL, \
    total_coins BIGINT NOT NULL, \
    fee_pool BIGINT NOT NULL, \
    inflation_seq UINTEGER NOT NULL, \
    id_pool UBIGINT NOT NULL, \
    base_fee UINTEGER NOT NULL, \
    base_reserve UINTEGER NOT NULL, \
    max_tx_set_size UINTEGER NOT NULL, \
    tx_set_hash VARCHAR NOT NULL, \
    transaction_count UINTEGER NOT NULL, \
    successful_tx_count UINTEGER NOT NULL, \
    failed_tx_count UINTEGER NOT NULL, \
    operation_count UINTEGER NOT NULL, \
    tx_set_operation_count UINTEGER NOT NULL, \
    soroban_fee_write_1kb BIGINT, \
    total_byte_size_of_live_state UBIGINT, \
    evicted_key_count UINTEGER, \
    scp_signature_node VARCHAR, \
    scp_signature VARCHAR, \
    ledger_range BIGINT NOT NULL";

const TRANSACTION_COLUMNS: &[&str] = &[
    "ledger_sequence",
    "transaction_hash",
    "application_order",
    "source_account",
    "source_account_muxed",
    "source_account_muxed_id",
    "seq_num",
    "envelope_type",
    "max_fee",
    "fee_charged",
    "successful",
    "result_code",
    "inner_result_code",
    "operation_count",
    "signature_count",
    "memo_type",
    "memo",
    "time_bounds_lower",
    "time_bounds_upper",
    "ledger_bounds_min",
    "ledger_bounds_max",
    "min_account_sequence",
    "min_account_sequence_age",
    "min_account_sequence_ledger_gap",
    "extra_signers",
    "fee_bump",
    "fee_account",
    "fee_account_muxed",
    "fee_account_muxed_id",
    "inner_transaction_hash",
    "inner_signature_count",
    "new_max_fee",
    "soroban_resource_fee",
    "soroban_instructions",
    "soroban_disk_read_bytes",
    "soroban_write_bytes",
    "tx_envelope",
    "tx_result",
    "closed_at",
    "ledger_range",
];

const TRANSACTION_DDL: &str = "\
    ledger_sequence UINTEGER NOT NULL, \
    transaction_hash VARCHAR NOT NULL, \
    application_order UINTEGER NOT NULL, \
    source_account VARCHAR NOT NULL, \
    source_account_muxed VARCHAR, \
    source_account_muxed_id UBIGINT, \
    seq_num BIGINT NOT NULL, \
    envelope_type VARCHAR NOT NULL, \
    max_fee BIGINT NOT NULL, \
    fee_charged BIGINT NOT NULL, \
    successful BOOLEAN NOT NULL, \
    result_code VARCHAR NOT NULL, \
    inner_result_code VARCHAR, \
    operation_count UINTEGER NOT NULL, \
    signature_count UINTEGER NOT NULL, \
    memo_type VARCHAR NOT NULL, \
    memo VARCHAR, \
    time_bounds_lower UBIGINT, \
    time_bounds_upper UBIGINT, \
    ledger_bounds_min UINTEGER, \
    ledger_bounds_max UINTEGER, \
    min_account_sequence BIGINT, \
    min_account_sequence_age UBIGINT, \
    min_account_sequence_ledger_gap UINTEGER, \
    extra_signers VARCHAR, \
    fee_bump BOOLEAN NOT NULL, \
    fee_account VARCHAR, \
    fee_account_muxed VARCHAR, \
    fee_account_muxed_id UBIGINT, \
    inner_transaction_hash VARCHAR, \
    inner_signature_count UINTEGER, \
    new_max_fee BIGINT, \
    soroban_resource_fee BIGINT, \
    soroban_instructions UINTEGER, \
    soroban_disk_read_bytes UINTEGER, \
    soroban_write_bytes UINTEGER, \
    tx_envelope VARCHAR NOT NULL, \
    tx_result VARCHAR, \
    closed_at TIMESTAMP NOT NULL, \
    ledger_range BIGINT NOT NULL";

const OPERATION_COLUMNS: &[&str] = &[
    "ledger_sequence",
    "transaction_hash",
    "operation_index",
    "operation_type",
    "transaction_successful",
    "source_account",
    "source_account_muxed",
    "destination",
    "asset_type",
    "asset_code",
    "asset_issuer",
    "amount",
    "starting_balance",
    "send_asset_type",
    "send_asset_code",
    "send_asset_issuer",
    "send_max",
    "send_amount",
    "dest_asset_type",
    "dest_asset_code",
    "dest_asset_issuer",
    "dest_min",
    "path_length",
    "offer_id",
    "selling_asset_type",
    "selling_asset_code",
    "selling_asset_issuer",
    "buying_asset_type",
    "buying_asset_code",
    "buying_asset_issuer",
    "price_n",
    "price_d",
    "price",
    "trustor",
    "trustline_limit",
    "set_flags",
    "clear_flags",
    "inflation_dest",
    "master_weight",
    "low_threshold",
    "med_threshold",
    "high_threshold",
    "home_domain",
    "signer_key",
    "signer_weight",
    "data_name",
    "data_value",
    "bump_to",
    "balance_id",
    "claimant_count",
    "sponsored_id",
    "from_account",
    "host_function_type",
    "auth_entry_count",
    "extend_to",
    "liquidity_pool_id",
    "closed_at",
    "ledger_range",
];

const OPERATION_DDL: &str = "\
    ledger_sequence UINTEGER NOT NULL, \
    transaction_hash VARCHAR NOT NULL, \
    operation_index UINTEGER NOT NULL, \
    operation_type VARCHAR NOT NULL, \
    transaction_successful BOOLEAN NOT NULL, \
    source_account VARCHAR, \
    source_account_muxed VARCHAR, \
    destination VARCHAR, \
    asset_type VARCHAR, \
    asset_code VARCHAR, \
    asset_issuer VARCHAR, \
    amount BIGINT, \
    starting_balance BIGINT, \
    send_asset_type VARCHAR, \
    send_asset_code VARCHAR, \
    send_asset_issuer VARCHAR, \
    send_max BIGINT, \
    send_amount BIGINT, \
    dest_asset_type VARCHAR, \
    dest_asset_code VARCHAR, \
    dest_asset_issuer VARCHAR, \
    dest_min BIGINT, \
    path_length UINTEGER, \
    offer_id BIGINT, \
    selling_asset_type VARCHAR, \
    selling_asset_code VARCHAR, \
    selling_asset_issuer VARCHAR, \
    buying_asset_type VARCHAR, \
    buying_asset_code VARCHAR, \
    buying_asset_issuer VARCHAR, \
    price_n INTEGER, \
    price_d INTEGER, \
    price DOUBLE, \
    trustor VARCHAR, \
    trustline_limit BIGINT, \
    set_flags UINTEGER, \
    clear_flags UINTEGER, \
    inflation_dest VARCHAR, \
    master_weight UINTEGER, \
    low_threshold UINTEGER, \
    med_threshold UINTEGER, \
    high_threshold UINTEGER, \
    home_domain VARCHAR, \
    signer_key VARCHAR, \
    signer_weight UINTEGER, \
    data_name VARCHAR, \
    data_value VARCHAR, \
    bump_to BIGINT, \
    balance_id VARCHAR, \
    claimant_count UINTEGER, \
    sponsored_id VARCHAR, \
    from_account VARCHAR, \
    host_function_type VARCHAR, \
    auth_entry_count UINTEGER, \
    extend_to UINTEGER, \
    liquidity_pool_id VARCHAR, \
    closed_at TIMESTAMP NOT NULL, \
    ledger_range BIGINT NOT NULL";

const BALANCE_COLUMNS: &[&str] = &[
    "account_id",
    "ledger_sequence",
    "balance",
    "buying_liabilities",
    "selling_liabilities",
    "num_subentries",
    "num_sponsored",
    "num_sponsoring",
    "sequence_number",
    "flags",
    "ledger_range",
];

const BALANCE_DDL: &str = "\
    account_id VARCHAR NOT NULL, \
    ledger_sequence UINTEGER NOT NULL, \
    balance BIGINT NOT NULL, \
    buying_liabilities BIGINT NOT NULL, \
    selling_liabilities BIGINT NOT NULL, \
    num_subentries UINTEGER NOT NULL, \
    num_sponsored UINTEGER NOT NULL, \
    num_sponsoring UINTEGER NOT NULL, \
    sequence_number BIGINT NOT NULL, \
    flags UINTEGER NOT NULL, \
    ledger_range BIGINT NOT NULL";

pub const DATASETS_TABLE: &str = "_meta_datasets";
pub const LINEAGE_TABLE: &str = "_meta_lineage";
pub const QUALITY_TABLE: &str = "_meta_quality";
pub const CHANGES_TABLE: &str = "_meta_changes";

pub const DATASETS_DDL: &str = "\
    dataset_name VARCHAR NOT NULL, \
    tier VARCHAR NOT NULL, \
    domain VARCHAR NOT NULL, \
    major_version UINTEGER NOT NULL, \
    current_minor_version UINTEGER NOT NULL, \
    grain VARCHAR NOT NULL, \
    created_at TIMESTAMP NOT NULL, \
    updated_at TIMESTAMP NOT NULL";

pub const LINEAGE_DDL: &str = "\
    id BIGINT NOT NULL, \
    dataset_name VARCHAR NOT NULL, \
    source_ledger_start UINTEGER NOT NULL, \
    source_ledger_end UINTEGER NOT NULL, \
    pipeline_version VARCHAR NOT NULL, \
    processor_name VARCHAR NOT NULL, \
    row_count UBIGINT NOT NULL, \
    worker_id UINTEGER NOT NULL, \
    flush_trigger VARCHAR NOT NULL, \
    created_at TIMESTAMP NOT NULL";

pub const QUALITY_DDL: &str = "\
    id BIGINT NOT NULL, \
    dataset_name VARCHAR NOT NULL, \
    check_name VARCHAR NOT NULL, \
    passed BOOLEAN NOT NULL, \
    detail VARCHAR NOT NULL, \
    ledger_start UINTEGER NOT NULL, \
    ledger_end UINTEGER NOT NULL, \
    created_at TIMESTAMP NOT NULL";

pub const CHANGES_DDL: &str = "\
    id BIGINT NOT NULL, \
    dataset_name VARCHAR NOT NULL, \
    from_minor_version UINTEGER NOT NULL, \
    to_minor_version UINTEGER NOT NULL, \
    description VARCHAR NOT NULL, \
    created_at TIMESTAMP NOT NULL";

pub fn timestamp_value(at: &DateTime<Utc>) -> Value {
    Value::Timestamp(TimeUnit::Microsecond, at.timestamp_micros())
}

fn opt_text(value: &Option<String>) -> Value {
    match value {
        Some(text) => Value::Text(text.clone()),
        None => Value::Null,
    }
}

fn opt_bigint(value: Option<i64>) -> Value {
    value.map(Value::BigInt).unwrap_or(Value::Null)
}

fn opt_int(value: Option<i32>) -> Value {
    value.map(Value::Int).unwrap_or(Value::Null)
}

fn opt_uint(value: Option<u32>) -> Value {
    value.map(Value::UInt).unwrap_or(Value::Null)
}

fn opt_ubigint(value: Option<u64>) -> Value {
    value.map(Value::UBigInt).unwrap_or(Value::Null)
}

fn opt_double(value: Option<f64>) -> Value {
    value.map(Value::Double).unwrap_or(Value::Null)
}

pub fn ledger_values(row: &LedgerRow) -> Vec<Value> {
    vec![
        Value::UInt(row.sequence),
        Value::Text(row.ledger_hash.clone()),
        Value::Text(row.previous_ledger_hash.clone()),
        timestamp_value(&row.closed_at),
        Value::UInt(row.protocol_version),
        Value::BigInt(row.total_coins),
        Value::BigInt(row.fee_pool),
        Value::UInt(row.inflation_seq),
        Value::UBigInt(row.id_pool),
        Value::UInt(row.base_fee),
        Value::UInt(row.base_reserve),
        Value::UInt(row.max_tx_set_size),
        Value::Text(row.tx_set_hash.clone()),
        Value::UInt(row.transaction_count),
        Value::UInt(row.successful_tx_count),
        Value::UInt(row.failed_tx_count),
        Value::UInt(row.operation_count),
        Value::UInt(row.tx_set_operation_count),
        opt_bigint(row.soroban_fee_write_1kb),
        opt_ubigint(row.total_byte_size_of_live_state),
        opt_uint(row.evicted_key_count),
        opt_text(&row.scp_signature_node),
        opt_text(&row.scp_signature),
        Value::BigInt(row.ledger_range),
    ]
}

pub fn transaction_values(row: &TransactionRow) -> Vec<Value> {
    vec![
        Value::UInt(row.ledger_sequence),
        Value::Text(row.transaction_hash.clone()),
        Value::UInt(row.application_order),
        Value::Text(row.source_account.clone()),
        opt_text(&row.source_account_muxed),
        opt_ubigint(row.source_account_muxed_id),
        Value::BigInt(row.seq_num),
        Value::Text(row.envelope_type.clone()),
        Value::BigInt(row.max_fee),
        Value::BigInt(row.fee_charged),
        Value::Boolean(row.successful),
        Value::Text(row.result_code.clone()),
        opt_text(&row.inner_result_code),
        Value::UInt(row.operation_count),
        Value::UInt(row.signature_count),
        Value::Text(row.memo_type.clone()),
        opt_text(&row.memo),
        opt_ubigint(row.time_bounds_lower),
        opt_ubigint(row.time_bounds_upper),
        opt_uint(row.ledger_bounds_min),
        opt_uint(row.ledger_bounds_max),
        opt_bigint(row.min_account_sequence),
        opt_ubigint(row.min_account_sequence_age),
        opt_uint(row.min_account_sequence_ledger_gap),
        opt_text(&row.extra_signers),
        Value::Boolean(row.fee_bump),
        opt_text(&row.fee_account),
        opt_text(&row.fee_account_muxed),
        opt_ubigint(row.fee_account_muxed_id),
        opt_text(&row.inner_transaction_hash),
        opt_uint(row.inner_signature_count),
        opt_bigint(row.new_max_fee),
        opt_bigint(row.soroban_resource_fee),
        opt_uint(row.soroban_instructions),
        opt_uint(row.soroban_disk_read_bytes),
        opt_uint(row.soroban_write_bytes),
        Value::Text(row.tx_envelope.clone()),
        opt_text(&row.tx_result),
        timestamp_value(&row.closed_at),
        Value::BigInt(row.ledger_range),
    ]
}

pub fn operation_values(row: &OperationRow) -> Vec<Value> {
    vec![
        Value::UInt(row.ledger_sequence),
        Value::Text(row.transaction_hash.clone()),
        Value::UInt(row.operation_index),
        Value::Text(row.operation_type.clone()),
        Value::Boolean(row.transaction_successful),
        opt_text(&row.source_account),
        opt_text(&row.source_account_muxed),
        opt_text(&row.destination),
        opt_text(&row.asset_type),
        opt_text(&row.asset_code),
        opt_text(&row.asset_issuer),
        opt_bigint(row.amount),
        opt_bigint(row.starting_balance),
        opt_text(&row.send_asset_type),
        opt_text(&row.send_asset_code),
        opt_text(&row.send_asset_issuer),
        opt_bigint(row.send_max),
        opt_bigint(row.send_amount),
        opt_text(&row.dest_asset_type),
        opt_text(&row.dest_asset_code),
        opt_text(&row.dest_asset_issuer),
        opt_bigint(row.dest_min),
        opt_uint(row.path_length),
        opt_bigint(row.offer_id),
        opt_text(&row.selling_asset_type),
        opt_text(&row.selling_asset_code),
        opt_text(&row.selling_asset_issuer),
        opt_text(&row.buying_asset_type),
        opt_text(&row.buying_asset_code),
        opt_text(&row.buying_asset_issuer),
        opt_int(row.price_n),
        opt_int(row.price_d),
        opt_double(row.price),
        opt_text(&row.trustor),
        opt_bigint(row.trustline_limit),
        opt_uint(row.set_flags),
        opt_uint(row.clear_flags),
        opt_text(&row.inflation_dest),
        opt_uint(row.master_weight),
        opt_uint(row.low_threshold),
        opt_uint(row.med_threshold),
        opt_uint(row.high_threshold),
        opt_text(&row.home_domain),
        opt_text(&row.signer_key),
        opt_uint(row.signer_weight),
        opt_text(&row.data_name),
        opt_text(&row.data_value),
        opt_bigint(row.bump_to),
        opt_text(&row.balance_id),
        opt_uint(row.claimant_count),
        opt_text(&row.sponsored_id),
        opt_text(&row.from_account),
        opt_text(&row.host_function_type),
        opt_uint(row.auth_entry_count),
        opt_uint(row.extend_to),
        opt_text(&row.liquidity_pool_id),
        timestamp_value(&row.closed_at),
        Value::BigInt(row.ledger_range),
    ]
}

pub fn balance_values(row: &BalanceRow) -> Vec<Value> {
    vec![
        Value::Text(row.account_id.clone()),
        Value::UInt(row.ledger_sequence),
        Value::BigInt(row.balance),
        Value::BigInt(row.buying_liabilities),
        Value::BigInt(row.selling_liabilities),
        Value::UInt(row.num_subentries),
        Value::UInt(row.num_sponsored),
        Value::UInt(row.num_sponsoring),
        Value::BigInt(row.sequence_number),
        Value::UInt(row.flags),
        Value::BigInt(row.ledger_range),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_order_matches_column_lists() {
        let ledger_columns = Table::Ledgers.columns();
        assert_eq!(ledger_columns.len(), 24);
        assert_eq!(Table::Transactions.columns().len(), 40);
        assert_eq!(Table::Operations.columns().len(), 58);
        assert_eq!(Table::Balances.columns().len(), 11);
    }

    #[test]
    fn ddl_column_counts_match_binding_lists() {
        for table in Table::ALL {
            let ddl = table.create_sql("t");
            let commas = ddl.matches(", ").count();
            assert_eq!(
                commas + 1,
                table.columns().len(),
                "DDL column count mismatch for {}",
                table.name()
            );
        }
    }
}
