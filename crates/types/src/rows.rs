use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Width of one cold-store partition, in ledgers.
pub const PARTITION_SPAN: u32 = 10_000;

/// Partition key for a ledger sequence: the sequence rounded down to the
/// nearest partition boundary.
pub fn partition_for(sequence: u32) -> i64 {
    (i64::from(sequence) / i64::from(PARTITION_SPAN)) * i64::from(PARTITION_SPAN)
}

/// One row per closed ledger.
///
/// `sequence` is dense, monotonic and unique; `ledger_range` is always
/// `partition_for(sequence)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub sequence: u32,
    pub ledger_hash: String,
    pub previous_ledger_hash: String,
    pub closed_at: DateTime<Utc>,
    pub protocol_version: u32,
    pub total_coins: i64,
    pub fee_pool: i64,
    pub inflation_seq: u32,
    pub id_pool: u64,
    pub base_fee: u32,
    pub base_reserve: u32,
    pub max_tx_set_size: u32,
    pub tx_set_hash: String,
    pub transaction_count: u32,
    pub successful_tx_count: u32,
    pub failed_tx_count: u32,
    /// Operations inside successful transactions only.
    pub operation_count: u32,
    /// Operations across the whole transaction set, failed transactions included.
    pub tx_set_operation_count: u32,
    pub soroban_fee_write_1kb: Option<i64>,
    pub total_byte_size_of_live_state: Option<u64>,
    pub evicted_key_count: Option<u32>,
    pub scp_signature_node: Option<String>,
    pub scp_signature: Option<String>,
    pub ledger_range: i64,
}

/// One row per transaction in a ledger, keyed by `(ledger_sequence, transaction_hash)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub ledger_sequence: u32,
    pub transaction_hash: String,
    /// 1-based position of the transaction within the ledger's transaction set.
    pub application_order: u32,
    pub source_account: String,
    pub source_account_muxed: Option<String>,
    pub source_account_muxed_id: Option<u64>,
    pub seq_num: i64,
    pub envelope_type: String,
    pub max_fee: i64,
    pub fee_charged: i64,
    pub successful: bool,
    pub result_code: String,
    pub inner_result_code: Option<String>,
    pub operation_count: u32,
    pub signature_count: u32,
    pub memo_type: String,
    pub memo: Option<String>,
    pub time_bounds_lower: Option<u64>,
    pub time_bounds_upper: Option<u64>,
    pub ledger_bounds_min: Option<u32>,
    pub ledger_bounds_max: Option<u32>,
    pub min_account_sequence: Option<i64>,
    pub min_account_sequence_age: Option<u64>,
    pub min_account_sequence_ledger_gap: Option<u32>,
    pub extra_signers: Option<String>,
    pub fee_bump: bool,
    pub fee_account: Option<String>,
    pub fee_account_muxed: Option<String>,
    pub fee_account_muxed_id: Option<u64>,
    pub inner_transaction_hash: Option<String>,
    pub inner_signature_count: Option<u32>,
    pub new_max_fee: Option<i64>,
    pub soroban_resource_fee: Option<i64>,
    pub soroban_instructions: Option<u32>,
    pub soroban_disk_read_bytes: Option<u32>,
    pub soroban_write_bytes: Option<u32>,
    pub tx_envelope: String,
    pub tx_result: Option<String>,
    pub closed_at: DateTime<Utc>,
    pub ledger_range: i64,
}

/// One row per operation, keyed by `(ledger_sequence, transaction_hash, operation_index)`.
///
/// The row is wide-nullable: exactly the columns relevant to `operation_type`
/// are populated, everything else stays `None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationRow {
    pub ledger_sequence: u32,
    pub transaction_hash: String,
    /// 0-based position of the operation within its transaction.
    pub operation_index: u32,
    pub operation_type: String,
    pub transaction_successful: bool,
    pub source_account: Option<String>,
    pub source_account_muxed: Option<String>,
    pub destination: Option<String>,
    pub asset_type: Option<String>,
    pub asset_code: Option<String>,
    pub asset_issuer: Option<String>,
    pub amount: Option<i64>,
    pub starting_balance: Option<i64>,
    pub send_asset_type: Option<String>,
    pub send_asset_code: Option<String>,
    pub send_asset_issuer: Option<String>,
    pub send_max: Option<i64>,
    pub send_amount: Option<i64>,
    pub dest_asset_type: Option<String>,
    pub dest_asset_code: Option<String>,
    pub dest_asset_issuer: Option<String>,
    pub dest_min: Option<i64>,
    pub path_length: Option<u32>,
    pub offer_id: Option<i64>,
    pub selling_asset_type: Option<String>,
    pub selling_asset_code: Option<String>,
    pub selling_asset_issuer: Option<String>,
    pub buying_asset_type: Option<String>,
    pub buying_asset_code: Option<String>,
    pub buying_asset_issuer: Option<String>,
    pub price_n: Option<i32>,
    pub price_d: Option<i32>,
    pub price: Option<f64>,
    pub trustor: Option<String>,
    pub trustline_limit: Option<i64>,
    pub set_flags: Option<u32>,
    pub clear_flags: Option<u32>,
    pub inflation_dest: Option<String>,
    pub master_weight: Option<u32>,
    pub low_threshold: Option<u32>,
    pub med_threshold: Option<u32>,
    pub high_threshold: Option<u32>,
    pub home_domain: Option<String>,
    pub signer_key: Option<String>,
    pub signer_weight: Option<u32>,
    pub data_name: Option<String>,
    pub data_value: Option<String>,
    pub bump_to: Option<i64>,
    pub balance_id: Option<String>,
    pub claimant_count: Option<u32>,
    pub sponsored_id: Option<String>,
    pub from_account: Option<String>,
    pub host_function_type: Option<String>,
    pub auth_entry_count: Option<u32>,
    pub extend_to: Option<u32>,
    pub liquidity_pool_id: Option<String>,
    pub closed_at: DateTime<Utc>,
    pub ledger_range: i64,
}

impl Default for OperationRow {
    fn default() -> Self {
        Self {
            ledger_sequence: 0,
            transaction_hash: String::new(),
            operation_index: 0,
            operation_type: String::new(),
            transaction_successful: false,
            source_account: None,
            source_account_muxed: None,
            destination: None,
            asset_type: None,
            asset_code: None,
            asset_issuer: None,
            amount: None,
            starting_balance: None,
            send_asset_type: None,
            send_asset_code: None,
            send_asset_issuer: None,
            send_max: None,
            send_amount: None,
            dest_asset_type: None,
            dest_asset_code: None,
            dest_asset_issuer: None,
            dest_min: None,
            path_length: None,
            offer_id: None,
            selling_asset_type: None,
            selling_asset_code: None,
            selling_asset_issuer: None,
            buying_asset_type: None,
            buying_asset_code: None,
            buying_asset_issuer: None,
            price_n: None,
            price_d: None,
            price: None,
            trustor: None,
            trustline_limit: None,
            set_flags: None,
            clear_flags: None,
            inflation_dest: None,
            master_weight: None,
            low_threshold: None,
            med_threshold: None,
            high_threshold: None,
            home_domain: None,
            signer_key: None,
            signer_weight: None,
            data_name: None,
            data_value: None,
            bump_to: None,
            balance_id: None,
            claimant_count: None,
            sponsored_id: None,
            from_account: None,
            host_function_type: None,
            auth_entry_count: None,
            extend_to: None,
            liquidity_pool_id: None,
            closed_at: DateTime::UNIX_EPOCH,
            ledger_range: 0,
        }
    }
}

/// Point-in-time native balance of one account, keyed by `(account_id, ledger_sequence)`.
///
/// Within one envelope the extractor keeps only the last write per account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BalanceRow {
    pub account_id: String,
    pub ledger_sequence: u32,
    pub balance: i64,
    pub buying_liabilities: i64,
    pub selling_liabilities: i64,
    pub num_subentries: u32,
    pub num_sponsored: u32,
    pub num_sponsoring: u32,
    pub sequence_number: i64,
    pub flags: u32,
    pub ledger_range: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, 0; "genesis")]
    #[test_case(9_999, 0; "just below first boundary")]
    #[test_case(10_000, 10_000; "exactly on boundary")]
    #[test_case(56_789_123, 56_780_000; "mainnet scale")]
    #[test_case(u32::MAX, 4_294_960_000; "max sequence")]
    fn partition_rounds_down(sequence: u32, expected: i64) {
        assert_eq!(partition_for(sequence), expected);
    }
}
