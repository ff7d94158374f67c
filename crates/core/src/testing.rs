//! Fixture builders for unit tests: synthetic ledger envelopes with
//! hash-consistent transaction results and ledger-entry changes.

#![cfg(test)]

use stellar_xdr::curr::{
    AccountEntry, AccountEntryExt, AccountId, Asset, BytesM, CreateAccountOp, DataValue,
    DecoratedSignature, ExtensionPoint, FeeBumpTransaction, FeeBumpTransactionEnvelope,
    FeeBumpTransactionExt, FeeBumpTransactionInnerTx, GeneralizedTransactionSet, Hash,
    InnerTransactionResult, InnerTransactionResultExt, InnerTransactionResultPair,
    InnerTransactionResultResult, LedgerCloseMeta, LedgerCloseMetaExt, LedgerCloseMetaV1,
    LedgerEntry, LedgerEntryChange, LedgerEntryChanges, LedgerEntryData, LedgerEntryExt,
    LedgerHeader, LedgerHeaderExt, LedgerHeaderHistoryEntry, LedgerHeaderHistoryEntryExt,
    LedgerKey, LedgerKeyAccount, LedgerUpgrade, Limits, ManageDataOp, Memo, MuxedAccount,
    Operation, OperationBody, PaymentOp, Preconditions, PublicKey, SequenceNumber, SignatureHint,
    StellarValue, StellarValueExt, StringM, Thresholds, TimePoint, Transaction,
    TransactionEnvelope, TransactionExt, TransactionMeta, TransactionMetaV3, TransactionPhase,
    TransactionResult, TransactionResultExt, TransactionResultMeta, TransactionResultPair,
    TransactionResultResult, TransactionSetV1, TransactionV1Envelope, TxSetComponent,
    TxSetComponentTxsMaybeDiscountedFee, Uint256, UpgradeEntryMeta, VecM, WriteXdr,
};

use crate::ledger::{transaction_hash, Network};
use chrono::Utc;
use lumenlake_config::LakehouseConfig;
use lumenlake_types::{partition_for, LedgerRow};

pub const TEST_PASSPHRASE: &str = "Test SDF Network ; September 2015";

/// A lakehouse config pointing at a plain database file inside a fresh
/// temporary directory. Keep the `TempDir` alive for the duration of the test.
pub fn test_lakehouse() -> (tempfile::TempDir, LakehouseConfig) {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let catalog_path = dir.path().join("catalog.duckdb");
    let config = LakehouseConfig {
        catalog_path: catalog_path.display().to_string(),
        data_path: None,
        catalog_name: "lake".to_string(),
        schema_name: "ledger_data".to_string(),
        metadata_schema: "meta".to_string(),
        batch_size: 100,
        commit_interval_seconds: 30,
        insert_chunk_size: 200,
        num_workers: 1,
        credentials: None,
    };
    (dir, config)
}

pub fn sample_ledger_row(sequence: u32) -> LedgerRow {
    LedgerRow {
        sequence,
        ledger_hash: format!("{sequence:064x}"),
        previous_ledger_hash: format!("{:064x}", sequence.saturating_sub(1)),
        closed_at: Utc::now(),
        protocol_version: 23,
        total_coins: 1_000_000_000,
        fee_pool: 500,
        inflation_seq: 0,
        id_pool: 9,
        base_fee: 100,
        base_reserve: 5_000_000,
        max_tx_set_size: 100,
        tx_set_hash: "aa".repeat(32),
        transaction_count: 0,
        successful_tx_count: 0,
        failed_tx_count: 0,
        operation_count: 0,
        tx_set_operation_count: 0,
        soroban_fee_write_1kb: None,
        total_byte_size_of_live_state: Some(0),
        evicted_key_count: Some(0),
        scp_signature_node: None,
        scp_signature: None,
        ledger_range: partition_for(sequence),
    }
}
pub const PAYMENT_AMOUNT: i64 = 5_000_000;
pub const STARTING_BALANCE: i64 = 10_000_000;
pub const FEE_BUMP_FEE: i64 = 400;

pub fn sample_transaction_row(sequence: u32) -> lumenlake_types::TransactionRow {
    lumenlake_types::TransactionRow {
        ledger_sequence: sequence,
        transaction_hash: "ab".repeat(32),
        application_order: 1,
        source_account: account_address(1),
        source_account_muxed: None,
        source_account_muxed_id: None,
        seq_num: 10,
        envelope_type: "tx".to_string(),
        max_fee: 100,
        fee_charged: 100,
        successful: true,
        result_code: "TxSuccess".to_string(),
        inner_result_code: None,
        operation_count: 1,
        signature_count: 1,
        memo_type: "none".to_string(),
        memo: None,
        time_bounds_lower: None,
        time_bounds_upper: None,
        ledger_bounds_min: None,
        ledger_bounds_max: None,
        min_account_sequence: None,
        min_account_sequence_age: None,
        min_account_sequence_ledger_gap: None,
        extra_signers: None,
        fee_bump: false,
        fee_account: None,
        fee_account_muxed: None,
        fee_account_muxed_id: None,
        inner_transaction_hash: None,
        inner_signature_count: None,
        new_max_fee: None,
        soroban_resource_fee: None,
        soroban_instructions: None,
        soroban_disk_read_bytes: None,
        soroban_write_bytes: None,
        tx_envelope: "AAAA".to_string(),
        tx_result: None,
        closed_at: Utc::now(),
        ledger_range: partition_for(sequence),
    }
}

pub fn account_key(seed: u8) -> Uint256 {
    Uint256([seed; 32])
}

pub fn account_id(seed: u8) -> AccountId {
    AccountId(PublicKey::PublicKeyTypeEd25519(account_key(seed)))
}

pub fn account_address(seed: u8) -> String {
    stellar_strkey::ed25519::PublicKey([seed; 32]).to_string()
}

fn signature() -> DecoratedSignature {
    DecoratedSignature {
        hint: SignatureHint([0; 4]),
        signature: stellar_xdr::curr::Signature(BytesM::default()),
    }
}

fn payment_op(seed: u8) -> Operation {
    Operation {
        source_account: None,
        body: OperationBody::Payment(PaymentOp {
            destination: MuxedAccount::Ed25519(account_key(seed.wrapping_add(100))),
            asset: Asset::Native,
            amount: PAYMENT_AMOUNT,
        }),
    }
}

fn v1_tx(seed: u8, operations: Vec<Operation>) -> Transaction {
    Transaction {
        source_account: MuxedAccount::Ed25519(account_key(seed)),
        fee: 100,
        seq_num: SequenceNumber(i64::from(seed) * 10),
        cond: Preconditions::None,
        memo: Memo::Text("hello".try_into().unwrap()),
        operations: operations.try_into().unwrap(),
        ext: TransactionExt::V0,
    }
}

fn v1_envelope(tx: Transaction) -> TransactionEnvelope {
    TransactionEnvelope::Tx(TransactionV1Envelope {
        tx,
        signatures: vec![signature()].try_into().unwrap(),
    })
}

fn empty_apply_meta() -> TransactionMeta {
    TransactionMeta::V3(TransactionMetaV3 {
        ext: ExtensionPoint::V0,
        tx_changes_before: LedgerEntryChanges(VecM::default()),
        operations: VecM::default(),
        tx_changes_after: LedgerEntryChanges(VecM::default()),
        soroban_meta: None,
    })
}

/// Builds one synthetic v1 envelope. Transactions are paired with their
/// results by hash, the way the upstream producer does it.
pub struct LedgerBuilder {
    sequence: u32,
    close_time: u64,
    txs: Vec<(TransactionEnvelope, TransactionResultResult)>,
    changes: Vec<LedgerEntryChange>,
}

impl LedgerBuilder {
    pub fn new(sequence: u32) -> Self {
        Self {
            sequence,
            close_time: 1_700_000_000,
            txs: Vec::new(),
            changes: Vec::new(),
        }
    }

    pub fn close_time(mut self, close_time: u64) -> Self {
        self.close_time = close_time;
        self
    }

    pub fn with_payment_tx(mut self, seed: u8, successful: bool) -> Self {
        let envelope = v1_envelope(v1_tx(seed, vec![payment_op(seed)]));
        let result = if successful {
            TransactionResultResult::TxSuccess(VecM::default())
        } else {
            TransactionResultResult::TxFailed(VecM::default())
        };
        self.txs.push((envelope, result));
        self
    }

    /// One transaction with `count` operations cycling through
    /// create_account, payment and manage_data.
    pub fn with_multi_op_tx(mut self, count: usize) -> Self {
        let ops: Vec<Operation> = (0..count)
            .map(|i| match i % 3 {
                0 => Operation {
                    source_account: None,
                    body: OperationBody::CreateAccount(CreateAccountOp {
                        destination: account_id(200),
                        starting_balance: STARTING_BALANCE,
                    }),
                },
                1 => payment_op(33),
                _ => Operation {
                    source_account: None,
                    body: OperationBody::ManageData(ManageDataOp {
                        data_name: "config".try_into().unwrap(),
                        data_value: Some(DataValue(vec![1u8, 2, 3].try_into().unwrap())),
                    }),
                },
            })
            .collect();
        let envelope = v1_envelope(v1_tx(42, ops));
        self.txs
            .push((envelope, TransactionResultResult::TxSuccess(VecM::default())));
        self
    }

    pub fn with_fee_bump_tx(mut self, seed: u8) -> Self {
        let inner = TransactionV1Envelope {
            tx: v1_tx(seed, vec![payment_op(seed)]),
            signatures: vec![signature()].try_into().unwrap(),
        };
        let network = Network::new(TEST_PASSPHRASE);
        let inner_hash =
            transaction_hash(&TransactionEnvelope::Tx(inner.clone()), &network).unwrap();
        let envelope = TransactionEnvelope::TxFeeBump(FeeBumpTransactionEnvelope {
            tx: FeeBumpTransaction {
                fee_source: MuxedAccount::Ed25519(account_key(seed.wrapping_add(50))),
                fee: FEE_BUMP_FEE,
                inner_tx: FeeBumpTransactionInnerTx::Tx(inner),
                ext: FeeBumpTransactionExt::V0,
            },
            signatures: vec![signature()].try_into().unwrap(),
        });
        let result = TransactionResultResult::TxFeeBumpInnerSuccess(InnerTransactionResultPair {
            transaction_hash: Hash(inner_hash),
            result: InnerTransactionResult {
                fee_charged: 100,
                result: InnerTransactionResultResult::TxSuccess(VecM::default()),
                ext: InnerTransactionResultExt::V0,
            },
        });
        self.txs.push((envelope, result));
        self
    }

    /// Records a post-image write of an account entry.
    pub fn with_account_entry(mut self, seed: u8, balance: i64) -> Self {
        self.changes.push(LedgerEntryChange::Updated(LedgerEntry {
            last_modified_ledger_seq: self.sequence,
            data: LedgerEntryData::Account(AccountEntry {
                account_id: account_id(seed),
                balance,
                seq_num: SequenceNumber(1),
                num_sub_entries: 0,
                inflation_dest: None,
                flags: 0,
                home_domain: stellar_xdr::curr::String32(StringM::default()),
                thresholds: Thresholds([1, 0, 0, 0]),
                signers: VecM::default(),
                ext: AccountEntryExt::V0,
            }),
            ext: LedgerEntryExt::V0,
        }));
        self
    }

    pub fn with_removed_account(mut self, seed: u8) -> Self {
        self.changes
            .push(LedgerEntryChange::Removed(LedgerKey::Account(
                LedgerKeyAccount {
                    account_id: account_id(seed),
                },
            )));
        self
    }

    pub fn build(self) -> LedgerCloseMeta {
        let network = Network::new(TEST_PASSPHRASE);
        let mut envelopes = Vec::new();
        let mut tx_metas = Vec::new();
        for (envelope, result) in self.txs {
            let hash = transaction_hash(&envelope, &network).unwrap();
            tx_metas.push(TransactionResultMeta {
                result: TransactionResultPair {
                    transaction_hash: Hash(hash),
                    result: TransactionResult {
                        fee_charged: 100,
                        result,
                        ext: TransactionResultExt::V0,
                    },
                },
                fee_processing: LedgerEntryChanges(VecM::default()),
                tx_apply_processing: empty_apply_meta(),
            });
            envelopes.push(envelope);
        }

        let upgrades_processing: Vec<UpgradeEntryMeta> = if self.changes.is_empty() {
            Vec::new()
        } else {
            vec![UpgradeEntryMeta {
                upgrade: LedgerUpgrade::BaseFee(100),
                changes: LedgerEntryChanges(self.changes.try_into().unwrap()),
            }]
        };

        let header = LedgerHeader {
            ledger_version: 23,
            previous_ledger_hash: Hash([1; 32]),
            scp_value: StellarValue {
                tx_set_hash: Hash([2; 32]),
                close_time: TimePoint(self.close_time),
                upgrades: VecM::default(),
                ext: StellarValueExt::Basic,
            },
            tx_set_result_hash: Hash([0; 32]),
            bucket_list_hash: Hash([0; 32]),
            ledger_seq: self.sequence,
            total_coins: 1_000_000_000_000,
            fee_pool: 5_000,
            inflation_seq: 0,
            id_pool: 0,
            base_fee: 100,
            base_reserve: 5_000_000,
            max_tx_set_size: 100,
            skip_list: [Hash([0; 32]), Hash([0; 32]), Hash([0; 32]), Hash([0; 32])],
            ext: LedgerHeaderExt::V0,
        };

        LedgerCloseMeta::V1(LedgerCloseMetaV1 {
            ext: LedgerCloseMetaExt::V0,
            ledger_header: LedgerHeaderHistoryEntry {
                hash: Hash([3; 32]),
                header,
                ext: LedgerHeaderHistoryEntryExt::V0,
            },
            tx_set: GeneralizedTransactionSet::V1(TransactionSetV1 {
                previous_ledger_hash: Hash([1; 32]),
                phases: vec![TransactionPhase::V0(
                    vec![TxSetComponent::TxsetCompTxsMaybeDiscountedFee(
                        TxSetComponentTxsMaybeDiscountedFee {
                            base_fee: None,
                            txs: envelopes.try_into().unwrap(),
                        },
                    )]
                    .try_into()
                    .unwrap(),
                )]
                .try_into()
                .unwrap(),
            }),
            tx_processing: tx_metas.try_into().unwrap(),
            upgrades_processing: upgrades_processing.try_into().unwrap(),
            scp_info: VecM::default(),
            total_byte_size_of_live_soroban_state: 0,
            evicted_keys: VecM::default(),
            unused: VecM::default(),
        })
    }

    pub fn build_bytes(self) -> Vec<u8> {
        self.build().to_xdr(Limits::none()).unwrap()
    }
}
