//! Decoded view over one versioned ledger envelope.
//!
//! The wire format is a three-variant union (v0, v1, v2). The variants differ
//! in how transaction results, state sizes and evictions are surfaced; this
//! module flattens that variance into one uniform, nullable-accessor view so
//! the extractors never branch on the envelope version themselves.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use stellar_xdr::curr::{
    FeeBumpTransactionEnvelope, FeeBumpTransactionInnerTx, GeneralizedTransactionSet, Hash,
    LedgerCloseMeta, LedgerCloseMetaExt, LedgerEntryChange, LedgerEntryChanges, LedgerHeader,
    LedgerHeaderHistoryEntry, Limits, MuxedAccount, Operation, Preconditions, PublicKey, ReadXdr,
    StellarValueExt, Transaction, TransactionEnvelope, TransactionExt, TransactionMeta,
    TransactionPhase, TransactionResultPair, TransactionResultResult,
    TransactionSignaturePayload, TransactionSignaturePayloadTaggedTransaction, TransactionV0,
    TxSetComponent, UpgradeEntryMeta, WriteXdr,
};

pub use crate::error::EnvelopeError;

/// Identifies the network the envelopes were produced under. Transaction
/// hashes are domain-separated by this id, so decoding against the wrong
/// passphrase yields hashes that match nothing upstream.
#[derive(Clone, Debug)]
pub struct Network {
    id: [u8; 32],
}

impl Network {
    pub fn new(passphrase: &str) -> Self {
        let id = Sha256::digest(passphrase.as_bytes()).into();
        Self { id }
    }

    pub fn id(&self) -> &[u8; 32] {
        &self.id
    }
}

/// One transaction as seen inside an envelope: its wire envelope, its
/// network-scoped hash and (when the variant carries them) its apply results.
#[derive(Clone, Copy)]
pub struct TxView<'a> {
    /// 1-based position within the envelope's transaction set.
    pub application_order: u32,
    pub envelope: &'a TransactionEnvelope,
    pub hash: [u8; 32],
    pub processing: Option<ProcessingRef<'a>>,
    assume_success: bool,
}

impl<'a> TxView<'a> {
    /// v0 envelopes carry no usable per-transaction results, so every
    /// transaction in them is treated as successful.
    pub fn successful(&self) -> bool {
        if self.assume_success {
            return true;
        }
        match &self.processing {
            None => false,
            Some(p) => matches!(
                p.result.result.result,
                TransactionResultResult::TxSuccess(_)
                    | TransactionResultResult::TxFeeBumpInnerSuccess(_)
            ),
        }
    }

    pub fn fee_charged(&self) -> i64 {
        self.processing.map(|p| p.result.result.fee_charged).unwrap_or(0)
    }

    pub fn result_code(&self) -> &'static str {
        self.processing
            .map(|p| p.result.result.result.name())
            .unwrap_or("TxMissing")
    }

    /// Result code of the wrapped transaction, for fee-bump envelopes.
    pub fn inner_result_code(&self) -> Option<&'static str> {
        let p = self.processing?;
        match &p.result.result.result {
            TransactionResultResult::TxFeeBumpInnerSuccess(inner)
            | TransactionResultResult::TxFeeBumpInnerFailed(inner) => {
                Some(inner.result.result.name())
            }
            _ => None,
        }
    }

    pub fn operations(&self) -> &'a [Operation] {
        envelope_operations(self.envelope)
    }
}

/// Borrowed apply results for one transaction.
#[derive(Clone, Copy)]
pub struct ProcessingRef<'a> {
    pub result: &'a TransactionResultPair,
    pub apply_meta: &'a TransactionMeta,
    pub fee_changes: &'a LedgerEntryChanges,
    pub post_fee_changes: Option<&'a LedgerEntryChanges>,
}

/// Decoded handle over one closed-ledger envelope.
pub struct LedgerEnvelope {
    meta: LedgerCloseMeta,
    network: Network,
}

impl LedgerEnvelope {
    pub fn decode(bytes: &[u8], network: &Network) -> Result<Self, EnvelopeError> {
        let meta = LedgerCloseMeta::from_xdr(bytes, Limits::none())
            .map_err(|err| EnvelopeError::InvalidEnvelope(err.to_string()))?;
        Ok(Self {
            meta,
            network: network.clone(),
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn version(&self) -> u32 {
        match &self.meta {
            LedgerCloseMeta::V0(_) => 0,
            LedgerCloseMeta::V1(_) => 1,
            LedgerCloseMeta::V2(_) => 2,
        }
    }

    fn header_entry(&self) -> &LedgerHeaderHistoryEntry {
        match &self.meta {
            LedgerCloseMeta::V0(m) => &m.ledger_header,
            LedgerCloseMeta::V1(m) => &m.ledger_header,
            LedgerCloseMeta::V2(m) => &m.ledger_header,
        }
    }

    pub fn header(&self) -> &LedgerHeader {
        &self.header_entry().header
    }

    pub fn sequence(&self) -> u32 {
        self.header().ledger_seq
    }

    pub fn ledger_hash(&self) -> String {
        hex::encode(self.header_entry().hash.0)
    }

    pub fn previous_ledger_hash(&self) -> String {
        hex::encode(self.header().previous_ledger_hash.0)
    }

    pub fn tx_set_hash(&self) -> String {
        hex::encode(self.header().scp_value.tx_set_hash.0)
    }

    pub fn closed_at(&self) -> DateTime<Utc> {
        let close_time = self.header().scp_value.close_time.0;
        DateTime::from_timestamp(close_time as i64, 0).unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// `(node id, signature)` when the close value was signed.
    pub fn scp_signature(&self) -> Option<(String, String)> {
        match &self.header().scp_value.ext {
            StellarValueExt::Basic => None,
            StellarValueExt::Signed(sig) => {
                let PublicKey::PublicKeyTypeEd25519(key) = &sig.node_id.0;
                let node = stellar_strkey::ed25519::PublicKey(key.0).to_string();
                Some((node, hex::encode(sig.signature.as_slice())))
            }
        }
    }

    /// Write fee for 1KB of Soroban state, when the variant surfaces it.
    pub fn soroban_fee_write_1kb(&self) -> Option<i64> {
        let ext = match &self.meta {
            LedgerCloseMeta::V0(_) => return None,
            LedgerCloseMeta::V1(m) => &m.ext,
            LedgerCloseMeta::V2(m) => &m.ext,
        };
        match ext {
            LedgerCloseMetaExt::V0 => None,
            LedgerCloseMetaExt::V1(v1) => Some(v1.soroban_fee_write1_kb),
        }
    }

    pub fn total_byte_size_of_live_state(&self) -> Option<u64> {
        match &self.meta {
            LedgerCloseMeta::V0(_) => None,
            LedgerCloseMeta::V1(m) => Some(m.total_byte_size_of_live_soroban_state),
            LedgerCloseMeta::V2(m) => Some(m.total_byte_size_of_live_soroban_state),
        }
    }

    pub fn evicted_key_count(&self) -> Option<u32> {
        match &self.meta {
            LedgerCloseMeta::V0(_) => None,
            LedgerCloseMeta::V1(m) => Some(m.evicted_keys.len() as u32),
            LedgerCloseMeta::V2(m) => Some(m.evicted_keys.len() as u32),
        }
    }

    fn processing_entries(&self) -> Vec<ProcessingRef<'_>> {
        match &self.meta {
            LedgerCloseMeta::V0(m) => m
                .tx_processing
                .iter()
                .map(|p| ProcessingRef {
                    result: &p.result,
                    apply_meta: &p.tx_apply_processing,
                    fee_changes: &p.fee_processing,
                    post_fee_changes: None,
                })
                .collect(),
            LedgerCloseMeta::V1(m) => m
                .tx_processing
                .iter()
                .map(|p| ProcessingRef {
                    result: &p.result,
                    apply_meta: &p.tx_apply_processing,
                    fee_changes: &p.fee_processing,
                    post_fee_changes: None,
                })
                .collect(),
            LedgerCloseMeta::V2(m) => m
                .tx_processing
                .iter()
                .map(|p| ProcessingRef {
                    result: &p.result,
                    apply_meta: &p.tx_apply_processing,
                    fee_changes: &p.fee_processing,
                    post_fee_changes: Some(&p.post_tx_apply_fee_processing),
                })
                .collect(),
        }
    }

    fn tx_envelopes(&self) -> Vec<&TransactionEnvelope> {
        match &self.meta {
            LedgerCloseMeta::V0(m) => m.tx_set.txs.iter().collect(),
            LedgerCloseMeta::V1(m) => generalized_set_txs(&m.tx_set),
            LedgerCloseMeta::V2(m) => generalized_set_txs(&m.tx_set),
        }
    }

    fn upgrades(&self) -> &[UpgradeEntryMeta] {
        match &self.meta {
            LedgerCloseMeta::V0(m) => m.upgrades_processing.as_slice(),
            LedgerCloseMeta::V1(m) => m.upgrades_processing.as_slice(),
            LedgerCloseMeta::V2(m) => m.upgrades_processing.as_slice(),
        }
    }

    /// Transactions in set order, each paired with its apply results by hash.
    /// Rebuilt on every call, so iteration is restartable.
    pub fn transactions(&self) -> Result<Vec<TxView<'_>>, EnvelopeError> {
        let assume_success = matches!(self.meta, LedgerCloseMeta::V0(_));
        let processing = self.processing_entries();
        let by_hash: HashMap<[u8; 32], usize> = processing
            .iter()
            .enumerate()
            .map(|(idx, p)| (p.result.transaction_hash.0, idx))
            .collect();
        self.tx_envelopes()
            .into_iter()
            .enumerate()
            .map(|(idx, envelope)| {
                let hash = transaction_hash(envelope, &self.network)?;
                Ok(TxView {
                    application_order: idx as u32 + 1,
                    envelope,
                    hash,
                    processing: by_hash.get(&hash).map(|i| processing[*i]),
                    assume_success,
                })
            })
            .collect()
    }

    /// All ledger-entry changes produced by this envelope, in apply order:
    /// fee charges for every transaction first, then per-transaction apply
    /// meta, then protocol upgrades.
    pub fn changes(&self) -> Vec<&LedgerEntryChange> {
        let processing = self.processing_entries();
        let mut out = Vec::new();
        for p in &processing {
            out.extend(p.fee_changes.0.iter());
        }
        for p in &processing {
            collect_meta_changes(p.apply_meta, &mut out);
            if let Some(post) = p.post_fee_changes {
                out.extend(post.0.iter());
            }
        }
        for upgrade in self.upgrades() {
            out.extend(upgrade.changes.0.iter());
        }
        out
    }
}

fn generalized_set_txs(set: &GeneralizedTransactionSet) -> Vec<&TransactionEnvelope> {
    let GeneralizedTransactionSet::V1(v1) = set;
    let mut out = Vec::new();
    for phase in v1.phases.iter() {
        match phase {
            TransactionPhase::V0(components) => {
                for component in components.iter() {
                    let TxSetComponent::TxsetCompTxsMaybeDiscountedFee(c) = component;
                    out.extend(c.txs.iter());
                }
            }
            // Parallel execution phases carry Soroban transactions this
            // pipeline does not ingest yet.
            _ => {}
        }
    }
    out
}

fn collect_meta_changes<'a>(meta: &'a TransactionMeta, out: &mut Vec<&'a LedgerEntryChange>) {
    match meta {
        TransactionMeta::V0(ops) => {
            for op in ops.iter() {
                out.extend(op.changes.0.iter());
            }
        }
        TransactionMeta::V1(m) => {
            out.extend(m.tx_changes.0.iter());
            for op in m.operations.iter() {
                out.extend(op.changes.0.iter());
            }
        }
        TransactionMeta::V2(m) => {
            out.extend(m.tx_changes_before.0.iter());
            for op in m.operations.iter() {
                out.extend(op.changes.0.iter());
            }
            out.extend(m.tx_changes_after.0.iter());
        }
        TransactionMeta::V3(m) => {
            out.extend(m.tx_changes_before.0.iter());
            for op in m.operations.iter() {
                out.extend(op.changes.0.iter());
            }
            out.extend(m.tx_changes_after.0.iter());
        }
        TransactionMeta::V4(m) => {
            out.extend(m.tx_changes_before.0.iter());
            for op in m.operations.iter() {
                out.extend(op.changes.0.iter());
            }
            out.extend(m.tx_changes_after.0.iter());
        }
    }
}

pub fn envelope_operations(envelope: &TransactionEnvelope) -> &[Operation] {
    match envelope {
        TransactionEnvelope::TxV0(e) => e.tx.operations.as_slice(),
        TransactionEnvelope::Tx(e) => e.tx.operations.as_slice(),
        TransactionEnvelope::TxFeeBump(e) => {
            let FeeBumpTransactionInnerTx::Tx(inner) = &e.tx.inner_tx;
            inner.tx.operations.as_slice()
        }
    }
}

/// Network-scoped hash of a transaction envelope. v0 transactions are hashed
/// through their v1 representation, matching upstream behavior.
pub fn transaction_hash(
    envelope: &TransactionEnvelope,
    network: &Network,
) -> Result<[u8; 32], EnvelopeError> {
    let tagged = match envelope {
        TransactionEnvelope::TxV0(e) => {
            TransactionSignaturePayloadTaggedTransaction::Tx(upgrade_v0_tx(&e.tx))
        }
        TransactionEnvelope::Tx(e) => {
            TransactionSignaturePayloadTaggedTransaction::Tx(e.tx.clone())
        }
        TransactionEnvelope::TxFeeBump(e) => {
            TransactionSignaturePayloadTaggedTransaction::TxFeeBump(e.tx.clone())
        }
    };
    hash_tagged(tagged, network)
}

/// Hash of the transaction wrapped by a fee-bump envelope.
pub fn fee_bump_inner_hash(
    envelope: &FeeBumpTransactionEnvelope,
    network: &Network,
) -> Result<[u8; 32], EnvelopeError> {
    let FeeBumpTransactionInnerTx::Tx(inner) = &envelope.tx.inner_tx;
    hash_tagged(
        TransactionSignaturePayloadTaggedTransaction::Tx(inner.tx.clone()),
        network,
    )
}

fn hash_tagged(
    tagged: TransactionSignaturePayloadTaggedTransaction,
    network: &Network,
) -> Result<[u8; 32], EnvelopeError> {
    let payload = TransactionSignaturePayload {
        network_id: Hash(*network.id()),
        tagged_transaction: tagged,
    };
    let bytes = payload
        .to_xdr(Limits::none())
        .map_err(|err| EnvelopeError::InvalidEnvelope(err.to_string()))?;
    Ok(Sha256::digest(&bytes).into())
}

fn upgrade_v0_tx(tx: &TransactionV0) -> Transaction {
    Transaction {
        source_account: MuxedAccount::Ed25519(tx.source_account_ed25519.clone()),
        fee: tx.fee,
        seq_num: tx.seq_num.clone(),
        cond: match &tx.time_bounds {
            Some(tb) => Preconditions::Time(tb.clone()),
            None => Preconditions::None,
        },
        memo: tx.memo.clone(),
        operations: tx.operations.clone(),
        ext: TransactionExt::V0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn rejects_garbage_bytes() {
        let network = Network::new(testing::TEST_PASSPHRASE);
        let err = LedgerEnvelope::decode(&[0xde, 0xad, 0xbe, 0xef], &network).unwrap_err();
        assert!(matches!(err, EnvelopeError::InvalidEnvelope(_)));
    }

    #[test]
    fn rejects_truncated_envelope() {
        let network = Network::new(testing::TEST_PASSPHRASE);
        let bytes = testing::LedgerBuilder::new(100).build_bytes();
        let err = LedgerEnvelope::decode(&bytes[..bytes.len() / 2], &network).unwrap_err();
        assert!(matches!(err, EnvelopeError::InvalidEnvelope(_)));
    }

    #[test]
    fn header_accessors_roundtrip() {
        let network = Network::new(testing::TEST_PASSPHRASE);
        let bytes = testing::LedgerBuilder::new(4242)
            .close_time(1_700_000_000)
            .build_bytes();
        let envelope = LedgerEnvelope::decode(&bytes, &network).unwrap();
        assert_eq!(envelope.version(), 1);
        assert_eq!(envelope.sequence(), 4242);
        assert_eq!(envelope.closed_at().timestamp(), 1_700_000_000);
        assert_eq!(envelope.evicted_key_count(), Some(0));
        assert!(envelope.scp_signature().is_none());
    }

    #[test]
    fn transactions_pair_envelopes_with_results_by_hash() {
        let network = Network::new(testing::TEST_PASSPHRASE);
        let bytes = testing::LedgerBuilder::new(7)
            .with_payment_tx(1, true)
            .with_payment_tx(2, false)
            .build_bytes();
        let envelope = LedgerEnvelope::decode(&bytes, &network).unwrap();
        let txs = envelope.transactions().unwrap();
        assert_eq!(txs.len(), 2);
        assert!(txs[0].successful());
        assert!(!txs[1].successful());
        assert_eq!(txs[0].application_order, 1);
        assert_eq!(txs[1].application_order, 2);
        assert_ne!(txs[0].hash, txs[1].hash);
    }
}
