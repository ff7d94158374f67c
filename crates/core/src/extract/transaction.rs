use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use stellar_xdr::curr::{
    FeeBumpTransactionInnerTx, Limits, Memo, Preconditions, TransactionEnvelope, TransactionExt,
    WriteXdr,
};

use super::asset::{muxed_account_strings, signer_key_string};
use crate::error::EnvelopeError;
use crate::ledger::{fee_bump_inner_hash, LedgerEnvelope, TxView};
use lumenlake_types::{partition_for, TransactionRow};

/// Flattens one transaction view into its wide row.
///
/// For fee-bump envelopes the row describes the inner transaction (source,
/// sequence, memo, preconditions) while the fee-bump columns carry the outer
/// fee source, the replacement fee and the inner hash.
pub(super) fn extract_transaction(
    envelope: &LedgerEnvelope,
    tx: &TxView<'_>,
) -> Result<TransactionRow, EnvelopeError> {
    let sequence = envelope.sequence();
    let closed_at = envelope.closed_at();

    let mut row = TransactionRow {
        ledger_sequence: sequence,
        transaction_hash: hex::encode(tx.hash),
        application_order: tx.application_order,
        source_account: String::new(),
        source_account_muxed: None,
        source_account_muxed_id: None,
        seq_num: 0,
        envelope_type: String::new(),
        max_fee: 0,
        fee_charged: tx.fee_charged(),
        successful: tx.successful(),
        result_code: tx.result_code().to_string(),
        inner_result_code: tx.inner_result_code().map(str::to_string),
        operation_count: tx.operations().len() as u32,
        signature_count: 0,
        memo_type: String::new(),
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
        tx_envelope: encode_envelope(tx.envelope)?,
        tx_result: encode_result(tx),
        closed_at,
        ledger_range: partition_for(sequence),
    };

    match tx.envelope {
        TransactionEnvelope::TxV0(e) => {
            row.envelope_type = "tx_v0".into();
            row.source_account =
                stellar_strkey::ed25519::PublicKey(e.tx.source_account_ed25519.0).to_string();
            row.seq_num = e.tx.seq_num.0;
            row.max_fee = i64::from(e.tx.fee);
            row.signature_count = e.signatures.len() as u32;
            apply_memo(&mut row, &e.tx.memo);
            if let Some(tb) = &e.tx.time_bounds {
                row.time_bounds_lower = Some(tb.min_time.0);
                row.time_bounds_upper = Some(tb.max_time.0);
            }
        }
        TransactionEnvelope::Tx(e) => {
            row.envelope_type = "tx".into();
            let (source, muxed, muxed_id) = muxed_account_strings(&e.tx.source_account);
            row.source_account = source;
            row.source_account_muxed = muxed;
            row.source_account_muxed_id = muxed_id;
            row.seq_num = e.tx.seq_num.0;
            row.max_fee = i64::from(e.tx.fee);
            row.signature_count = e.signatures.len() as u32;
            apply_memo(&mut row, &e.tx.memo);
            apply_preconditions(&mut row, &e.tx.cond);
            apply_soroban(&mut row, &e.tx.ext);
        }
        TransactionEnvelope::TxFeeBump(e) => {
            row.envelope_type = "tx_fee_bump".into();
            row.fee_bump = true;
            let (fee_account, fee_muxed, fee_muxed_id) = muxed_account_strings(&e.tx.fee_source);
            row.fee_account = Some(fee_account);
            row.fee_account_muxed = fee_muxed;
            row.fee_account_muxed_id = fee_muxed_id;
            row.new_max_fee = Some(e.tx.fee);
            row.signature_count = e.signatures.len() as u32;
            row.inner_transaction_hash =
                Some(hex::encode(fee_bump_inner_hash(e, envelope.network())?));

            let FeeBumpTransactionInnerTx::Tx(inner) = &e.tx.inner_tx;
            let (source, muxed, muxed_id) = muxed_account_strings(&inner.tx.source_account);
            row.source_account = source;
            row.source_account_muxed = muxed;
            row.source_account_muxed_id = muxed_id;
            row.seq_num = inner.tx.seq_num.0;
            row.max_fee = i64::from(inner.tx.fee);
            row.inner_signature_count = Some(inner.signatures.len() as u32);
            apply_memo(&mut row, &inner.tx.memo);
            apply_preconditions(&mut row, &inner.tx.cond);
            apply_soroban(&mut row, &inner.tx.ext);
        }
    }

    Ok(row)
}

fn apply_memo(row: &mut TransactionRow, memo: &Memo) {
    match memo {
        Memo::None => row.memo_type = "none".into(),
        Memo::Text(text) => {
            row.memo_type = "text".into();
            row.memo = Some(text.to_utf8_string_lossy());
        }
        Memo::Id(id) => {
            row.memo_type = "id".into();
            row.memo = Some(id.to_string());
        }
        Memo::Hash(hash) => {
            row.memo_type = "hash".into();
            row.memo = Some(hex::encode(hash.0));
        }
        Memo::Return(hash) => {
            row.memo_type = "return".into();
            row.memo = Some(hex::encode(hash.0));
        }
    }
}

fn apply_preconditions(row: &mut TransactionRow, cond: &Preconditions) {
    match cond {
        Preconditions::None => {}
        Preconditions::Time(tb) => {
            row.time_bounds_lower = Some(tb.min_time.0);
            row.time_bounds_upper = Some(tb.max_time.0);
        }
        Preconditions::V2(p2) => {
            if let Some(tb) = &p2.time_bounds {
                row.time_bounds_lower = Some(tb.min_time.0);
                row.time_bounds_upper = Some(tb.max_time.0);
            }
            if let Some(lb) = &p2.ledger_bounds {
                row.ledger_bounds_min = Some(lb.min_ledger);
                row.ledger_bounds_max = Some(lb.max_ledger);
            }
            row.min_account_sequence = p2.min_seq_num.as_ref().map(|seq| seq.0);
            row.min_account_sequence_age = Some(p2.min_seq_age.0);
            row.min_account_sequence_ledger_gap = Some(p2.min_seq_ledger_gap);
            if !p2.extra_signers.is_empty() {
                row.extra_signers = Some(
                    p2.extra_signers
                        .iter()
                        .map(signer_key_string)
                        .collect::<Vec<_>>()
                        .join(","),
                );
            }
        }
    }
}

fn apply_soroban(row: &mut TransactionRow, ext: &TransactionExt) {
    match ext {
        TransactionExt::V0 => {}
        TransactionExt::V1(data) => {
            row.soroban_resource_fee = Some(data.resource_fee);
            row.soroban_instructions = Some(data.resources.instructions);
            row.soroban_disk_read_bytes = Some(data.resources.disk_read_bytes);
            row.soroban_write_bytes = Some(data.resources.write_bytes);
        }
    }
}

fn encode_envelope(envelope: &TransactionEnvelope) -> Result<String, EnvelopeError> {
    let bytes = envelope
        .to_xdr(Limits::none())
        .map_err(|err| EnvelopeError::InvalidEnvelope(err.to_string()))?;
    Ok(BASE64.encode(bytes))
}

fn encode_result(tx: &TxView<'_>) -> Option<String> {
    let processing = tx.processing?;
    processing
        .result
        .result
        .to_xdr(Limits::none())
        .ok()
        .map(|bytes| BASE64.encode(bytes))
}

#[cfg(test)]
mod tests {
    use crate::extract::extract;
    use crate::ledger::{LedgerEnvelope, Network};
    use crate::testing::{self, LedgerBuilder};

    fn decode(builder: LedgerBuilder) -> LedgerEnvelope {
        let network = Network::new(testing::TEST_PASSPHRASE);
        LedgerEnvelope::decode(&builder.build_bytes(), &network).unwrap()
    }

    #[test]
    fn plain_transaction_has_no_fee_bump_columns() {
        let rows = extract(&decode(LedgerBuilder::new(10).with_payment_tx(1, true))).unwrap();
        let tx = &rows.transactions[0];
        assert_eq!(tx.envelope_type, "tx");
        assert!(!tx.fee_bump);
        assert_eq!(tx.fee_account, None);
        assert_eq!(tx.inner_transaction_hash, None);
        assert_eq!(tx.new_max_fee, None);
        assert!(tx.source_account.starts_with('G'));
        assert_eq!(tx.memo_type, "text");
        assert!(tx.successful);
    }

    #[test]
    fn fee_bump_populates_inner_columns() {
        let rows = extract(&decode(LedgerBuilder::new(11).with_fee_bump_tx(3))).unwrap();
        let tx = &rows.transactions[0];
        assert_eq!(tx.envelope_type, "tx_fee_bump");
        assert!(tx.fee_bump);
        assert!(tx.fee_account.as_deref().unwrap().starts_with('G'));
        assert_eq!(tx.new_max_fee, Some(testing::FEE_BUMP_FEE));
        let inner_hash = tx.inner_transaction_hash.as_deref().unwrap();
        assert_eq!(inner_hash.len(), 64);
        assert_ne!(inner_hash, tx.transaction_hash);
        assert_eq!(tx.inner_signature_count, Some(1));
    }

    #[test]
    fn failed_transaction_keeps_result_code() {
        let rows = extract(&decode(LedgerBuilder::new(12).with_payment_tx(5, false))).unwrap();
        let tx = &rows.transactions[0];
        assert!(!tx.successful);
        assert_eq!(tx.result_code, "TxFailed");
        assert!(tx.tx_result.is_some());
    }

    #[test]
    fn envelope_xdr_is_base64() {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine as _;
        let rows = extract(&decode(LedgerBuilder::new(13).with_payment_tx(6, true))).unwrap();
        assert!(BASE64.decode(&rows.transactions[0].tx_envelope).is_ok());
    }
}
