use crate::ledger::{LedgerEnvelope, TxView};
use lumenlake_types::{partition_for, LedgerRow};

/// Builds the single ledger row for an envelope, summing operation counts
/// over the transaction views.
///
/// Two counts are surfaced: operations inside successful transactions and
/// operations across the whole set. For v0 envelopes every transaction is
/// treated as successful, so the two counts coincide.
pub(super) fn extract_ledger(envelope: &LedgerEnvelope, txs: &[TxView<'_>]) -> LedgerRow {
    let header = envelope.header();
    let mut successful_tx_count = 0u32;
    let mut failed_tx_count = 0u32;
    let mut operation_count = 0u32;
    let mut tx_set_operation_count = 0u32;
    for tx in txs {
        let ops = tx.operations().len() as u32;
        tx_set_operation_count += ops;
        if tx.successful() {
            successful_tx_count += 1;
            operation_count += ops;
        } else {
            failed_tx_count += 1;
        }
    }
    let (scp_signature_node, scp_signature) = match envelope.scp_signature() {
        Some((node, signature)) => (Some(node), Some(signature)),
        None => (None, None),
    };
    LedgerRow {
        sequence: envelope.sequence(),
        ledger_hash: envelope.ledger_hash(),
        previous_ledger_hash: envelope.previous_ledger_hash(),
        closed_at: envelope.closed_at(),
        protocol_version: header.ledger_version,
        total_coins: header.total_coins,
        fee_pool: header.fee_pool,
        inflation_seq: header.inflation_seq,
        id_pool: header.id_pool,
        base_fee: header.base_fee,
        base_reserve: header.base_reserve,
        max_tx_set_size: header.max_tx_set_size,
        tx_set_hash: envelope.tx_set_hash(),
        transaction_count: txs.len() as u32,
        successful_tx_count,
        failed_tx_count,
        operation_count,
        tx_set_operation_count,
        soroban_fee_write_1kb: envelope.soroban_fee_write_1kb(),
        total_byte_size_of_live_state: envelope.total_byte_size_of_live_state(),
        evicted_key_count: envelope.evicted_key_count(),
        scp_signature_node,
        scp_signature,
        ledger_range: partition_for(envelope.sequence()),
    }
}

#[cfg(test)]
mod tests {
    use crate::extract::extract;
    use crate::ledger::{LedgerEnvelope, Network};
    use crate::testing::{self, LedgerBuilder};

    #[test]
    fn success_and_failure_counts_add_up() {
        let bytes = LedgerBuilder::new(100)
            .with_payment_tx(1, true)
            .with_payment_tx(2, false)
            .with_payment_tx(3, true)
            .build_bytes();
        let network = Network::new(testing::TEST_PASSPHRASE);
        let envelope = LedgerEnvelope::decode(&bytes, &network).unwrap();
        let row = extract(&envelope).unwrap().ledger;
        assert_eq!(row.transaction_count, 3);
        assert_eq!(row.successful_tx_count, 2);
        assert_eq!(row.failed_tx_count, 1);
        assert_eq!(
            row.successful_tx_count + row.failed_tx_count,
            row.transaction_count
        );
        // One payment op per transaction: failed ops only show in the set count.
        assert_eq!(row.operation_count, 2);
        assert_eq!(row.tx_set_operation_count, 3);
    }

    #[test]
    fn partition_key_is_derived_from_sequence() {
        let bytes = LedgerBuilder::new(56_789).build_bytes();
        let network = Network::new(testing::TEST_PASSPHRASE);
        let envelope = LedgerEnvelope::decode(&bytes, &network).unwrap();
        let row = extract(&envelope).unwrap().ledger;
        assert_eq!(row.ledger_range, 50_000);
    }
}
