//! Pure extraction of typed row batches from one decoded envelope.
//!
//! One envelope fans out into four row batches sharing the same ledger
//! sequence. Extraction performs no I/O and touches no shared state: the same
//! envelope always yields the same rows.

pub mod asset;
mod balance;
mod ledger;
mod operation;
mod transaction;

use crate::error::EnvelopeError;
use crate::ledger::LedgerEnvelope;
use lumenlake_types::{BalanceRow, LedgerRow, OperationRow, TransactionRow};

/// Row batches produced from a single envelope.
#[derive(Clone, Debug)]
pub struct ExtractedRows {
    pub ledger: LedgerRow,
    pub transactions: Vec<TransactionRow>,
    pub operations: Vec<OperationRow>,
    pub balances: Vec<BalanceRow>,
}

pub fn extract(envelope: &LedgerEnvelope) -> Result<ExtractedRows, EnvelopeError> {
    let txs = envelope.transactions()?;
    let ledger = ledger::extract_ledger(envelope, &txs);
    let mut transactions = Vec::with_capacity(txs.len());
    let mut operations = Vec::new();
    for tx in &txs {
        transactions.push(transaction::extract_transaction(envelope, tx)?);
        operation::extract_operations(envelope, tx, &mut operations);
    }
    let balances = balance::extract_balances(envelope);
    Ok(ExtractedRows {
        ledger,
        transactions,
        operations,
        balances,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Network;
    use crate::testing::{self, LedgerBuilder};

    fn decode(builder: LedgerBuilder) -> LedgerEnvelope {
        let network = Network::new(testing::TEST_PASSPHRASE);
        LedgerEnvelope::decode(&builder.build_bytes(), &network).unwrap()
    }

    #[test]
    fn one_ledger_row_per_envelope() {
        let envelope = decode(LedgerBuilder::new(5000).with_payment_tx(1, true));
        let rows = extract(&envelope).unwrap();
        assert_eq!(rows.ledger.sequence, 5000);
        assert_eq!(rows.transactions.len(), 1);
        assert_eq!(rows.operations.len(), 1);
    }

    #[test]
    fn every_child_row_points_at_the_ledger_row() {
        let envelope = decode(
            LedgerBuilder::new(31_337)
                .with_payment_tx(1, true)
                .with_payment_tx(2, false),
        );
        let rows = extract(&envelope).unwrap();
        for tx in &rows.transactions {
            assert_eq!(tx.ledger_sequence, rows.ledger.sequence);
        }
        for op in &rows.operations {
            assert_eq!(op.ledger_sequence, rows.ledger.sequence);
            assert!(rows
                .transactions
                .iter()
                .any(|tx| tx.transaction_hash == op.transaction_hash));
        }
    }

    #[test]
    fn operation_indexes_are_unique_within_a_transaction() {
        let envelope = decode(LedgerBuilder::new(9).with_multi_op_tx(3));
        let rows = extract(&envelope).unwrap();
        let mut seen: Vec<(String, u32)> = rows
            .operations
            .iter()
            .map(|op| (op.transaction_hash.clone(), op.operation_index))
            .collect();
        let before = seen.len();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), before);
    }

    #[test]
    fn extraction_is_deterministic() {
        let bytes = LedgerBuilder::new(777)
            .with_payment_tx(4, true)
            .with_account_entry(11, 2_000_000)
            .build_bytes();
        let network = Network::new(testing::TEST_PASSPHRASE);
        let a = extract(&LedgerEnvelope::decode(&bytes, &network).unwrap()).unwrap();
        let b = extract(&LedgerEnvelope::decode(&bytes, &network).unwrap()).unwrap();
        assert_eq!(a.ledger, b.ledger);
        assert_eq!(a.transactions, b.transactions);
        assert_eq!(a.operations, b.operations);
        assert_eq!(a.balances, b.balances);
    }
}
