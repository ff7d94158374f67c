//! Fixed battery of quality checks, run over the in-memory buffer just
//! before every flush. Failures never block the flush: they are logged and
//! recorded to the quality table.

use std::collections::HashSet;

use crate::ingest::RowBuffer;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

fn outcome(name: &'static str, passed: bool, detail: String) -> CheckOutcome {
    CheckOutcome {
        name,
        passed,
        detail,
    }
}

/// Runs all five checks. `flushed_through` is the highest ledger sequence the
/// worker has already committed, used by the referential check for
/// transactions whose ledger row left the buffer in an earlier flush.
pub fn run_battery(buffer: &RowBuffer, flushed_through: Option<u32>) -> Vec<CheckOutcome> {
    vec![
        monotonic_sequence(buffer),
        referential_integrity(buffer, flushed_through),
        required_non_null(buffer),
        positive_values(buffer),
        count_consistency(buffer),
    ]
}

fn monotonic_sequence(buffer: &RowBuffer) -> CheckOutcome {
    let mut gaps = Vec::new();
    for pair in buffer.ledgers.windows(2) {
        if pair[1].sequence != pair[0].sequence + 1 {
            gaps.push(format!("{}->{}", pair[0].sequence, pair[1].sequence));
        }
    }
    outcome(
        "monotonic_sequence",
        gaps.is_empty(),
        if gaps.is_empty() {
            format!("{} ledgers, ascending and gapless", buffer.ledgers.len())
        } else {
            format!("gaps: {}", gaps.join(", "))
        },
    )
}

fn referential_integrity(buffer: &RowBuffer, flushed_through: Option<u32>) -> CheckOutcome {
    let known: HashSet<u32> = buffer.ledgers.iter().map(|row| row.sequence).collect();
    let orphaned = buffer
        .transactions
        .iter()
        .filter(|tx| {
            !known.contains(&tx.ledger_sequence)
                && flushed_through.map_or(true, |upper| tx.ledger_sequence > upper)
        })
        .count();
    outcome(
        "referential_integrity",
        orphaned == 0,
        format!("{orphaned} transactions without a ledger row"),
    )
}

fn required_non_null(buffer: &RowBuffer) -> CheckOutcome {
    let empty_hashes = buffer
        .ledgers
        .iter()
        .filter(|row| row.ledger_hash.is_empty())
        .count();
    let empty_sources = buffer
        .transactions
        .iter()
        .filter(|row| row.source_account.is_empty())
        .count();
    let violations = empty_hashes + empty_sources;
    outcome(
        "required_non_null",
        violations == 0,
        format!("{empty_hashes} empty ledger hashes, {empty_sources} empty source accounts"),
    )
}

fn positive_values(buffer: &RowBuffer) -> CheckOutcome {
    let negative_coins = buffer
        .ledgers
        .iter()
        .filter(|row| row.total_coins < 0)
        .count();
    let negative_fees = buffer
        .transactions
        .iter()
        .filter(|row| row.fee_charged < 0)
        .count();
    let violations = negative_coins + negative_fees;
    outcome(
        "positive_values",
        violations == 0,
        format!("{negative_coins} negative total_coins, {negative_fees} negative fees"),
    )
}

fn count_consistency(buffer: &RowBuffer) -> CheckOutcome {
    let inconsistent = buffer
        .ledgers
        .iter()
        .filter(|row| row.successful_tx_count + row.failed_tx_count != row.transaction_count)
        .count();
    outcome(
        "count_consistency",
        inconsistent == 0,
        format!("{inconsistent} ledgers with inconsistent transaction counts"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::RowBuffer;
    use crate::testing::sample_ledger_row;

    fn buffer_with(sequences: &[u32]) -> RowBuffer {
        let mut buffer = RowBuffer::default();
        for sequence in sequences {
            buffer.ledgers.push(sample_ledger_row(*sequence));
        }
        buffer
    }

    #[test]
    fn all_checks_pass_on_contiguous_buffer() {
        let battery = run_battery(&buffer_with(&[5, 6, 7]), None);
        assert_eq!(battery.len(), 5);
        assert!(battery.iter().all(|check| check.passed), "{battery:?}");
    }

    #[test]
    fn gap_fails_only_the_monotonic_check() {
        let battery = run_battery(&buffer_with(&[5, 6, 9]), None);
        let monotonic = battery
            .iter()
            .find(|check| check.name == "monotonic_sequence")
            .unwrap();
        assert!(!monotonic.passed);
        assert!(monotonic.detail.contains("6->9"));
        assert!(battery
            .iter()
            .filter(|check| check.name != "monotonic_sequence")
            .all(|check| check.passed));
    }

    #[test]
    fn previously_flushed_ledgers_satisfy_referential_check() {
        let mut buffer = buffer_with(&[10]);
        let mut tx = crate::testing::sample_transaction_row(9);
        tx.ledger_sequence = 9;
        buffer.transactions.push(tx);
        let failing = run_battery(&buffer, None);
        assert!(!failing
            .iter()
            .find(|check| check.name == "referential_integrity")
            .unwrap()
            .passed);
        let passing = run_battery(&buffer, Some(9));
        assert!(passing
            .iter()
            .find(|check| check.name == "referential_integrity")
            .unwrap()
            .passed);
    }

    #[test]
    fn count_inconsistency_is_detected() {
        let mut buffer = buffer_with(&[4]);
        buffer.ledgers[0].transaction_count = 3;
        buffer.ledgers[0].successful_tx_count = 1;
        buffer.ledgers[0].failed_tx_count = 1;
        let battery = run_battery(&buffer, None);
        assert!(!battery
            .iter()
            .find(|check| check.name == "count_consistency")
            .unwrap()
            .passed);
    }
}
