use std::collections::BTreeMap;
use stellar_xdr::curr::{
    AccountEntry, AccountEntryExt, AccountEntryExtensionV1Ext, LedgerEntryChange, LedgerEntryData,
};

use super::asset::account_id_string;
use crate::ledger::LedgerEnvelope;
use lumenlake_types::{partition_for, BalanceRow};

/// One balance row per distinct account written by this envelope.
///
/// Only post-images count; within one envelope the last write per account
/// wins. Rows come out ordered by account id.
pub(super) fn extract_balances(envelope: &LedgerEnvelope) -> Vec<BalanceRow> {
    let sequence = envelope.sequence();
    let mut latest: BTreeMap<String, BalanceRow> = BTreeMap::new();
    for change in envelope.changes() {
        let entry = match change {
            LedgerEntryChange::Created(entry)
            | LedgerEntryChange::Updated(entry)
            | LedgerEntryChange::Restored(entry) => entry,
            LedgerEntryChange::State(_) | LedgerEntryChange::Removed(_) => continue,
        };
        if let LedgerEntryData::Account(account) = &entry.data {
            let row = account_balance_row(account, sequence);
            latest.insert(row.account_id.clone(), row);
        }
    }
    latest.into_values().collect()
}

fn account_balance_row(account: &AccountEntry, sequence: u32) -> BalanceRow {
    let (buying_liabilities, selling_liabilities, num_sponsored, num_sponsoring) =
        match &account.ext {
            AccountEntryExt::V0 => (0, 0, 0, 0),
            AccountEntryExt::V1(v1) => {
                let (sponsored, sponsoring) = match &v1.ext {
                    AccountEntryExtensionV1Ext::V0 => (0, 0),
                    AccountEntryExtensionV1Ext::V2(v2) => (v2.num_sponsored, v2.num_sponsoring),
                };
                (
                    v1.liabilities.buying,
                    v1.liabilities.selling,
                    sponsored,
                    sponsoring,
                )
            }
        };
    BalanceRow {
        account_id: account_id_string(&account.account_id),
        ledger_sequence: sequence,
        balance: account.balance,
        buying_liabilities,
        selling_liabilities,
        num_subentries: account.num_sub_entries,
        num_sponsored,
        num_sponsoring,
        sequence_number: account.seq_num.0,
        flags: account.flags,
        ledger_range: partition_for(sequence),
    }
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
    fn last_write_wins_within_one_envelope() {
        let rows = extract(&decode(
            LedgerBuilder::new(50)
                .with_account_entry(1, 100)
                .with_account_entry(1, 250)
                .with_account_entry(2, 999),
        ))
        .unwrap();
        assert_eq!(rows.balances.len(), 2);
        let first = &rows.balances[0];
        let second = &rows.balances[1];
        assert_ne!(first.account_id, second.account_id);
        let updated = rows
            .balances
            .iter()
            .find(|row| row.balance == 250)
            .expect("second write should win");
        assert_eq!(updated.ledger_sequence, 50);
    }

    #[test]
    fn defaults_are_zero_without_extensions() {
        let rows = extract(&decode(LedgerBuilder::new(51).with_account_entry(3, 42))).unwrap();
        let row = &rows.balances[0];
        assert_eq!(row.buying_liabilities, 0);
        assert_eq!(row.selling_liabilities, 0);
        assert_eq!(row.num_sponsored, 0);
        assert_eq!(row.num_sponsoring, 0);
        assert_eq!(row.ledger_range, 0);
    }

    #[test]
    fn removed_entries_do_not_emit_rows() {
        let rows = extract(&decode(LedgerBuilder::new(52).with_removed_account(4))).unwrap();
        assert!(rows.balances.is_empty());
    }
}
