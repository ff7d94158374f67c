use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use stellar_xdr::curr::{HostFunction, LedgerKey, OperationBody, RevokeSponsorshipOp};

use super::asset::{
    account_id_string, canonical, canonical_change_trust, canonical_code,
    claimable_balance_id_hex, muxed_account_strings, signer_key_string, AssetColumns,
};
use crate::ledger::{LedgerEnvelope, TxView};
use lumenlake_types::{partition_for, OperationRow};

/// Appends one row per operation of `tx`. This switch is the only place
/// operation kinds branch; every arm writes exactly the columns relevant to
/// its kind and leaves the rest null.
pub(super) fn extract_operations(
    envelope: &LedgerEnvelope,
    tx: &TxView<'_>,
    out: &mut Vec<OperationRow>,
) {
    let sequence = envelope.sequence();
    let tx_hash = hex::encode(tx.hash);
    let (tx_source, tx_source_muxed, _) = tx_source_strings(tx);

    for (index, op) in tx.operations().iter().enumerate() {
        let mut row = OperationRow {
            ledger_sequence: sequence,
            transaction_hash: tx_hash.clone(),
            operation_index: index as u32,
            operation_type: operation_type_name(&op.body).to_string(),
            transaction_successful: tx.successful(),
            closed_at: envelope.closed_at(),
            ledger_range: partition_for(sequence),
            ..OperationRow::default()
        };
        match &op.source_account {
            Some(source) => {
                let (account, muxed, _) = muxed_account_strings(source);
                row.source_account = Some(account);
                row.source_account_muxed = muxed;
            }
            None => {
                row.source_account = Some(tx_source.clone());
                row.source_account_muxed = tx_source_muxed.clone();
            }
        }

        match &op.body {
            OperationBody::CreateAccount(op) => {
                row.destination = Some(account_id_string(&op.destination));
                row.starting_balance = Some(op.starting_balance);
            }
            OperationBody::Payment(op) => {
                row.destination = Some(muxed_account_strings(&op.destination).0);
                apply_asset(&mut row, canonical(&op.asset));
                row.amount = Some(op.amount);
            }
            OperationBody::PathPaymentStrictReceive(op) => {
                row.destination = Some(muxed_account_strings(&op.destination).0);
                apply_send_asset(&mut row, canonical(&op.send_asset));
                row.send_max = Some(op.send_max);
                apply_dest_asset(&mut row, canonical(&op.dest_asset));
                row.amount = Some(op.dest_amount);
                row.path_length = Some(op.path.len() as u32);
            }
            OperationBody::PathPaymentStrictSend(op) => {
                row.destination = Some(muxed_account_strings(&op.destination).0);
                apply_send_asset(&mut row, canonical(&op.send_asset));
                row.send_amount = Some(op.send_amount);
                apply_dest_asset(&mut row, canonical(&op.dest_asset));
                row.dest_min = Some(op.dest_min);
                row.path_length = Some(op.path.len() as u32);
            }
            OperationBody::ManageSellOffer(op) => {
                apply_selling_buying(&mut row, canonical(&op.selling), canonical(&op.buying));
                row.amount = Some(op.amount);
                apply_price(&mut row, &op.price);
                row.offer_id = Some(op.offer_id);
            }
            OperationBody::ManageBuyOffer(op) => {
                apply_selling_buying(&mut row, canonical(&op.selling), canonical(&op.buying));
                row.amount = Some(op.buy_amount);
                apply_price(&mut row, &op.price);
                row.offer_id = Some(op.offer_id);
            }
            OperationBody::CreatePassiveSellOffer(op) => {
                apply_selling_buying(&mut row, canonical(&op.selling), canonical(&op.buying));
                row.amount = Some(op.amount);
                apply_price(&mut row, &op.price);
            }
            OperationBody::SetOptions(op) => {
                row.inflation_dest = op.inflation_dest.as_ref().map(account_id_string);
                row.clear_flags = op.clear_flags;
                row.set_flags = op.set_flags;
                row.master_weight = op.master_weight;
                row.low_threshold = op.low_threshold;
                row.med_threshold = op.med_threshold;
                row.high_threshold = op.high_threshold;
                row.home_domain = op
                    .home_domain
                    .as_ref()
                    .map(|domain| domain.to_utf8_string_lossy());
                if let Some(signer) = &op.signer {
                    row.signer_key = Some(signer_key_string(&signer.key));
                    row.signer_weight = Some(signer.weight);
                }
            }
            OperationBody::ChangeTrust(op) => {
                apply_asset(&mut row, canonical_change_trust(&op.line));
                row.trustline_limit = Some(op.limit);
            }
            OperationBody::AllowTrust(op) => {
                row.trustor = Some(account_id_string(&op.trustor));
                apply_asset(&mut row, canonical_code(&op.asset));
                row.set_flags = Some(op.authorize);
            }
            OperationBody::AccountMerge(destination) => {
                row.destination = Some(muxed_account_strings(destination).0);
            }
            OperationBody::Inflation => {}
            OperationBody::ManageData(op) => {
                row.data_name = Some(op.data_name.to_utf8_string_lossy());
                row.data_value = op
                    .data_value
                    .as_ref()
                    .map(|value| BASE64.encode(value.as_slice()));
            }
            OperationBody::BumpSequence(op) => {
                row.bump_to = Some(op.bump_to.0);
            }
            OperationBody::CreateClaimableBalance(op) => {
                apply_asset(&mut row, canonical(&op.asset));
                row.amount = Some(op.amount);
                row.claimant_count = Some(op.claimants.len() as u32);
            }
            OperationBody::ClaimClaimableBalance(op) => {
                row.balance_id = Some(claimable_balance_id_hex(&op.balance_id));
            }
            OperationBody::BeginSponsoringFutureReserves(op) => {
                row.sponsored_id = Some(account_id_string(&op.sponsored_id));
            }
            OperationBody::EndSponsoringFutureReserves => {}
            OperationBody::RevokeSponsorship(op) => match op {
                RevokeSponsorshipOp::LedgerEntry(key) => {
                    if let LedgerKey::Account(account) = key {
                        row.destination = Some(account_id_string(&account.account_id));
                    }
                }
                RevokeSponsorshipOp::Signer(signer) => {
                    row.destination = Some(account_id_string(&signer.account_id));
                    row.signer_key = Some(signer_key_string(&signer.signer_key));
                }
            },
            OperationBody::Clawback(op) => {
                apply_asset(&mut row, canonical(&op.asset));
                row.from_account = Some(muxed_account_strings(&op.from).0);
                row.amount = Some(op.amount);
            }
            OperationBody::ClawbackClaimableBalance(op) => {
                row.balance_id = Some(claimable_balance_id_hex(&op.balance_id));
            }
            OperationBody::SetTrustLineFlags(op) => {
                row.trustor = Some(account_id_string(&op.trustor));
                apply_asset(&mut row, canonical(&op.asset));
                row.clear_flags = Some(op.clear_flags);
                row.set_flags = Some(op.set_flags);
            }
            OperationBody::LiquidityPoolDeposit(op) => {
                row.liquidity_pool_id = Some(hex::encode(op.liquidity_pool_id.0 .0));
                row.amount = Some(op.max_amount_a);
            }
            OperationBody::LiquidityPoolWithdraw(op) => {
                row.liquidity_pool_id = Some(hex::encode(op.liquidity_pool_id.0 .0));
                row.amount = Some(op.amount);
            }
            OperationBody::InvokeHostFunction(op) => {
                row.host_function_type = Some(host_function_type(&op.host_function).to_string());
                row.auth_entry_count = Some(op.auth.len() as u32);
            }
            OperationBody::ExtendFootprintTtl(op) => {
                row.extend_to = Some(op.extend_to);
            }
            OperationBody::RestoreFootprint(_) => {}
        }
        out.push(row);
    }
}

fn tx_source_strings(tx: &TxView<'_>) -> (String, Option<String>, Option<u64>) {
    use stellar_xdr::curr::{FeeBumpTransactionInnerTx, TransactionEnvelope};
    match tx.envelope {
        TransactionEnvelope::TxV0(e) => (
            stellar_strkey::ed25519::PublicKey(e.tx.source_account_ed25519.0).to_string(),
            None,
            None,
        ),
        TransactionEnvelope::Tx(e) => muxed_account_strings(&e.tx.source_account),
        TransactionEnvelope::TxFeeBump(e) => {
            let FeeBumpTransactionInnerTx::Tx(inner) = &e.tx.inner_tx;
            muxed_account_strings(&inner.tx.source_account)
        }
    }
}

fn apply_asset(row: &mut OperationRow, asset: AssetColumns) {
    row.asset_type = asset.asset_type;
    row.asset_code = asset.code;
    row.asset_issuer = asset.issuer;
}

fn apply_send_asset(row: &mut OperationRow, asset: AssetColumns) {
    row.send_asset_type = asset.asset_type;
    row.send_asset_code = asset.code;
    row.send_asset_issuer = asset.issuer;
}

fn apply_dest_asset(row: &mut OperationRow, asset: AssetColumns) {
    row.dest_asset_type = asset.asset_type;
    row.dest_asset_code = asset.code;
    row.dest_asset_issuer = asset.issuer;
}

fn apply_price(row: &mut OperationRow, price: &stellar_xdr::curr::Price) {
    row.price_n = Some(price.n);
    row.price_d = Some(price.d);
    if price.d != 0 {
        row.price = Some(f64::from(price.n) / f64::from(price.d));
    }
}

fn apply_selling_buying(row: &mut OperationRow, selling: AssetColumns, buying: AssetColumns) {
    row.selling_asset_type = selling.asset_type;
    row.selling_asset_code = selling.code;
    row.selling_asset_issuer = selling.issuer;
    row.buying_asset_type = buying.asset_type;
    row.buying_asset_code = buying.code;
    row.buying_asset_issuer = buying.issuer;
}

fn operation_type_name(body: &OperationBody) -> &'static str {
    match body {
        OperationBody::CreateAccount(_) => "create_account",
        OperationBody::Payment(_) => "payment",
        OperationBody::PathPaymentStrictReceive(_) => "path_payment_strict_receive",
        OperationBody::ManageSellOffer(_) => "manage_sell_offer",
        OperationBody::CreatePassiveSellOffer(_) => "create_passive_sell_offer",
        OperationBody::SetOptions(_) => "set_options",
        OperationBody::ChangeTrust(_) => "change_trust",
        OperationBody::AllowTrust(_) => "allow_trust",
        OperationBody::AccountMerge(_) => "account_merge",
        OperationBody::Inflation => "inflation",
        OperationBody::ManageData(_) => "manage_data",
        OperationBody::BumpSequence(_) => "bump_sequence",
        OperationBody::ManageBuyOffer(_) => "manage_buy_offer",
        OperationBody::PathPaymentStrictSend(_) => "path_payment_strict_send",
        OperationBody::CreateClaimableBalance(_) => "create_claimable_balance",
        OperationBody::ClaimClaimableBalance(_) => "claim_claimable_balance",
        OperationBody::BeginSponsoringFutureReserves(_) => "begin_sponsoring_future_reserves",
        OperationBody::EndSponsoringFutureReserves => "end_sponsoring_future_reserves",
        OperationBody::RevokeSponsorship(_) => "revoke_sponsorship",
        OperationBody::Clawback(_) => "clawback",
        OperationBody::ClawbackClaimableBalance(_) => "clawback_claimable_balance",
        OperationBody::SetTrustLineFlags(_) => "set_trustline_flags",
        OperationBody::LiquidityPoolDeposit(_) => "liquidity_pool_deposit",
        OperationBody::LiquidityPoolWithdraw(_) => "liquidity_pool_withdraw",
        OperationBody::InvokeHostFunction(_) => "invoke_host_function",
        OperationBody::ExtendFootprintTtl(_) => "extend_footprint_ttl",
        OperationBody::RestoreFootprint(_) => "restore_footprint",
    }
}

fn host_function_type(function: &HostFunction) -> &'static str {
    match function {
        HostFunction::InvokeContract(_) => "invoke_contract",
        HostFunction::CreateContract(_) => "create_contract",
        HostFunction::UploadContractWasm(_) => "upload_wasm",
        HostFunction::CreateContractV2(_) => "create_contract_v2",
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
    fn payment_populates_asset_and_amount() {
        let rows = extract(&decode(LedgerBuilder::new(20).with_payment_tx(1, true))).unwrap();
        let op = &rows.operations[0];
        assert_eq!(op.operation_type, "payment");
        assert_eq!(op.asset_type.as_deref(), Some("native"));
        assert_eq!(op.amount, Some(testing::PAYMENT_AMOUNT));
        assert!(op.destination.as_deref().unwrap().starts_with('G'));
        // Kind-specific columns of other kinds stay null.
        assert_eq!(op.offer_id, None);
        assert_eq!(op.data_name, None);
        assert_eq!(op.host_function_type, None);
    }

    #[test]
    fn mixed_kind_transaction_fills_disjoint_columns() {
        let rows = extract(&decode(LedgerBuilder::new(21).with_multi_op_tx(3))).unwrap();
        assert_eq!(rows.operations.len(), 3);
        let by_type: Vec<&str> = rows
            .operations
            .iter()
            .map(|op| op.operation_type.as_str())
            .collect();
        assert_eq!(
            by_type,
            vec!["create_account", "payment", "manage_data"]
        );
        assert_eq!(rows.operations[0].starting_balance, Some(testing::STARTING_BALANCE));
        assert_eq!(rows.operations[2].data_name.as_deref(), Some("config"));
        assert_eq!(rows.operations[2].amount, None);
    }

    #[test]
    fn operation_source_falls_back_to_transaction_source() {
        let rows = extract(&decode(LedgerBuilder::new(22).with_payment_tx(1, true))).unwrap();
        let op = &rows.operations[0];
        let tx = &rows.transactions[0];
        assert_eq!(op.source_account.as_deref(), Some(tx.source_account.as_str()));
    }
}
