//! Canonical string forms for assets, accounts and other XDR identifiers.

use stellar_xdr::curr::{
    AccountId, Asset, AssetCode, ChangeTrustAsset, ClaimableBalanceId, MuxedAccount, PublicKey,
    SignerKey,
};

/// The three columns every asset-bearing operation field expands into.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssetColumns {
    pub asset_type: Option<String>,
    pub code: Option<String>,
    pub issuer: Option<String>,
}

/// Canonicalizes an asset as `native`, `credit_alphanum4/CODE/ISSUER` or
/// `credit_alphanum12/CODE/ISSUER`, split over parallel columns.
pub fn canonical(asset: &Asset) -> AssetColumns {
    match asset {
        Asset::Native => AssetColumns {
            asset_type: Some("native".into()),
            code: None,
            issuer: None,
        },
        Asset::CreditAlphanum4(a) => AssetColumns {
            asset_type: Some("credit_alphanum4".into()),
            code: Some(code_string(&a.asset_code.0)),
            issuer: Some(account_id_string(&a.issuer)),
        },
        Asset::CreditAlphanum12(a) => AssetColumns {
            asset_type: Some("credit_alphanum12".into()),
            code: Some(code_string(&a.asset_code.0)),
            issuer: Some(account_id_string(&a.issuer)),
        },
    }
}

/// Change-trust lines additionally cover liquidity pool shares.
pub fn canonical_change_trust(asset: &ChangeTrustAsset) -> AssetColumns {
    match asset {
        ChangeTrustAsset::Native => canonical(&Asset::Native),
        ChangeTrustAsset::CreditAlphanum4(a) => {
            canonical(&Asset::CreditAlphanum4(a.clone()))
        }
        ChangeTrustAsset::CreditAlphanum12(a) => {
            canonical(&Asset::CreditAlphanum12(a.clone()))
        }
        ChangeTrustAsset::PoolShare(_) => AssetColumns {
            asset_type: Some("liquidity_pool_shares".into()),
            code: None,
            issuer: None,
        },
    }
}

/// Bare asset codes (allow-trust) carry no issuer of their own.
pub fn canonical_code(code: &AssetCode) -> AssetColumns {
    match code {
        AssetCode::CreditAlphanum4(c) => AssetColumns {
            asset_type: Some("credit_alphanum4".into()),
            code: Some(code_string(&c.0)),
            issuer: None,
        },
        AssetCode::CreditAlphanum12(c) => AssetColumns {
            asset_type: Some("credit_alphanum12".into()),
            code: Some(code_string(&c.0)),
            issuer: None,
        },
    }
}

fn code_string(bytes: &[u8]) -> String {
    let trimmed: Vec<u8> = bytes.iter().copied().take_while(|b| *b != 0).collect();
    String::from_utf8_lossy(&trimmed).into_owned()
}

pub fn account_id_string(id: &AccountId) -> String {
    let PublicKey::PublicKeyTypeEd25519(key) = &id.0;
    stellar_strkey::ed25519::PublicKey(key.0).to_string()
}

/// Splits a muxed account into its underlying address plus the muxed alias
/// and id when the variant tag carries them.
pub fn muxed_account_strings(account: &MuxedAccount) -> (String, Option<String>, Option<u64>) {
    match account {
        MuxedAccount::Ed25519(key) => {
            (stellar_strkey::ed25519::PublicKey(key.0).to_string(), None, None)
        }
        MuxedAccount::MuxedEd25519(m) => {
            let base = stellar_strkey::ed25519::PublicKey(m.ed25519.0).to_string();
            let muxed = stellar_strkey::ed25519::MuxedAccount {
                ed25519: m.ed25519.0,
                id: m.id,
            }
            .to_string();
            (base, Some(muxed), Some(m.id))
        }
    }
}

pub fn claimable_balance_id_hex(id: &ClaimableBalanceId) -> String {
    let ClaimableBalanceId::ClaimableBalanceIdTypeV0(hash) = id;
    hex::encode(hash.0)
}

pub fn signer_key_string(key: &SignerKey) -> String {
    match key {
        SignerKey::Ed25519(k) => stellar_strkey::ed25519::PublicKey(k.0).to_string(),
        SignerKey::PreAuthTx(k) => format!("pre_auth_tx:{}", hex::encode(k.0)),
        SignerKey::HashX(k) => format!("hash_x:{}", hex::encode(k.0)),
        SignerKey::Ed25519SignedPayload(p) => format!(
            "signed_payload:{}:{}",
            stellar_strkey::ed25519::PublicKey(p.ed25519.0),
            hex::encode(p.payload.as_slice())
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stellar_xdr::curr::{AlphaNum4, AssetCode4, Uint256};

    fn issuer() -> AccountId {
        AccountId(PublicKey::PublicKeyTypeEd25519(Uint256([7; 32])))
    }

    #[test]
    fn native_has_no_code_or_issuer() {
        let columns = canonical(&Asset::Native);
        assert_eq!(columns.asset_type.as_deref(), Some("native"));
        assert_eq!(columns.code, None);
        assert_eq!(columns.issuer, None);
    }

    #[test]
    fn alphanum4_code_is_zero_trimmed() {
        let columns = canonical(&Asset::CreditAlphanum4(AlphaNum4 {
            asset_code: AssetCode4(*b"USD\0"),
            issuer: issuer(),
        }));
        assert_eq!(columns.asset_type.as_deref(), Some("credit_alphanum4"));
        assert_eq!(columns.code.as_deref(), Some("USD"));
        assert!(columns.issuer.unwrap().starts_with('G'));
    }

    #[test]
    fn muxed_account_splits_into_alias_and_id() {
        let plain = MuxedAccount::Ed25519(Uint256([9; 32]));
        let (base, alias, id) = muxed_account_strings(&plain);
        assert!(base.starts_with('G'));
        assert_eq!(alias, None);
        assert_eq!(id, None);

        let muxed = MuxedAccount::MuxedEd25519(stellar_xdr::curr::MuxedAccountMed25519 {
            id: 515,
            ed25519: Uint256([9; 32]),
        });
        let (base2, alias, id) = muxed_account_strings(&muxed);
        assert_eq!(base, base2);
        assert!(alias.unwrap().starts_with('M'));
        assert_eq!(id, Some(515));
    }
}
