use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sort dimension for balance listings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Balance,
    LastModifiedLedger,
    AccountId,
}

impl SortBy {
    /// Stable wire name, used inside cursors and as the SQL sort column.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Balance => "balance",
            SortBy::LastModifiedLedger => "last_modified_ledger",
            SortBy::AccountId => "account_id",
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "balance" => Ok(SortBy::Balance),
            "last_modified_ledger" => Ok(SortBy::LastModifiedLedger),
            "account_id" => Ok(SortBy::AccountId),
            other => Err(format!("unknown sort dimension `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order `{other}`")),
        }
    }
}

/// Filters for the aggregate balance listing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceFilter {
    /// Inclusive lower bound on the native balance.
    pub min_balance: Option<i64>,
    /// Inclusive upper bound on the native balance.
    pub max_balance: Option<i64>,
    /// Only accounts last modified at or after this ledger.
    pub modified_since_ledger: Option<u32>,
}

/// Filters for the merged operations listing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationFilter {
    /// Operation (or transaction) source account.
    pub account: Option<String>,
    /// Exact transaction hash, hex-encoded.
    pub transaction_hash: Option<String>,
    /// Inclusive ledger sequence range.
    pub ledger_start: Option<u32>,
    pub ledger_end: Option<u32>,
    /// Restrict to payment-class operations.
    pub payments_only: bool,
    /// Restrict to Soroban host-function operations.
    pub soroban_only: bool,
}

impl OperationFilter {
    /// Operation types covered by the payments category flag.
    pub const PAYMENT_TYPES: &'static [&'static str] = &[
        "create_account",
        "payment",
        "path_payment_strict_receive",
        "path_payment_strict_send",
        "account_merge",
    ];

    /// Operation types covered by the Soroban category flag.
    pub const SOROBAN_TYPES: &'static [&'static str] = &[
        "invoke_host_function",
        "extend_footprint_ttl",
        "restore_footprint",
    ];
}
