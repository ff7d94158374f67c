mod metadata;
mod query;
mod rows;

pub use self::{
    metadata::{DatasetRecord, DatasetTier, LineageRecord, QualityRecord, SchemaChangeRecord},
    query::{BalanceFilter, OperationFilter, SortBy, SortOrder},
    rows::{partition_for, BalanceRow, LedgerRow, OperationRow, TransactionRow, PARTITION_SPAN},
};
