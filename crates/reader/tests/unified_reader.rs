//! End-to-end tests for the hot/cold unified reader: real attached stores,
//! real merge-and-dedupe SQL, cursor pagination over frozen data.

use duckdb::Connection;
use tempfile::TempDir;

use lumenlake_config::{LakehouseConfig, ReaderConfig};
use lumenlake_core::lakehouse::{build_insert_sql, schema, Lakehouse, Table};
use lumenlake_reader::{CursorError, ReaderError, UnifiedReader};
use lumenlake_types::{
    partition_for, BalanceFilter, BalanceRow, OperationFilter, OperationRow, SortBy, SortOrder,
};

struct Fixture {
    _dir: TempDir,
    lakehouse: LakehouseConfig,
    reader: ReaderConfig,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let cold_path = dir.path().join("cold.duckdb").display().to_string();
    let hot_path = dir.path().join("hot.duckdb").display().to_string();
    let lakehouse = LakehouseConfig {
        catalog_path: cold_path,
        data_path: None,
        catalog_name: "lake".to_string(),
        schema_name: "ledger_data".to_string(),
        metadata_schema: "meta".to_string(),
        batch_size: 100,
        commit_interval_seconds: 30,
        insert_chunk_size: 200,
        num_workers: 1,
        credentials: None,
    };
    // The cold store gets its schema the same way the ingester creates it.
    drop(Lakehouse::connect(&lakehouse).unwrap());
    // The hot store is a plain row-store with the same table shapes.
    let hot = Connection::open(&hot_path).unwrap();
    hot.execute_batch(&Table::Balances.create_sql(Table::Balances.name()))
        .unwrap();
    hot.execute_batch(&Table::Operations.create_sql(Table::Operations.name()))
        .unwrap();
    drop(hot);
    Fixture {
        _dir: dir,
        lakehouse,
        reader: ReaderConfig {
            hot_path,
            hot_schema: "main".to_string(),
        },
    }
}

fn balance(account: &str, sequence: u32, amount: i64) -> BalanceRow {
    BalanceRow {
        account_id: account.to_string(),
        ledger_sequence: sequence,
        balance: amount,
        buying_liabilities: 0,
        selling_liabilities: 0,
        num_subentries: 0,
        num_sponsored: 0,
        num_sponsoring: 0,
        sequence_number: 7,
        flags: 0,
        ledger_range: partition_for(sequence),
    }
}

fn operation(sequence: u32, index: u32, source: &str, kind: &str) -> OperationRow {
    OperationRow {
        ledger_sequence: sequence,
        transaction_hash: format!("{sequence:08x}{:056}", 0),
        operation_index: index,
        operation_type: kind.to_string(),
        transaction_successful: true,
        source_account: Some(source.to_string()),
        ledger_range: partition_for(sequence),
        ..OperationRow::default()
    }
}

fn write_hot_balances(fixture: &Fixture, rows: &[BalanceRow]) {
    let conn = Connection::open(&fixture.reader.hot_path).unwrap();
    for row in rows {
        let sql = build_insert_sql(Table::Balances.name(), Table::Balances.columns(), 1);
        conn.execute(&sql, duckdb::params_from_iter(schema::balance_values(row)))
            .unwrap();
    }
}

fn write_hot_operations(fixture: &Fixture, rows: &[OperationRow]) {
    let conn = Connection::open(&fixture.reader.hot_path).unwrap();
    for row in rows {
        let sql = build_insert_sql(Table::Operations.name(), Table::Operations.columns(), 1);
        conn.execute(&sql, duckdb::params_from_iter(schema::operation_values(row)))
            .unwrap();
    }
}

async fn write_cold_balances(fixture: &Fixture, rows: Vec<BalanceRow>) {
    let lakehouse = Lakehouse::connect(&fixture.lakehouse).unwrap();
    let values = rows.iter().map(schema::balance_values).collect();
    lakehouse
        .insert_chunk(Table::Balances, values, std::time::Duration::from_secs(30))
        .await
        .unwrap();
}

async fn write_cold_operations(fixture: &Fixture, rows: Vec<OperationRow>) {
    let lakehouse = Lakehouse::connect(&fixture.lakehouse).unwrap();
    let values = rows.iter().map(schema::operation_values).collect();
    lakehouse
        .insert_chunk(Table::Operations, values, std::time::Duration::from_secs(30))
        .await
        .unwrap();
}

#[tokio::test]
async fn current_balance_prefers_newer_and_hot() {
    let fixture = fixture();
    write_cold_balances(
        &fixture,
        vec![balance("GALICE", 10, 1_000), balance("GBOB", 10, 5)],
    )
    .await;
    write_hot_balances(
        &fixture,
        &[balance("GALICE", 20, 2_000), balance("GBOB", 10, 99)],
    );

    let reader = UnifiedReader::connect(&fixture.lakehouse, &fixture.reader).unwrap();
    // Newer ledger wins across stores.
    let alice = reader.get_current("GALICE").unwrap().unwrap();
    assert_eq!(alice.last_modified_ledger, 20);
    assert_eq!(alice.balance, 2_000);
    // Same ledger in both stores: the hot copy wins.
    let bob = reader.get_current("GBOB").unwrap().unwrap();
    assert_eq!(bob.balance, 99);
    // Unknown account yields nothing.
    assert!(reader.get_current("GNOBODY").unwrap().is_none());
}

#[tokio::test]
async fn cold_only_accounts_are_still_served()
{
    let fixture = fixture();
    write_cold_balances(&fixture, vec![balance("GCOLD", 42, 7)]).await;
    let reader = UnifiedReader::connect(&fixture.lakehouse, &fixture.reader).unwrap();
    let row = reader.get_current("GCOLD").unwrap().unwrap();
    assert_eq!(row.last_modified_ledger, 42);
    assert_eq!(row.balance, 7);
}

#[tokio::test]
async fn history_merges_descending_with_hot_winning_overlap() {
    let fixture = fixture();
    write_cold_balances(
        &fixture,
        vec![balance("GALICE", 10, 100), balance("GALICE", 20, 200)],
    )
    .await;
    write_hot_balances(
        &fixture,
        &[balance("GALICE", 20, 222), balance("GALICE", 30, 300)],
    );
    let reader = UnifiedReader::connect(&fixture.lakehouse, &fixture.reader).unwrap();

    let first = reader.get_history("GALICE", 2, None).unwrap();
    assert_eq!(
        first
            .records
            .iter()
            .map(|row| (row.last_modified_ledger, row.balance))
            .collect::<Vec<_>>(),
        vec![(30, 300), (20, 222)]
    );
    let cursor = first.next_cursor.expect("one more snapshot remains");

    let second = reader.get_history("GALICE", 2, Some(&cursor)).unwrap();
    assert_eq!(
        second
            .records
            .iter()
            .map(|row| row.last_modified_ledger)
            .collect::<Vec<_>>(),
        vec![10]
    );
    assert!(second.next_cursor.is_none());
}

#[tokio::test]
async fn list_pages_are_disjoint_in_order_and_exhaustive() {
    let fixture = fixture();
    write_cold_balances(
        &fixture,
        vec![
            balance("GAAA", 10, 100),
            balance("GBBB", 10, 200),
            balance("GCCC", 10, 300),
            balance("GDDD", 10, 400),
        ],
    )
    .await;
    write_hot_balances(
        &fixture,
        &[
            // GAAA also lives in hot with a newer snapshot: only that copy
            // may appear in the listing.
            balance("GAAA", 20, 150),
            balance("GEEE", 20, 500),
            balance("GFFF", 20, 600),
            balance("GGGG", 20, 700),
        ],
    );
    let reader = UnifiedReader::connect(&fixture.lakehouse, &fixture.reader).unwrap();

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0;
    loop {
        let page = reader
            .list(
                &BalanceFilter::default(),
                SortBy::Balance,
                SortOrder::Desc,
                3,
                cursor.as_deref(),
            )
            .unwrap();
        pages += 1;
        seen.extend(page.records.iter().map(|row| row.balance));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    assert_eq!(pages, 3);
    assert_eq!(seen, vec![700, 600, 500, 400, 300, 200, 150]);
}

#[tokio::test]
async fn list_cursor_replay_with_changed_sort_is_a_client_error() {
    let fixture = fixture();
    write_hot_balances(
        &fixture,
        &[
            balance("GAAA", 20, 100),
            balance("GBBB", 20, 200),
            balance("GCCC", 20, 300),
        ],
    );
    let reader = UnifiedReader::connect(&fixture.lakehouse, &fixture.reader).unwrap();
    let page = reader
        .list(
            &BalanceFilter::default(),
            SortBy::Balance,
            SortOrder::Desc,
            2,
            None,
        )
        .unwrap();
    let cursor = page.next_cursor.unwrap();
    let err = reader
        .list(
            &BalanceFilter::default(),
            SortBy::LastModifiedLedger,
            SortOrder::Desc,
            2,
            Some(&cursor),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ReaderError::Cursor(CursorError::SortMismatch { .. })
    ));
}

#[tokio::test]
async fn malformed_cursor_is_rejected() {
    let fixture = fixture();
    let reader = UnifiedReader::connect(&fixture.lakehouse, &fixture.reader).unwrap();
    let err = reader.get_history("GALICE", 5, Some("@@not-base64@@")).unwrap_err();
    assert!(matches!(
        err,
        ReaderError::Cursor(CursorError::InvalidCursor)
    ));
}

#[tokio::test]
async fn operations_filter_order_and_paginate() {
    let fixture = fixture();
    write_cold_operations(
        &fixture,
        vec![
            operation(100, 0, "GALICE", "payment"),
            operation(100, 1, "GALICE", "manage_data"),
            operation(101, 0, "GBOB", "payment"),
        ],
    )
    .await;
    write_hot_operations(
        &fixture,
        &[
            // Overlaps with the cold copy of (100, 0): must not double-count.
            operation(100, 0, "GALICE", "payment"),
            operation(102, 0, "GALICE", "invoke_host_function"),
        ],
    );
    let reader = UnifiedReader::connect(&fixture.lakehouse, &fixture.reader).unwrap();

    let all = reader
        .get_operations(&OperationFilter::default(), 10, None)
        .unwrap();
    assert_eq!(
        all.records
            .iter()
            .map(|op| (op.ledger_sequence, op.operation_index))
            .collect::<Vec<_>>(),
        vec![(102, 0), (101, 0), (100, 1), (100, 0)]
    );
    assert!(all.next_cursor.is_none());

    let alice_payments = reader
        .get_operations(
            &OperationFilter {
                account: Some("GALICE".to_string()),
                payments_only: true,
                ..OperationFilter::default()
            },
            10,
            None,
        )
        .unwrap();
    assert_eq!(alice_payments.records.len(), 1);
    assert_eq!(alice_payments.records[0].ledger_sequence, 100);

    // Page through everything two at a time.
    let first = reader
        .get_operations(&OperationFilter::default(), 2, None)
        .unwrap();
    assert_eq!(first.records.len(), 2);
    let cursor = first.next_cursor.unwrap();
    let second = reader
        .get_operations(&OperationFilter::default(), 2, Some(&cursor))
        .unwrap();
    assert_eq!(
        second
            .records
            .iter()
            .map(|op| (op.ledger_sequence, op.operation_index))
            .collect::<Vec<_>>(),
        vec![(100, 1), (100, 0)]
    );
    assert!(second.next_cursor.is_none());
}

#[tokio::test]
async fn ledger_range_filter_restricts_results() {
    let fixture = fixture();
    write_cold_operations(
        &fixture,
        vec![
            operation(100, 0, "GALICE", "payment"),
            operation(150, 0, "GALICE", "payment"),
            operation(200, 0, "GALICE", "payment"),
        ],
    )
    .await;
    let reader = UnifiedReader::connect(&fixture.lakehouse, &fixture.reader).unwrap();
    let page = reader
        .get_operations(
            &OperationFilter {
                ledger_start: Some(120),
                ledger_end: Some(180),
                ..OperationFilter::default()
            },
            10,
            None,
        )
        .unwrap();
    assert_eq!(page.records.len(), 1);
    assert_eq!(page.records[0].ledger_sequence, 150);
}
