use std::time::Duration;

/// Ledgers buffered per worker before a size-triggered flush.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Wall-clock bound between two flushes of the same worker.
pub const DEFAULT_COMMIT_INTERVAL: Duration = Duration::from_secs(30);

/// Rows per multi-row INSERT statement. 200 keeps one statement inside the
/// per-statement deadline on ~60-column tables; larger chunks have shown
/// pathological planner behavior.
pub const DEFAULT_INSERT_CHUNK_SIZE: usize = 200;

/// Total silence budget on the upstream stream before the worker gives up.
/// Must exceed the slowest observed flush so a long INSERT on our side is not
/// misread as an upstream stall.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(900);

/// Granularity of the non-blocking receive loop; also bounds how quickly a
/// worker notices cancellation while idle.
pub const RECEIVE_TICK: Duration = Duration::from_secs(5);

/// Hard deadline for the final flush on the shutdown path.
pub const SHUTDOWN_FLUSH_DEADLINE: Duration = Duration::from_secs(30);

/// Per-chunk INSERT deadlines, per table.
pub const LEDGERS_INSERT_DEADLINE: Duration = Duration::from_secs(180);
pub const TRANSACTIONS_INSERT_DEADLINE: Duration = Duration::from_secs(60);
pub const OPERATIONS_INSERT_DEADLINE: Duration = Duration::from_secs(180);
pub const BALANCES_INSERT_DEADLINE: Duration = Duration::from_secs(180);

/// Deadline for metadata-plane INSERTs (lineage, quality, registry).
pub const METADATA_INSERT_DEADLINE: Duration = Duration::from_secs(60);

pub const DEFAULT_CATALOG_NAME: &str = "lake";
pub const DEFAULT_SCHEMA_NAME: &str = "ledger_data";
pub const DEFAULT_METADATA_SCHEMA: &str = "meta";

/// Version stamped into lineage rows.
pub const PIPELINE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const PROCESSOR_NAME: &str = "lumenlake-ingester";
