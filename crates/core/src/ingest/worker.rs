use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use super::proto::RawLedger;
use super::source::{LedgerSource, LedgerStream};
use super::IngestTuning;
use crate::error::{EnvelopeError, IngestError};
use crate::extract::{self, ExtractedRows};
use crate::lakehouse::{schema, Lakehouse, Table};
use crate::ledger::{LedgerEnvelope, Network};
use crate::metadata::{time_based_id, MetadataPlane};
use crate::quality;
use lumenlake_config::constants::{PIPELINE_VERSION, PROCESSOR_NAME, SHUTDOWN_FLUSH_DEADLINE};
use lumenlake_types::{LineageRecord, QualityRecord};

/// Inclusive sub-range of ledger sequences owned by one worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedgerRange {
    pub start: u32,
    pub end: u32,
}

/// What tripped a flush; recorded on every lineage row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushTrigger {
    Size,
    Interval,
    EndOfRange,
    EndOfStream,
    Shutdown,
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Size => "size",
            FlushTrigger::Interval => "interval",
            FlushTrigger::EndOfRange => "end_of_range",
            FlushTrigger::EndOfStream => "end_of_stream",
            FlushTrigger::Shutdown => "shutdown",
        }
    }
}

/// Per-worker accumulation of extracted rows between flushes. Rows are owned
/// exclusively by the worker until handed to the flusher; buffers are cleared
/// only after the flush committed.
#[derive(Clone, Debug, Default)]
pub struct RowBuffer {
    pub ledgers: Vec<lumenlake_types::LedgerRow>,
    pub transactions: Vec<lumenlake_types::TransactionRow>,
    pub operations: Vec<lumenlake_types::OperationRow>,
    pub balances: Vec<lumenlake_types::BalanceRow>,
}

impl RowBuffer {
    pub fn push(&mut self, rows: ExtractedRows) {
        self.ledgers.push(rows.ledger);
        self.transactions.extend(rows.transactions);
        self.operations.extend(rows.operations);
        self.balances.extend(rows.balances);
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
            && self.transactions.is_empty()
            && self.operations.is_empty()
            && self.balances.is_empty()
    }

    pub fn clear(&mut self) {
        self.ledgers.clear();
        self.transactions.clear();
        self.operations.clear();
        self.balances.clear();
    }

    fn bounds(&self) -> Option<(u32, u32)> {
        let first = self.ledgers.first()?.sequence;
        let last = self.ledgers.last()?.sequence;
        Some((first, last))
    }
}

/// Outcome of one worker's clean run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerSummary {
    pub worker_id: u32,
    pub ledgers_ingested: u64,
    pub last_sequence: Option<u32>,
}

/// One ingestion worker: consumes its sub-range from the stream, buffers
/// extracted rows and flushes them to the lakehouse.
pub struct IngestWorker {
    id: u32,
    range: LedgerRange,
    network: Network,
    lakehouse: Lakehouse,
    metadata: MetadataPlane,
    tuning: IngestTuning,
    cancel: watch::Receiver<bool>,
    buffer: RowBuffer,
    last_commit: Instant,
    flushed_through: Option<u32>,
    next_expected: u32,
    ledgers_ingested: u64,
}

impl IngestWorker {
    pub fn new(
        id: u32,
        range: LedgerRange,
        network: Network,
        lakehouse: Lakehouse,
        tuning: IngestTuning,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        let metadata = MetadataPlane::new(lakehouse.clone());
        Self {
            id,
            range,
            network,
            lakehouse,
            metadata,
            tuning,
            cancel,
            buffer: RowBuffer::default(),
            last_commit: Instant::now(),
            flushed_through: None,
            next_expected: range.start,
            ledgers_ingested: 0,
        }
    }

    /// Consumes the stream until the sub-range is exhausted, the stream ends,
    /// the watchdog trips or cancellation arrives. Never retries internally;
    /// restarting after an error is the supervisor's call.
    pub async fn run(mut self, source: Arc<dyn LedgerSource>) -> Result<WorkerSummary, IngestError> {
        tracing::info!(
            worker = self.id,
            start = self.range.start,
            end = self.range.end,
            "worker starting"
        );
        let ledgers_table = self.lakehouse.config().qualified(Table::Ledgers.name());
        match self
            .lakehouse
            .max_sequence_between(&ledgers_table, self.range.start, self.range.end)
        {
            Ok(Some(max)) => tracing::warn!(
                worker = self.id,
                highest_existing = max,
                "sub-range overlaps rows from an earlier run; read-path dedup hides duplicates"
            ),
            Ok(None) => {}
            Err(err) => tracing::debug!(worker = self.id, error = %err, "overlap probe failed"),
        }
        let mut stream: LedgerStream = source.stream_from(self.range.start).await?;
        let mut last_received = Instant::now();
        let mut cancel = self.cancel.clone();
        loop {
            if *cancel.borrow() {
                self.shutdown_flush().await;
                return Err(IngestError::Cancelled);
            }
            tokio::select! {
                _ = cancel.changed() => {
                    tracing::info!(worker = self.id, "cancellation received");
                    self.shutdown_flush().await;
                    return Err(IngestError::Cancelled);
                }
                received = tokio::time::timeout(self.tuning.receive_tick, stream.next()) => {
                    match received {
                        Err(_) => {
                            let elapsed = last_received.elapsed();
                            if elapsed >= self.tuning.stream_timeout {
                                tracing::error!(
                                    worker = self.id,
                                    ?elapsed,
                                    "stream stalled, giving up"
                                );
                                self.shutdown_flush().await;
                                return Err(IngestError::StreamStalled {
                                    elapsed,
                                    budget: self.tuning.stream_timeout,
                                });
                            }
                            tracing::debug!(
                                worker = self.id,
                                next_expected = self.next_expected,
                                buffered = self.buffer.ledgers.len(),
                                silent_for = ?elapsed,
                                "waiting for next ledger"
                            );
                        }
                        Ok(None) => {
                            self.flush(FlushTrigger::EndOfStream).await?;
                            tracing::info!(worker = self.id, "stream ended");
                            return Ok(self.summary());
                        }
                        Ok(Some(Err(err))) => {
                            self.shutdown_flush().await;
                            return Err(err);
                        }
                        Ok(Some(Ok(raw))) => {
                            last_received = Instant::now();
                            if raw.sequence > self.range.end {
                                self.flush(FlushTrigger::EndOfRange).await?;
                                tracing::info!(
                                    worker = self.id,
                                    last = self.range.end,
                                    "sub-range complete"
                                );
                                return Ok(self.summary());
                            }
                            if let Err(err) = self.process_ledger(&raw) {
                                // Rows buffered before the bad envelope are
                                // still good; land them before aborting.
                                self.shutdown_flush().await;
                                return Err(err);
                            }
                            self.maybe_flush().await?;
                            if raw.sequence == self.range.end {
                                self.flush(FlushTrigger::EndOfRange).await?;
                                return Ok(self.summary());
                            }
                        }
                    }
                }
            }
        }
    }

    fn summary(&self) -> WorkerSummary {
        WorkerSummary {
            worker_id: self.id,
            ledgers_ingested: self.ledgers_ingested,
            last_sequence: self.flushed_through,
        }
    }

    /// Decodes and extracts one raw ledger into the buffer. Sequences must
    /// form a contiguous, strictly increasing prefix of the sub-range: a gap
    /// means unrecoverable upstream loss.
    fn process_ledger(&mut self, raw: &RawLedger) -> Result<(), IngestError> {
        if raw.sequence != self.next_expected {
            return Err(IngestError::SequenceGap {
                expected: self.next_expected,
                received: raw.sequence,
            });
        }
        let envelope = LedgerEnvelope::decode(&raw.ledger_close_meta_xdr, &self.network)?;
        if envelope.sequence() != raw.sequence {
            return Err(EnvelopeError::InvalidEnvelope(format!(
                "frame sequence {} disagrees with envelope sequence {}",
                raw.sequence,
                envelope.sequence()
            ))
            .into());
        }
        let rows = extract::extract(&envelope)?;
        self.buffer.push(rows);
        self.next_expected = raw.sequence + 1;
        self.ledgers_ingested += 1;
        Ok(())
    }

    /// Flush trigger check, run after every buffered envelope.
    async fn maybe_flush(&mut self) -> Result<(), IngestError> {
        if self.buffer.ledgers.len() >= self.tuning.batch_size {
            self.flush(FlushTrigger::Size).await
        } else if self.last_commit.elapsed() > self.tuning.commit_interval {
            self.flush(FlushTrigger::Interval).await
        } else {
            Ok(())
        }
    }

    /// The flush protocol. Tables are written sequentially in chunked
    /// multi-row INSERTs; cross-table atomicity is deliberately abandoned, so
    /// the first failing chunk aborts the flush and leaves earlier tables
    /// committed. Read-path dedup restores logical consistency.
    async fn flush(&mut self, trigger: FlushTrigger) -> Result<(), IngestError> {
        let Some((start, end)) = self.buffer.bounds() else {
            self.last_commit = Instant::now();
            return Ok(());
        };
        let started = Instant::now();

        let battery = quality::run_battery(&self.buffer, self.flushed_through);
        for check in battery.iter().filter(|check| !check.passed) {
            tracing::warn!(
                worker = self.id,
                check = check.name,
                detail = %check.detail,
                "quality check failed"
            );
        }

        let chunk_size = self.tuning.insert_chunk_size;
        let counts = [
            self.buffer.ledgers.len() as u64,
            self.buffer.transactions.len() as u64,
            self.buffer.operations.len() as u64,
            self.buffer.balances.len() as u64,
        ];
        self.insert_table(
            Table::Ledgers,
            self.buffer.ledgers.iter().map(schema::ledger_values).collect(),
            chunk_size,
        )
        .await?;
        self.insert_table(
            Table::Transactions,
            self.buffer
                .transactions
                .iter()
                .map(schema::transaction_values)
                .collect(),
            chunk_size,
        )
        .await?;
        self.insert_table(
            Table::Operations,
            self.buffer
                .operations
                .iter()
                .map(schema::operation_values)
                .collect(),
            chunk_size,
        )
        .await?;
        self.insert_table(
            Table::Balances,
            self.buffer.balances.iter().map(schema::balance_values).collect(),
            chunk_size,
        )
        .await?;

        let now = Utc::now();
        let lineage: Vec<LineageRecord> = Table::ALL
            .iter()
            .zip(counts)
            .filter(|(_, count)| *count > 0)
            .enumerate()
            .map(|(ordinal, (table, count))| LineageRecord {
                id: time_based_id(ordinal),
                dataset_name: table.name().to_string(),
                source_ledger_start: start,
                source_ledger_end: end,
                pipeline_version: PIPELINE_VERSION.to_string(),
                processor_name: PROCESSOR_NAME.to_string(),
                row_count: count,
                worker_id: self.id,
                trigger: trigger.as_str().to_string(),
                created_at: now,
            })
            .collect();
        self.metadata.append_lineage(lineage).await?;

        let quality_rows: Vec<QualityRecord> = battery
            .into_iter()
            .enumerate()
            .map(|(ordinal, check)| QualityRecord {
                id: time_based_id(ordinal),
                dataset_name: Table::Ledgers.name().to_string(),
                check_name: check.name.to_string(),
                passed: check.passed,
                detail: check.detail,
                ledger_start: start,
                ledger_end: end,
                created_at: now,
            })
            .collect();
        self.metadata.append_quality(quality_rows).await?;

        tracing::info!(
            worker = self.id,
            start,
            end,
            ledgers = counts[0],
            transactions = counts[1],
            operations = counts[2],
            balances = counts[3],
            trigger = trigger.as_str(),
            took = ?started.elapsed(),
            "flushed buffer"
        );
        self.flushed_through = Some(end);
        self.buffer.clear();
        self.last_commit = Instant::now();
        Ok(())
    }

    async fn insert_table(
        &self,
        table: Table,
        rows: Vec<Vec<duckdb::types::Value>>,
        chunk_size: usize,
    ) -> Result<(), IngestError> {
        for chunk in rows.chunks(chunk_size) {
            self.lakehouse
                .insert_chunk(table, chunk.to_vec(), table.insert_deadline())
                .await?;
        }
        Ok(())
    }

    /// Best-effort flush on the shutdown path, bounded by a hard deadline.
    /// Partial flushes are tolerated; the error that triggered shutdown stays
    /// the primary outcome.
    async fn shutdown_flush(&mut self) {
        match tokio::time::timeout(SHUTDOWN_FLUSH_DEADLINE, self.flush(FlushTrigger::Shutdown))
            .await
        {
            Err(_) => tracing::warn!(
                worker = self.id,
                deadline = ?SHUTDOWN_FLUSH_DEADLINE,
                "shutdown flush exceeded its deadline, dropping remaining buffer"
            ),
            Ok(Err(err)) => tracing::warn!(
                worker = self.id,
                error = %err,
                "shutdown flush failed, dropping remaining buffer"
            ),
            Ok(Ok(())) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::source::test_support::{SilentLedgerSource, StaticLedgerSource};
    use crate::lakehouse::Table;
    use crate::testing::{self, test_lakehouse, LedgerBuilder};

    fn raw(sequence: u32) -> RawLedger {
        RawLedger {
            sequence,
            ledger_close_meta_xdr: LedgerBuilder::new(sequence)
                .with_payment_tx((sequence % 200) as u8, true)
                .with_account_entry((sequence % 100) as u8, i64::from(sequence))
                .build_bytes(),
        }
    }

    fn tuning() -> IngestTuning {
        IngestTuning {
            batch_size: 100,
            commit_interval: Duration::from_secs(30),
            insert_chunk_size: 200,
            stream_timeout: Duration::from_secs(900),
            receive_tick: Duration::from_millis(20),
        }
    }

    fn worker(
        range: LedgerRange,
        lakehouse: Lakehouse,
        tuning: IngestTuning,
    ) -> (IngestWorker, watch::Sender<bool>) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let worker = IngestWorker::new(
            0,
            range,
            Network::new(testing::TEST_PASSPHRASE),
            lakehouse,
            tuning,
            cancel_rx,
        );
        (worker, cancel_tx)
    }

    #[tokio::test]
    async fn ingests_whole_range_and_records_metadata() {
        let (_dir, config) = test_lakehouse();
        let lakehouse = Lakehouse::connect(&config).unwrap();
        let source = Arc::new(StaticLedgerSource::new((5000..5100).map(raw).collect()));
        let (worker, _cancel) = worker(
            LedgerRange {
                start: 5000,
                end: 5099,
            },
            lakehouse.clone(),
            tuning(),
        );
        let summary = worker.run(source).await.unwrap();
        assert_eq!(summary.ledgers_ingested, 100);
        assert_eq!(summary.last_sequence, Some(5099));
        assert_eq!(
            lakehouse
                .table_count(&config.qualified(Table::Ledgers.name()))
                .unwrap(),
            100
        );
        // One flush, one lineage row per non-empty dataset, one quality row
        // per check in the battery.
        assert_eq!(
            lakehouse
                .table_count(&config.qualified_meta("_meta_lineage"))
                .unwrap(),
            4
        );
        assert_eq!(
            lakehouse
                .table_count(&config.qualified_meta("_meta_quality"))
                .unwrap(),
            5
        );
    }

    #[tokio::test]
    async fn size_trigger_flushes_before_range_end() {
        let (_dir, config) = test_lakehouse();
        let lakehouse = Lakehouse::connect(&config).unwrap();
        let source = Arc::new(StaticLedgerSource::new((10..16).map(raw).collect()));
        let mut tuning = tuning();
        tuning.batch_size = 2;
        let (worker, _cancel) = worker(LedgerRange { start: 10, end: 15 }, lakehouse.clone(), tuning);
        worker.run(source).await.unwrap();
        // 6 ledgers with batch_size 2: three size-triggered flushes, each
        // appending one lineage row per non-empty dataset.
        let lineage = lakehouse
            .table_count(&config.qualified_meta("_meta_lineage"))
            .unwrap();
        assert_eq!(lineage, 12);
    }

    #[tokio::test]
    async fn stops_cleanly_past_range_end() {
        let (_dir, config) = test_lakehouse();
        let lakehouse = Lakehouse::connect(&config).unwrap();
        // Source keeps going past the worker's end.
        let source = Arc::new(StaticLedgerSource::new((100..120).map(raw).collect()));
        let (worker, _cancel) = worker(
            LedgerRange {
                start: 100,
                end: 104,
            },
            lakehouse.clone(),
            tuning(),
        );
        let summary = worker.run(source).await.unwrap();
        assert_eq!(summary.ledgers_ingested, 5);
        assert_eq!(
            lakehouse
                .sequences(&config.qualified(Table::Ledgers.name()), "sequence")
                .unwrap(),
            vec![100, 101, 102, 103, 104]
        );
    }

    #[tokio::test]
    async fn sequence_gap_aborts_worker_and_keeps_flushed_rows() {
        let (_dir, config) = test_lakehouse();
        let lakehouse = Lakehouse::connect(&config).unwrap();
        let ledgers = vec![raw(50), raw(51), raw(53)];
        let source = Arc::new(StaticLedgerSource::new(ledgers));
        let mut tuning = tuning();
        tuning.batch_size = 1;
        let (worker, _cancel) = worker(LedgerRange { start: 50, end: 60 }, lakehouse.clone(), tuning);
        let err = worker.run(source).await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::SequenceGap {
                expected: 52,
                received: 53
            }
        ));
        // Rows flushed before the gap stay committed.
        assert_eq!(
            lakehouse
                .sequences(&config.qualified(Table::Ledgers.name()), "sequence")
                .unwrap(),
            vec![50, 51]
        );
    }

    #[tokio::test]
    async fn malformed_envelope_aborts_after_flushing_previous_rows() {
        let (_dir, config) = test_lakehouse();
        let lakehouse = Lakehouse::connect(&config).unwrap();
        let ledgers = vec![
            raw(70),
            RawLedger {
                sequence: 71,
                ledger_close_meta_xdr: vec![0xff; 32],
            },
        ];
        let source = Arc::new(StaticLedgerSource::new(ledgers));
        let (worker, _cancel) = worker(LedgerRange { start: 70, end: 80 }, lakehouse.clone(), tuning());
        let err = worker.run(source).await.unwrap_err();
        assert!(matches!(err, IngestError::Envelope(_)));
        // The shutdown flush persisted the rows buffered before the bad envelope.
        assert_eq!(
            lakehouse
                .sequences(&config.qualified(Table::Ledgers.name()), "sequence")
                .unwrap(),
            vec![70]
        );
    }

    #[tokio::test]
    async fn stall_watchdog_trips_and_flushes_buffer() {
        let (_dir, config) = test_lakehouse();
        let lakehouse = Lakehouse::connect(&config).unwrap();
        let mut tuning = tuning();
        tuning.stream_timeout = Duration::from_millis(60);
        let (worker, _cancel) = worker(LedgerRange { start: 1, end: 10 }, lakehouse.clone(), tuning);
        let err = worker.run(Arc::new(SilentLedgerSource)).await.unwrap_err();
        assert!(matches!(err, IngestError::StreamStalled { .. }));
        assert_eq!(
            lakehouse
                .table_count(&config.qualified(Table::Ledgers.name()))
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn cancellation_flushes_and_propagates() {
        let (_dir, config) = test_lakehouse();
        let lakehouse = Lakehouse::connect(&config).unwrap();
        let mut tuning = tuning();
        tuning.receive_tick = Duration::from_millis(10);
        // Source yields a couple of ledgers then goes silent, leaving the
        // worker parked on the receive tick.
        let (worker, cancel) = worker(LedgerRange { start: 1, end: 100 }, lakehouse.clone(), tuning);
        let source = Arc::new(StaticAndThenSilent::new(vec![raw(1), raw(2)]));
        let handle = tokio::spawn(worker.run(source));
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.send(true).unwrap();
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, IngestError::Cancelled));
        // The cancellation path flushed the two buffered ledgers.
        assert_eq!(
            lakehouse
                .sequences(&config.qualified(Table::Ledgers.name()), "sequence")
                .unwrap(),
            vec![1, 2]
        );
    }

    /// Yields the given ledgers, then stays pending instead of ending.
    struct StaticAndThenSilent {
        ledgers: Vec<RawLedger>,
    }

    impl StaticAndThenSilent {
        fn new(ledgers: Vec<RawLedger>) -> Self {
            Self { ledgers }
        }
    }

    #[async_trait::async_trait]
    impl LedgerSource for StaticAndThenSilent {
        async fn stream_from(
            &self,
            start_ledger: u32,
        ) -> Result<LedgerStream, IngestError> {
            let head = futures::stream::iter(
                self.ledgers
                    .iter()
                    .filter(|ledger| ledger.sequence >= start_ledger)
                    .cloned()
                    .map(Ok)
                    .collect::<Vec<_>>(),
            );
            Ok(head.chain(futures::stream::pending()).boxed())
        }
    }
}
