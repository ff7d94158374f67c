use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::source::LedgerSource;
use super::worker::{IngestWorker, LedgerRange, WorkerSummary};
use super::IngestTuning;
use crate::error::IngestError;
use crate::lakehouse::Lakehouse;
use crate::ledger::Network;
use crate::metadata::{known_datasets, MetadataPlane};
use lumenlake_config::PipelineConfig;

/// Aggregate outcome of one ingestion run.
#[derive(Clone, Debug)]
pub struct IngestReport {
    pub workers: Vec<WorkerSummary>,
}

impl IngestReport {
    pub fn ledgers_ingested(&self) -> u64 {
        self.workers.iter().map(|w| w.ledgers_ingested).sum()
    }
}

/// Splits `[start, end]` into one inclusive sub-range per worker.
///
/// Worker 0 keeps the range start; every later worker starts one past its
/// predecessor's end. The last worker absorbs the division remainder, so load
/// imbalance is bounded by `workers - 1` ledgers.
pub fn split_range(start: u32, end: u32, workers: u32) -> Result<Vec<LedgerRange>, IngestError> {
    if end <= start {
        return Err(IngestError::InvalidRange(format!(
            "end ({end}) must be greater than start ({start})"
        )));
    }
    if workers == 0 {
        return Err(IngestError::InvalidRange("zero workers".to_string()));
    }
    let chunk = (end - start) / workers;
    if chunk < 1 {
        return Err(IngestError::InvalidRange(format!(
            "range {start}..{end} is too small for {workers} workers"
        )));
    }
    Ok((0..workers)
        .map(|i| {
            let worker_start = start + i * chunk + u32::from(i > 0);
            let worker_end = if i == workers - 1 {
                end
            } else {
                start + (i + 1) * chunk
            };
            LedgerRange {
                start: worker_start,
                end: worker_end,
            }
        })
        .collect())
}

/// Runs the configured ledger range across `num_workers` parallel workers.
///
/// Each worker gets its own catalog connection and its own upstream stream.
/// The first error any worker raises cancels the siblings and becomes the
/// run's outcome; sibling errors after that (including their `Cancelled`
/// unwinding) are discarded. `shutdown` is the caller's external stop signal.
pub async fn run_ingestion(
    config: &PipelineConfig,
    source: Arc<dyn LedgerSource>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<IngestReport, IngestError> {
    let ranges = split_range(
        config.source.start_ledger,
        config.source.end_ledger,
        config.lakehouse.num_workers,
    )?;
    let network = Network::new(&config.source.network_passphrase);
    let tuning = IngestTuning::from_config(config);

    let base = Lakehouse::connect(&config.lakehouse)?;
    MetadataPlane::new(base.clone())
        .register_datasets(known_datasets())
        .await?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let cancel_tx = Arc::new(cancel_tx);

    // Forward the caller's shutdown signal into the shared cancellation.
    let forward_cancel = cancel_tx.clone();
    let forwarder = tokio::spawn(async move {
        loop {
            if *shutdown.borrow() {
                let _ = forward_cancel.send(true);
                return;
            }
            if shutdown.changed().await.is_err() {
                return;
            }
        }
    });

    let mut join_set: JoinSet<Result<WorkerSummary, IngestError>> = JoinSet::new();
    for (id, range) in ranges.into_iter().enumerate() {
        let lakehouse = base.clone_connection()?;
        let worker = IngestWorker::new(
            id as u32,
            range,
            network.clone(),
            lakehouse,
            tuning.clone(),
            cancel_rx.clone(),
        );
        let source = source.clone();
        join_set.spawn(async move { worker.run(source).await });
    }
    drop(cancel_rx);

    let mut first_error: Option<IngestError> = None;
    let mut cancelled = false;
    let mut summaries = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Ok(summary)) => summaries.push(summary),
            Ok(Err(IngestError::Cancelled)) => cancelled = true,
            Ok(Err(err)) => {
                if first_error.is_none() {
                    tracing::error!(error = %err, "worker failed, cancelling siblings");
                    let _ = cancel_tx.send(true);
                    first_error = Some(err);
                } else {
                    tracing::debug!(error = %err, "discarding error after the first");
                }
            }
            Err(join_err) => {
                if first_error.is_none() {
                    let _ = cancel_tx.send(true);
                    first_error = Some(IngestError::Stream(format!(
                        "worker task aborted: {join_err}"
                    )));
                }
            }
        }
    }
    forwarder.abort();

    if let Some(err) = first_error {
        return Err(err);
    }
    if cancelled {
        return Err(IngestError::Cancelled);
    }
    summaries.sort_by_key(|summary| summary.worker_id);
    let report = IngestReport { workers: summaries };
    tracing::info!(
        ledgers = report.ledgers_ingested(),
        workers = report.workers.len(),
        "ingestion complete"
    );
    Ok(report)
}
