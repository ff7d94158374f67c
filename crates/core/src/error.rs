use std::time::Duration;

/// Failure to decode one raw envelope. Always unrecoverable: the upstream
/// stream handed us bytes that are not a well-formed versioned envelope.
#[derive(thiserror::Error, Debug)]
pub enum EnvelopeError {
    #[error("invalid ledger envelope: {0}")]
    InvalidEnvelope(String),
}

#[derive(thiserror::Error, Debug)]
pub enum LakehouseError {
    #[error("failed to attach catalog `{catalog}`: {message}")]
    AttachFailed { catalog: String, message: String },
    #[error("sql error: {0}")]
    Sql(#[from] duckdb::Error),
    #[error("lakehouse task aborted: {0}")]
    TaskAborted(String),
}

/// Errors raised by the ingestion pipeline. The first one raised by any
/// worker cancels its siblings and becomes the run's outcome.
#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error(transparent)]
    Lakehouse(#[from] LakehouseError),
    #[error("stream stalled: nothing received for {elapsed:?} (budget {budget:?})")]
    StreamStalled { elapsed: Duration, budget: Duration },
    #[error("stream transport error: {0}")]
    Stream(String),
    #[error("ledger sequence gap within worker range: expected {expected}, received {received}")]
    SequenceGap { expected: u32, received: u32 },
    #[error("insert chunk for `{table}` exceeded its {deadline:?} deadline")]
    ChunkDeadlineExceeded {
        table: &'static str,
        deadline: Duration,
    },
    #[error("invalid ledger range: {0}")]
    InvalidRange(String),
    #[error("ingestion cancelled")]
    Cancelled,
}
