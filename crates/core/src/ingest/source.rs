use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use super::proto::raw_ledger_service_client::RawLedgerServiceClient;
use super::proto::{RawLedger, StreamLedgersRequest};
use crate::error::IngestError;

pub type LedgerStream = BoxStream<'static, Result<RawLedger, IngestError>>;

/// Seam between the ingestion loop and the upstream service. The production
/// implementation speaks gRPC; tests substitute in-memory sources.
///
/// One source instance can serve several workers, each opening its own
/// stream over a disjoint sub-range.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    async fn stream_from(&self, start_ledger: u32) -> Result<LedgerStream, IngestError>;
}

/// gRPC-backed ledger source. Connects lazily, once per opened stream.
#[derive(Clone, Debug)]
pub struct GrpcLedgerSource {
    endpoint: String,
}

impl GrpcLedgerSource {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl LedgerSource for GrpcLedgerSource {
    async fn stream_from(&self, start_ledger: u32) -> Result<LedgerStream, IngestError> {
        let mut client = RawLedgerServiceClient::connect(self.endpoint.clone())
            .await
            .map_err(|err| IngestError::Stream(err.to_string()))?;
        tracing::debug!(endpoint = %self.endpoint, start_ledger, "opened raw ledger stream");
        let stream = client
            .stream_raw_ledgers(StreamLedgersRequest { start_ledger })
            .await
            .map_err(|status| IngestError::Stream(status.to_string()))?
            .into_inner();
        Ok(stream
            .map(|item| item.map_err(|status| IngestError::Stream(status.to_string())))
            .boxed())
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;

    /// Serves a fixed set of pre-encoded ledgers, in order, from `start_ledger`.
    pub struct StaticLedgerSource {
        ledgers: Vec<RawLedger>,
    }

    impl StaticLedgerSource {
        pub fn new(ledgers: Vec<RawLedger>) -> Self {
            Self { ledgers }
        }
    }

    #[async_trait]
    impl LedgerSource for StaticLedgerSource {
        async fn stream_from(&self, start_ledger: u32) -> Result<LedgerStream, IngestError> {
            let items: Vec<Result<RawLedger, IngestError>> = self
                .ledgers
                .iter()
                .filter(|ledger| ledger.sequence >= start_ledger)
                .cloned()
                .map(Ok)
                .collect();
            Ok(futures::stream::iter(items).boxed())
        }
    }

    /// Never yields anything; used to exercise the stall watchdog.
    pub struct SilentLedgerSource;

    #[async_trait]
    impl LedgerSource for SilentLedgerSource {
        async fn stream_from(&self, _start_ledger: u32) -> Result<LedgerStream, IngestError> {
            Ok(futures::stream::pending().boxed())
        }
    }
}
