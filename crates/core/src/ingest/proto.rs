//! Wire types and client for the upstream `RawLedgerService` streaming RPC,
//! kept in sync with the service's `raw_ledger_service.proto`.

/// Opens the stream at this ledger; the server replays forward from there.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct StreamLedgersRequest {
    #[prost(uint32, tag = "1")]
    pub start_ledger: u32,
}

/// One closed ledger: its sequence plus the XDR-encoded close meta.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RawLedger {
    #[prost(uint32, tag = "1")]
    pub sequence: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub ledger_close_meta_xdr: ::prost::alloc::vec::Vec<u8>,
}

pub mod raw_ledger_service_client {
    #![allow(unused_variables, dead_code, missing_docs, clippy::wildcard_imports)]
    use tonic::codegen::http::uri::PathAndQuery;
    use tonic::codegen::*;

    #[derive(Debug, Clone)]
    pub struct RawLedgerServiceClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl RawLedgerServiceClient<tonic::transport::Channel> {
        /// Attempt to create a new client by connecting to a given endpoint.
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }

    impl<T> RawLedgerServiceClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }

        pub async fn stream_raw_ledgers(
            &mut self,
            request: impl tonic::IntoRequest<super::StreamLedgersRequest>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::RawLedger>>,
            tonic::Status,
        > {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                PathAndQuery::from_static("/raw_ledger.RawLedgerService/StreamRawLedgers");
            let mut req = request.into_request();
            req.extensions_mut().insert(GrpcMethod::new(
                "raw_ledger.RawLedgerService",
                "StreamRawLedgers",
            ));
            self.inner.server_streaming(req, path, codec).await
        }
    }
}
