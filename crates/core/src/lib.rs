//! lumenlake ingestion engine.
//!
//! Consumes raw ledger envelopes from an upstream streaming source, extracts
//! typed row batches out of them and lands those batches in a lakehouse
//! catalog in chunked multi-row INSERTs, recording provenance and quality
//! metadata for every flush. Reading the ingested data back is the concern of
//! the `lumenlake_reader` crate.

pub mod error;
pub mod extract;
pub mod ingest;
pub mod lakehouse;
pub mod ledger;
pub mod metadata;
pub mod quality;

mod testing;
