//! Bulk importer for the futon document-store client.
//!
//! Imports arbitrarily large document collections by slicing them into
//! fixed-size batches and driving the batches through a worker pool bounded
//! by a semaphore, so client-side load on the store is capped no matter how
//! many batches exist. Bulk import is best-effort by design: a failed batch
//! is counted, never retried and never raised; the caller reads the
//! `failed` count and decides whether to resubmit.

pub mod importer;

pub use importer::{BulkConfig, ImportSummary, Importer};
