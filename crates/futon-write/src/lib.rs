//! Conflict-resolving writer for the futon document-store client.
//!
//! The remote store enforces single-document linearizability through opaque
//! revision tokens: a write carrying a stale token is rejected with a
//! conflict. This crate wraps that compare-and-swap in a bounded retry loop
//! so callers get plain `update` / `delete` / `insert` operations that
//! transparently absorb races with concurrent writers.
//!
//! The fetch-result-to-write-request transition is a pure function over a
//! tagged [`WriteIntent`] (see [`plan`]), so the interesting logic is
//! unit-testable without a store; the [`Writer`] drives it through the
//! transport under a shared [`RetryPolicy`].

pub mod error;
pub mod plan;
pub mod retry;
pub mod writer;

pub use error::{WriteError, WriteResult};
pub use plan::{FetchOutcome, WriteIntent, WritePlan};
pub use retry::RetryPolicy;
pub use writer::Writer;
