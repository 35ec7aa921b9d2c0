//! Aggregation provisioner for the futon document-store client.
//!
//! Grouped counts, sums, and statistical summaries are implemented as
//! map/reduce secondary indexes materialized in the store. An aggregation
//! request normalizes to a canonical [`AggregateSpec`] whose 160-bit content
//! hash, the [`IndexKey`], names the index artifact: identical requests
//! from any client instance, at any time, resolve to the same index, so the
//! index is built once and reused forever.
//!
//! Index creation goes through the conflict-resolving writer, which makes
//! the unavoidable check-then-create race between concurrent first-callers
//! safe: the loser's write conflicts, retries, finds a content-equal design
//! document, and converges to a no-op.

pub mod design;
pub mod error;
pub mod provisioner;
pub mod spec;

pub use design::design_doc;
pub use error::{ViewError, ViewResult};
pub use provisioner::Aggregator;
pub use spec::{AggregateSpec, Fields, IndexKey, Reduce};
