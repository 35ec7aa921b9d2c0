//! Foundation types for the futon document-store client.
//!
//! This crate provides the document model shared by every other futon crate:
//! the reserved-field conventions of a revision-versioned document store
//! (`_id`, `_rev`), normalization between the store's wire form and the
//! caller-facing form, and the statistics summaries returned by aggregation
//! views.
//!
//! # Key Pieces
//!
//! - [`doc`]: strip/normalize helpers and revision-blind content equality
//! - [`StatsSummary`]: raw `{sum, count, min, max, sumsqr}` view output with
//!   derived mean, variance, and standard deviation

pub mod doc;
pub mod stats;

pub use doc::{content_equal, normalize_for_write, strip_doc, strip_docs, ID_FIELD, REV_FIELD};
pub use stats::{EnhancedStats, StatsSummary};
