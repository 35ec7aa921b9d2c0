//! Transport seam for the futon document-store client.
//!
//! Everything above this crate talks to the remote store through the
//! [`Transport`] trait: one async function from a `{method, path, query,
//! body}` request to a `{status, body}` response. The client distinguishes
//! exactly three outcome classes on top of that (success, not-found, and
//! conflict) and treats every other non-success status as a generic
//! retryable failure.
//!
//! # Backends
//!
//! - [`HttpTransport`]: reqwest-based backend for a real CouchDB/Cloudant
//!   style store
//! - [`InMemoryStore`]: revision-tracking in-process store implementing the
//!   same endpoint surface, for tests and embedding

pub mod error;
pub mod http;
pub mod memory;
pub mod request;
pub mod traits;

pub use error::{TransportError, TransportResult};
pub use http::HttpTransport;
pub use memory::InMemoryStore;
pub use request::{Method, Request, Response};
pub use traits::Transport;
