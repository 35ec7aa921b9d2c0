use async_trait::async_trait;

use crate::error::TransportResult;
use crate::request::{Request, Response};

/// Capability for talking to the remote store.
///
/// Implementations own all HTTP-level concerns (headers, compression,
/// timeouts, authentication). The client core only sees `{status, body}`
/// pairs; an `Err` means the request never produced a store response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: Request) -> TransportResult<Response>;
}
