use thiserror::Error;

use futon_transport::TransportError;
use futon_write::WriteError;

/// Failures of aggregation provisioning and querying.
///
/// [`ViewError::MissingValueFields`] is raised synchronously, before any
/// network call; write-path errors are delegated to the conflict-resolving
/// writer and surface here only on exhaustion.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewError {
    #[error("missing value parameter")]
    MissingValueFields,

    #[error("store returned status {0}")]
    Status(u16),

    #[error("unexpected view response shape: {0}")]
    Malformed(String),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type ViewResult<T> = Result<T, ViewError>;
