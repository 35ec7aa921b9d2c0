use thiserror::Error;

use futon_transport::TransportError;
use futon_views::ViewError;
use futon_write::WriteError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SdkError {
    #[error("document not found")]
    NotFound,

    #[error("store returned status {0}")]
    Status(u16),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    View(#[from] ViewError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type SdkResult<T> = Result<T, SdkError>;
