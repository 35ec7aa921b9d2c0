use thiserror::Error;

/// Transport-level failures: the request never produced a store response.
///
/// Error *statuses* from the store are not transport failures; they come back
/// as a normal [`crate::Response`] and are classified by the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failure: {message}")]
    Connect {
        message: String,
        /// Status code, when the failure happened late enough to carry one.
        status: Option<u16>,
    },

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// The status code associated with this failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Connect { status, .. } => *status,
            Self::InvalidUrl(_) => None,
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
