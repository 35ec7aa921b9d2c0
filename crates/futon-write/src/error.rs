use thiserror::Error;

/// Terminal failures of a conflict-resolving write.
///
/// Retryable failures never cross this boundary; only exhaustion of the
/// attempt budget does, carrying the last observed status.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WriteError {
    #[error("write failed after {attempts} attempts (last status {status})")]
    ConflictExhausted { attempts: u32, status: u16 },

    #[error("document not found")]
    NotFound,
}

impl WriteError {
    /// The last observed store status, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ConflictExhausted { status, .. } => Some(*status),
            Self::NotFound => Some(404),
        }
    }
}

pub type WriteResult<T> = Result<T, WriteError>;
