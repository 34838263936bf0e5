//! Error types for authenticated calls

use crate::classify::{ClassifiedError, ErrorKind};

/// Terminal outcome of an authenticated call that did not succeed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Non-retryable failure, or the last expiry once the budget ran out.
    #[error("{0}")]
    Call(ClassifiedError),

    /// The token was rejected and the refresh it triggered failed too.
    #[error("{original} | token refresh failed: {refresh}")]
    RefreshFailed {
        original: ClassifiedError,
        refresh: ClassifiedError,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Kind of the failure that ended the call. For a failed refresh this
    /// is the refresh's kind, since that is what the caller has to fix.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Call(err) => Some(err.kind()),
            Error::RefreshFailed { refresh, .. } => Some(refresh.kind()),
            Error::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<ClassifiedError> for Error {
    fn from(err: ClassifiedError) -> Self {
        Error::Call(err)
    }
}

/// Result alias for authenticated calls.
pub type Result<T> = std::result::Result<T, Error>;
