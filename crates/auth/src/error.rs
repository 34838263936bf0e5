//! Error types for DingTalk calls

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::AUTHENTICATION_ABNORMAL;

/// Error envelope carried in every DingTalk JSON response.
///
/// The service answers most failures with HTTP 200 and a non-zero `errcode`,
/// so the envelope is decoded from the same object as the payload. When
/// `errcode` is 88 the useful detail is in `sub_code`/`sub_msg`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_msg: Option<String>,
}

impl RemoteError {
    /// Build an envelope with a top-level code only.
    pub fn new(errcode: i64, errmsg: impl Into<String>) -> Self {
        Self {
            errcode,
            errmsg: errmsg.into(),
            sub_code: None,
            sub_msg: None,
        }
    }

    /// Attach a sub-code and its message.
    pub fn with_sub_code(mut self, sub_code: impl Into<String>, sub_msg: impl Into<String>) -> Self {
        self.sub_code = Some(sub_code.into());
        self.sub_msg = Some(sub_msg.into());
        self
    }

    /// Whether the envelope reports success.
    pub fn is_ok(&self) -> bool {
        self.errcode == 0 || self.errmsg == "ok"
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errcode == AUTHENTICATION_ABNORMAL {
            write!(
                f,
                "[{}]:{}",
                self.sub_code.as_deref().unwrap_or_default(),
                self.sub_msg.as_deref().unwrap_or_default()
            )
        } else {
            write!(f, "[{}]: {}", self.errcode, self.errmsg)
        }
    }
}

/// Failure of a single DingTalk call (token fetch or API operation).
///
/// Cloneable so a single refresh outcome can be handed to every caller
/// waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("dingtalk error {0}")]
    Remote(RemoteError),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl From<RemoteError> for Error {
    fn from(err: RemoteError) -> Self {
        Self::Remote(err)
    }
}

/// Result alias for DingTalk calls.
pub type Result<T> = std::result::Result<T, Error>;
