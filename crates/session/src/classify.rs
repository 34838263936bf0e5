//! Error classification for DingTalk calls
//!
//! Decides which failures a token refresh can fix. Service errors are
//! matched against a rule table of (errcode, optional sub-codes); the first
//! matching rule wins and anything unmatched is an application error.
//! Failures that never reached the service are transport errors, except
//! HTTP 401/403 which mean the credentials themselves were refused.

use std::fmt;

use dingtalk_auth::constants::{
    ACCESS_TOKEN_TIMEOUT_CODE, AUTHENTICATION_ABNORMAL, EMPTY_ACCESS_TOKEN, ILLEGAL_ACCESS_TOKEN,
    ILLEGAL_ACCESS_TOKEN_CODE, INVALID_ACCESS_TOKEN, INVALID_APP_CREDENTIALS_CODE,
};
use dingtalk_auth::{Error as CallError, RemoteError};

/// What a failed call means for the token lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Token missing, invalid, or expired: recoverable by refresh
    TokenExpired,
    /// App key/secret refused: configuration problem, never retried
    InvalidCredentials,
    /// Connection, timeout, bad status, or malformed response
    Transport,
    /// Business-level failure unrelated to authentication
    Application,
}

impl ErrorKind {
    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::TokenExpired => "token_expired",
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::Transport => "transport",
            ErrorKind::Application => "application",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A call failure tagged with its kind. Never mutated after classification.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {cause}")]
pub struct ClassifiedError {
    kind: ErrorKind,
    #[source]
    cause: CallError,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, cause: CallError) -> Self {
        Self { kind, cause }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn cause(&self) -> &CallError {
        &self.cause
    }

    pub fn into_cause(self) -> CallError {
        self.cause
    }

    /// The service error envelope, when the failure came from the service.
    pub fn remote(&self) -> Option<&RemoteError> {
        match &self.cause {
            CallError::Remote(remote) => Some(remote),
            _ => None,
        }
    }
}

/// One row of the classification table.
///
/// `sub_codes: None` matches on `errcode` alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub code: i64,
    pub sub_codes: Option<&'static [&'static str]>,
    pub kind: ErrorKind,
}

impl Rule {
    pub const fn code(code: i64, kind: ErrorKind) -> Self {
        Self {
            code,
            sub_codes: None,
            kind,
        }
    }

    pub const fn sub_codes(code: i64, sub_codes: &'static [&'static str], kind: ErrorKind) -> Self {
        Self {
            code,
            sub_codes: Some(sub_codes),
            kind,
        }
    }

    fn matches(&self, err: &RemoteError) -> bool {
        if err.errcode != self.code {
            return false;
        }
        match self.sub_codes {
            None => true,
            Some(subs) => err
                .sub_code
                .as_deref()
                .is_some_and(|sub| subs.contains(&sub)),
        }
    }
}

const TOKEN_SUB_CODES: &[&str] = &[EMPTY_ACCESS_TOKEN, INVALID_ACCESS_TOKEN, ILLEGAL_ACCESS_TOKEN];

/// Default table for the DingTalk open API.
pub const DEFAULT_RULES: &[Rule] = &[
    Rule::sub_codes(AUTHENTICATION_ABNORMAL, TOKEN_SUB_CODES, ErrorKind::TokenExpired),
    Rule::code(ILLEGAL_ACCESS_TOKEN_CODE, ErrorKind::TokenExpired),
    Rule::code(ACCESS_TOKEN_TIMEOUT_CODE, ErrorKind::TokenExpired),
    Rule::code(INVALID_APP_CREDENTIALS_CODE, ErrorKind::InvalidCredentials),
];

/// Table-driven classifier. Extend with `with_rule`.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: Vec<Rule>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_RULES.to_vec())
    }
}

impl ErrorClassifier {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Add a rule ahead of the existing ones.
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn classify(&self, err: CallError) -> ClassifiedError {
        let kind = self.kind_of(&err);
        ClassifiedError::new(kind, err)
    }

    pub fn kind_of(&self, err: &CallError) -> ErrorKind {
        match err {
            CallError::Remote(remote) => self
                .rules
                .iter()
                .find(|rule| rule.matches(remote))
                .map(|rule| rule.kind)
                .unwrap_or(ErrorKind::Application),
            CallError::Status {
                status: 401 | 403, ..
            } => ErrorKind::InvalidCredentials,
            CallError::InvalidCredentials(_) => ErrorKind::InvalidCredentials,
            CallError::Status { .. }
            | CallError::Http(_)
            | CallError::Decode(_)
            | CallError::Cancelled => ErrorKind::Transport,
        }
    }
}
