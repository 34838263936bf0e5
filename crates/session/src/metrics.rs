//! Token lifecycle metrics
//!
//! - `dingtalk_token_refresh_total` (counter): label `outcome`
//! - `dingtalk_token_refresh_joined_total` (counter): callers that attached
//!   to a refresh already in flight
//! - `dingtalk_call_retries_total` (counter): re-attempts after an expiry
//! - `dingtalk_call_errors_total` (counter): label `kind`
//!
//! Without an installed recorder these calls are no-ops.

use crate::classify::ErrorKind;

pub const REFRESH_TOTAL: &str = "dingtalk_token_refresh_total";
pub const REFRESH_JOINED_TOTAL: &str = "dingtalk_token_refresh_joined_total";
pub const CALL_RETRIES_TOTAL: &str = "dingtalk_call_retries_total";
pub const CALL_ERRORS_TOTAL: &str = "dingtalk_call_errors_total";

/// Record a finished token refresh ("success" or "failure").
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!(REFRESH_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_refresh_joined() {
    metrics::counter!(REFRESH_JOINED_TOTAL).increment(1);
}

pub fn record_retry() {
    metrics::counter!(CALL_RETRIES_TOTAL).increment(1);
}

/// Record a failed attempt with its classification.
pub fn record_call_error(kind: ErrorKind) {
    metrics::counter!(CALL_ERRORS_TOTAL, "kind" => kind.label()).increment(1);
}
