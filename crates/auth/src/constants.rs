//! DingTalk open API constants
//!
//! Error codes come from the server API error code table. Codes 88 and 40014
//! are the ones the service uses to reject a bad or stale access token.

/// Open API host used when no base URL is configured
pub const DEFAULT_BASE_URL: &str = "https://oapi.dingtalk.com";

/// Path of the access token endpoint (GET with appkey/appsecret query)
pub const TOKEN_PATH: &str = "/gettoken";

/// Per-request timeout applied to the shared HTTP client
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User-Agent sent on every request
pub const USER_AGENT: &str = concat!("dingtalk-client/", env!("CARGO_PKG_VERSION"));

/// "Authentication abnormal": the detail lives in `sub_code`
pub const AUTHENTICATION_ABNORMAL: i64 = 88;

/// Sub-code: access token missing from the request
pub const EMPTY_ACCESS_TOKEN: &str = "40000";

/// Sub-code: wrong secret while fetching the token, or an invalid token
pub const INVALID_ACCESS_TOKEN: &str = "40001";

/// Sub-code: illegal access token
pub const ILLEGAL_ACCESS_TOKEN: &str = "40014";

/// Top-level code for an illegal access token
pub const ILLEGAL_ACCESS_TOKEN_CODE: i64 = 40014;

/// Top-level code for an access token past its lifetime
pub const ACCESS_TOKEN_TIMEOUT_CODE: i64 = 42001;

/// Top-level code for an unknown app key or mismatched app secret
pub const INVALID_APP_CREDENTIALS_CODE: i64 = 40089;
