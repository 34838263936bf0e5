//! DingTalk application authentication
//!
//! Holds the pieces needed to obtain and present an access token for the
//! DingTalk open API. This crate knows nothing about caching or retries;
//! `dingtalk-session` builds the token lifecycle on top of it.
//!
//! Credential flow:
//! 1. Caller builds `Credentials` from an app key and app secret
//! 2. `HttpTokenEndpoint::fetch_token()` exchanges them at `/gettoken`
//! 3. Every authenticated call carries the token as `access_token`
//! 4. Failures surface as `Error`, with service-side errors kept intact in
//!    `RemoteError` so callers can tell an expired token from anything else
//! 5. Login-by-code calls authenticate with a `LoginSignature` instead

pub mod constants;
pub mod credentials;
pub mod error;
pub mod http;
pub mod signature;
pub mod token;

pub use constants::*;
pub use credentials::{Credentials, LoginCredentials};
pub use error::{Error, RemoteError, Result};
pub use http::{decode, http_client, read_json};
pub use signature::{LoginSignature, sign};
pub use token::{HttpTokenEndpoint, Token, TokenEndpoint, TokenResponse, fetch_token};
