//! Response decoding shared by the token endpoint and API operations
//!
//! Every DingTalk response is a JSON object that doubles as an error
//! envelope. `decode` checks the envelope first and only then decodes the
//! payload, so a service-side rejection is never mistaken for a malformed
//! body.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::constants::USER_AGENT;
use crate::error::{Error, RemoteError, Result};

/// Build the HTTP client used for all DingTalk calls.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::Http(format!("building HTTP client: {e}")))
}

/// Decode a response body, surfacing a non-ok envelope as `Error::Remote`.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let envelope: RemoteError = serde_json::from_slice(body)
        .map_err(|e| Error::Decode(format!("invalid response envelope: {e}")))?;
    if !envelope.is_ok() {
        return Err(Error::Remote(envelope));
    }
    serde_json::from_slice(body).map_err(|e| Error::Decode(format!("invalid response payload: {e}")))
}

/// Send a prepared request and decode its JSON response.
///
/// Transport failures map to `Http`, non-2xx statuses to `Status` (with the
/// body for context), and everything else goes through `decode`.
pub async fn read_json<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T> {
    let response = request.send().await.map_err(transport_error)?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Status {
            status: status.as_u16(),
            body,
        });
    }

    let body = response.bytes().await.map_err(transport_error)?;
    decode(&body)
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Http(format!("request timed out: {e}"))
    } else if e.is_decode() {
        Error::Decode(format!("reading response body: {e}"))
    } else {
        Error::Http(format!("request failed: {e}"))
    }
}
