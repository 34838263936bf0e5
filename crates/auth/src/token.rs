//! Access token and the token endpoint
//!
//! DingTalk hands out app access tokens from `GET /gettoken`. The response's
//! `expires_in` is informational only: the client never tracks expiry
//! locally and learns about it when an operation is rejected.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use tracing::debug;

use crate::constants::TOKEN_PATH;
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::http::read_json;

/// Bearer access token. The default value is the empty token.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "Token(<empty>)")
        } else {
            write!(f, "Token([REDACTED])")
        }
    }
}

/// Payload of a successful `/gettoken` response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    /// Seconds until the token expires (delta, not absolute)
    #[serde(default)]
    pub expires_in: u64,
}

/// Exchange app credentials for an access token.
pub async fn fetch_token(
    client: &reqwest::Client,
    base_url: &str,
    credentials: &Credentials,
) -> Result<TokenResponse> {
    credentials.validate()?;

    let url = format!("{}{TOKEN_PATH}", base_url.trim_end_matches('/'));
    let response: TokenResponse = read_json(client.get(url).query(&[
        ("appkey", credentials.app_key.as_str()),
        ("appsecret", credentials.app_secret.expose().as_str()),
    ]))
    .await?;

    if response.access_token.is_empty() {
        return Err(Error::Decode("token response missing access_token".into()));
    }

    debug!(
        app_key = %credentials.app_key,
        expires_in = response.expires_in,
        "fetched access token"
    );
    Ok(response)
}

/// Source of fresh access tokens.
///
/// Uses `Pin<Box<dyn Future>>` return types so it can be shared as
/// `Arc<dyn TokenEndpoint>` and swapped for a fake in tests.
pub trait TokenEndpoint: Send + Sync {
    fn fetch_token<'a>(
        &'a self,
        credentials: &'a Credentials,
    ) -> Pin<Box<dyn Future<Output = Result<Token>> + Send + 'a>>;
}

/// Token endpoint backed by the DingTalk `/gettoken` API.
#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTokenEndpoint {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

impl TokenEndpoint for HttpTokenEndpoint {
    fn fetch_token<'a>(
        &'a self,
        credentials: &'a Credentials,
    ) -> Pin<Box<dyn Future<Output = Result<Token>> + Send + 'a>> {
        Box::pin(async move {
            let response = fetch_token(&self.client, &self.base_url, credentials).await?;
            Ok(Token::new(response.access_token))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> reqwest::Client {
        crate::http::http_client(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn token_debug_never_prints_value() {
        assert_eq!(format!("{:?}", Token::new("abc123")), "Token([REDACTED])");
        assert_eq!(format!("{:?}", Token::default()), "Token(<empty>)");
        assert!(Token::default().is_empty());
    }

    #[test]
    fn token_response_deserializes() {
        let json = r#"{"errcode":0,"errmsg":"ok","access_token":"T1","expires_in":7200}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "T1");
        assert_eq!(token.expires_in, 7200);
    }

    #[tokio::test]
    async fn fetch_token_sends_app_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gettoken"))
            .and(query_param("appkey", "k"))
            .and(query_param("appsecret", "s"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errcode": 0,
                "errmsg": "ok",
                "access_token": "T1",
                "expires_in": 7200
            })))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = HttpTokenEndpoint::new(client(), server.uri());
        let token = endpoint
            .fetch_token(&Credentials::new("k", "s"))
            .await
            .unwrap();
        assert_eq!(token.as_str(), "T1");
    }

    #[tokio::test]
    async fn fetch_token_surfaces_envelope_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gettoken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errcode": 40089,
                "errmsg": "invalid appkey or appsecret"
            })))
            .mount(&server)
            .await;

        let endpoint = HttpTokenEndpoint::new(client(), server.uri());
        let err = endpoint
            .fetch_token(&Credentials::new("k", "wrong"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::Remote(ref remote) if remote.errcode == 40089),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn fetch_token_rejects_missing_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gettoken"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"errcode": 0})),
            )
            .mount(&server)
            .await;

        let endpoint = HttpTokenEndpoint::new(client(), server.uri());
        let err = endpoint
            .fetch_token(&Credentials::new("k", "s"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn fetch_token_skips_network_for_empty_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gettoken"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let endpoint = HttpTokenEndpoint::new(client(), server.uri());
        let err = endpoint
            .fetch_token(&Credentials::new("", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn fetch_token_trims_trailing_slash() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gettoken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "T2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let base = format!("{}/", server.uri());
        let response = fetch_token(&client(), &base, &Credentials::new("k", "s"))
            .await
            .unwrap();
        assert_eq!(response.access_token, "T2");
    }
}
