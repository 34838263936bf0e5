//! DingTalk open API client

use std::sync::Arc;
use std::time::Duration;

use dingtalk_auth::{
    Credentials, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS, Error as CallError, HttpTokenEndpoint,
    LoginSignature, Token, http_client, read_json,
};
use dingtalk_session::{DEFAULT_RETRY_BUDGET, Error, Result, RetryingInvoker};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::{
    AuthCodeRequest, OrgUserCount, ResultEnvelope, UnionIdRequest, UnionIdUser, User,
    UserGetRequest, UserInfo, UserInfoEnvelope,
};

const ORG_USER_COUNT_PATH: &str = "/user/get_org_user_count";
const USER_GET_PATH: &str = "/topapi/v2/user/get";
const USER_BY_UNION_ID_PATH: &str = "/topapi/user/getbyunionid";
const USER_INFO_BY_CODE_PATH: &str = "/sns/getuserinfo_bycode";

/// Connection settings for a `Client`.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub timeout: Duration,
    /// Expiry-triggered retries per call
    pub retry_budget: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

/// Handle for calling the DingTalk open API as one app.
///
/// Cheap to clone; clones share the token and the HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Arc<str>,
    invoker: RetryingInvoker,
    cancel: CancellationToken,
}

impl Client {
    pub fn new(credentials: Credentials, options: ClientOptions) -> dingtalk_auth::Result<Self> {
        let http = http_client(options.timeout)?;
        let base_url: Arc<str> = Arc::from(options.base_url.trim_end_matches('/'));
        let endpoint = Arc::new(HttpTokenEndpoint::new(http.clone(), base_url.to_string()));
        let invoker = RetryingInvoker::new(credentials, endpoint).with_budget(options.retry_budget);

        Ok(Self {
            http,
            base_url,
            invoker,
            cancel: CancellationToken::new(),
        })
    }

    /// Handle whose calls stop when `cancel` fires. Shares the token with `self`.
    pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    pub fn invoker(&self) -> &RetryingInvoker {
        &self.invoker
    }

    /// Token currently cached, without contacting the service.
    pub async fn cached_token(&self) -> Token {
        self.invoker.current_token().await
    }

    pub async fn set_access_token(&self, token: Token) {
        self.invoker.set_token(token).await;
    }

    /// Fetch a fresh access token and cache it.
    pub async fn access_token(&self) -> Result<Token> {
        self.invoker.refresh(&self.cancel).await
    }

    /// Number of users in the organization.
    pub async fn org_user_count(&self, only_active: bool) -> Result<u64> {
        let url = self.url(ORG_USER_COUNT_PATH);
        let only_active = if only_active { "1" } else { "0" };

        let response: OrgUserCount = self
            .call(|token| {
                read_json(
                    self.http
                        .get(url.as_str())
                        .query(&[("access_token", token.as_str()), ("onlyActive", only_active)]),
                )
            })
            .await?;
        Ok(response.count)
    }

    /// User detail by user id. `language` is `zh_CN` or `en_US`.
    pub async fn user(&self, userid: &str, language: Option<&str>) -> Result<User> {
        let url = self.url(USER_GET_PATH);
        let body = UserGetRequest { userid, language };

        self.call(|token| {
            let request = self
                .http
                .post(url.as_str())
                .query(&[("access_token", token.as_str())])
                .json(&body);
            async move { take_result(read_json(request).await?) }
        })
        .await
    }

    /// Resolve a user id from a union id.
    pub async fn user_by_union_id(&self, unionid: &str) -> Result<UnionIdUser> {
        let url = self.url(USER_BY_UNION_ID_PATH);
        let body = UnionIdRequest { unionid };

        self.call(|token| {
            let request = self
                .http
                .post(url.as_str())
                .query(&[("access_token", token.as_str())])
                .json(&body);
            async move { take_result(read_json(request).await?) }
        })
        .await
    }

    /// Resolve the login user behind a temporary auth code.
    ///
    /// Authenticated by the login app signature rather than the access
    /// token, so it is never refreshed or retried.
    pub async fn user_info_by_code(&self, tmp_auth_code: &str) -> Result<UserInfo> {
        let classify = |err: CallError| Error::Call(self.invoker.classifier().classify(err));

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let login = self.invoker.credentials().login().map_err(classify)?;
        let signature = LoginSignature::now(login).map_err(classify)?;
        debug!(app_id = %login.app_id, timestamp = %signature.timestamp, "resolving auth code");

        let request = self
            .http
            .post(self.url(USER_INFO_BY_CODE_PATH))
            .query(&signature.query())
            .json(&AuthCodeRequest { tmp_auth_code });

        let envelope: UserInfoEnvelope = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            result = read_json(request) => result.map_err(classify)?,
        };
        envelope
            .user_info
            .ok_or_else(|| classify(CallError::Decode("response missing user_info".into())))
    }

    async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut(Token) -> Fut,
        Fut: std::future::Future<Output = dingtalk_auth::Result<T>>,
    {
        self.invoker
            .execute_with(self.invoker.budget(), &self.cancel, op)
            .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn take_result<T>(envelope: ResultEnvelope<T>) -> dingtalk_auth::Result<T> {
    envelope
        .result
        .ok_or_else(|| CallError::Decode("response missing result".into()))
}
