//! Authenticated call execution with refresh-on-expiry
//!
//! `RetryingInvoker` runs an operation with the current token. When the
//! service rejects the token, it refreshes through the coordinator and runs
//! the operation again, at most `budget` times per call. Every other failure
//! ends the call immediately: in particular a refused app secret must never
//! turn into a refresh loop.
//!
//! Attempt state machine:
//! - Attempt(n) → success: return the result
//! - Attempt(n) → Transport / InvalidCredentials / Application: return it
//! - Attempt(n) → TokenExpired, budget left → refresh → Attempt(n+1)
//! - Attempt(n) → TokenExpired, refresh fails: return both errors
//! - Attempt(n) → TokenExpired, budget spent: return the expiry

use std::future::Future;
use std::sync::Arc;

use dingtalk_auth::{Credentials, Error as CallError, Token, TokenEndpoint};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classify::{ErrorClassifier, ErrorKind};
use crate::coordinator::{RefreshCoordinator, RefreshKey};
use crate::error::{Error, Result};
use crate::metrics;
use crate::store::TokenStore;

/// Expiry-triggered retries allowed per call unless configured otherwise.
pub const DEFAULT_RETRY_BUDGET: u32 = 1;

/// Runs operations with a managed access token.
///
/// Owns its token store; clones share the store and the coordinator, so a
/// clone is the same logical client.
#[derive(Clone)]
pub struct RetryingInvoker {
    credentials: Arc<Credentials>,
    key: RefreshKey,
    endpoint: Arc<dyn TokenEndpoint>,
    store: Arc<TokenStore>,
    coordinator: Arc<RefreshCoordinator>,
    classifier: ErrorClassifier,
    budget: u32,
}

impl RetryingInvoker {
    pub fn new(credentials: Credentials, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        let key = RefreshKey::from(&credentials);
        Self {
            credentials: Arc::new(credentials),
            key,
            endpoint,
            store: Arc::new(TokenStore::new()),
            coordinator: Arc::new(RefreshCoordinator::new()),
            classifier: ErrorClassifier::default(),
            budget: DEFAULT_RETRY_BUDGET,
        }
    }

    /// Default retry budget used by `execute`.
    pub fn with_budget(mut self, budget: u32) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Share a coordinator with other invokers. Refreshes are still keyed by
    /// app key, so different apps never share an outcome.
    pub fn with_coordinator(mut self, coordinator: Arc<RefreshCoordinator>) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    pub async fn current_token(&self) -> Token {
        self.store.current().await
    }

    /// Install a token obtained elsewhere.
    pub async fn set_token(&self, token: Token) {
        self.store.set(token).await;
    }

    /// Run `op` with the default budget and no cancellation.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut(Token) -> Fut,
        Fut: Future<Output = dingtalk_auth::Result<T>>,
    {
        self.execute_with(self.budget, &CancellationToken::new(), op)
            .await
    }

    /// Run `op` with the current token, refreshing and retrying on expiry.
    ///
    /// `op` may be invoked up to `budget + 1` times. Cancellation is checked
    /// before each attempt and interrupts both the operation and any refresh
    /// wait; it always surfaces as `Error::Cancelled`.
    pub async fn execute_with<T, F, Fut>(
        &self,
        budget: u32,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut(Token) -> Fut,
        Fut: Future<Output = dingtalk_auth::Result<T>>,
    {
        self.check_credentials()?;

        let mut remaining = budget;
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let snapshot = self.store.snapshot().await;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                result = op(snapshot.token) => result,
            };

            let failure = match result {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt, "call succeeded after token refresh");
                    }
                    return Ok(value);
                }
                Err(CallError::Cancelled) => return Err(Error::Cancelled),
                Err(err) => self.classifier.classify(err),
            };
            metrics::record_call_error(failure.kind());

            if failure.kind() != ErrorKind::TokenExpired {
                debug!(attempt, kind = %failure.kind(), error = %failure, "call failed");
                return Err(Error::Call(failure));
            }
            if remaining == 0 {
                warn!(
                    attempt,
                    budget,
                    error = %failure,
                    "token still rejected, retry budget exhausted"
                );
                return Err(Error::Call(failure));
            }
            remaining -= 1;

            if self.store.generation().await != snapshot.generation {
                // Another caller's refresh already replaced the token this
                // attempt used; retry with it instead of refreshing again.
                debug!(attempt, "token replaced by concurrent refresh");
            } else {
                debug!(attempt, error = %failure, "token rejected, refreshing");
                match self.refresh(cancel).await {
                    Ok(_) => {}
                    Err(Error::Call(refresh)) => {
                        return Err(Error::RefreshFailed {
                            original: failure,
                            refresh,
                        });
                    }
                    Err(other) => return Err(other),
                }
            }

            metrics::record_retry();
            attempt += 1;
        }
    }

    /// Force a refresh, joining one already in flight for the same app.
    ///
    /// On success the new token is in the store before this returns, also
    /// when the refresh was started by another invoker sharing the
    /// coordinator.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<Token> {
        self.check_credentials()?;

        let before = self.store.generation().await;
        let endpoint = Arc::clone(&self.endpoint);
        let credentials = Arc::clone(&self.credentials);
        let store = Arc::clone(&self.store);
        let classifier = self.classifier.clone();

        let token = self
            .coordinator
            .refresh(&self.key, cancel, move || async move {
                match endpoint.fetch_token(&credentials).await {
                    Ok(token) => {
                        let generation = store.set(token.clone()).await;
                        info!(app_key = %credentials.app_key, generation, "access token refreshed");
                        Ok(token)
                    }
                    Err(err) => Err(classifier.classify(err)),
                }
            })
            .await?;

        // A refresh started through another invoker only wrote that invoker's
        // store; adopt its token unless this store changed in the meantime.
        if let Some(generation) = self.store.set_if_generation(before, token.clone()).await {
            debug!(generation, "adopted token from shared refresh");
        }
        Ok(token)
    }

    fn check_credentials(&self) -> Result<()> {
        self.credentials
            .validate()
            .map_err(|err| Error::Call(self.classifier.classify(err)))
    }
}
