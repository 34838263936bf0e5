//! Deduplication of concurrent token refreshes
//!
//! For a given key at most one refresh is in flight. The first caller starts
//! it; callers arriving while it runs attach to the same pending outcome and
//! every one of them receives a clone of it.
//!
//! The refresh future runs as its own task, so a waiter that gives up (or is
//! cancelled) never aborts the refresh the others are waiting on. The task
//! clears its registry entry before publishing the outcome, which means the
//! next expiry after completion starts a fresh refresh rather than replaying
//! a stale result.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dingtalk_auth::{Credentials, Error as CallError, Token};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::classify::{ClassifiedError, ErrorKind};
use crate::error::{Error, Result};
use crate::metrics;

/// Identity scoping refresh deduplication: the app key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefreshKey(String);

impl RefreshKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&Credentials> for RefreshKey {
    fn from(credentials: &Credentials) -> Self {
        Self::new(credentials.app_key.clone())
    }
}

impl fmt::Display for RefreshKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome shared with every caller attached to one refresh.
pub type RefreshOutcome = std::result::Result<Token, ClassifiedError>;

type Pending = watch::Receiver<Option<RefreshOutcome>>;
type Registry = Arc<Mutex<HashMap<RefreshKey, Pending>>>;

/// Keyed registry of in-flight refreshes.
///
/// The registry lock is only taken to look up, insert, or remove an entry
/// and is never held across an await.
#[derive(Debug, Default)]
pub struct RefreshCoordinator {
    in_flight: Registry,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a refresh for `key` is currently running.
    pub fn in_flight(&self, key: &RefreshKey) -> bool {
        lock(&self.in_flight).contains_key(key)
    }

    /// Refresh the token for `key`, or wait for the refresh already running.
    ///
    /// `refresh_fn` is only invoked when this caller starts the refresh. A
    /// failed refresh is delivered to every waiter as `Error::Call`; nothing
    /// is retried here. Cancelling `cancel` returns `Error::Cancelled` for
    /// this caller only.
    pub async fn refresh<F, Fut>(
        &self,
        key: &RefreshKey,
        cancel: &CancellationToken,
        refresh_fn: F,
    ) -> Result<Token>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshOutcome> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut pending = self.join_or_start(key, refresh_fn);

        let published = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(key = %key, "stopped waiting for token refresh (cancelled)");
                return Err(Error::Cancelled);
            }
            published = wait_published(&mut pending) => published,
        };

        match published {
            Some(Ok(token)) => Ok(token),
            Some(Err(err)) => Err(Error::Call(err)),
            None => Err(Error::Call(ClassifiedError::new(
                ErrorKind::Transport,
                CallError::Http("token refresh task aborted".into()),
            ))),
        }
    }

    fn join_or_start<F, Fut>(&self, key: &RefreshKey, refresh_fn: F) -> Pending
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshOutcome> + Send + 'static,
    {
        let (tx, rx) = {
            let mut in_flight = lock(&self.in_flight);
            if let Some(pending) = in_flight.get(key) {
                debug!(key = %key, "joining in-flight token refresh");
                metrics::record_refresh_joined();
                return pending.clone();
            }
            let (tx, rx) = watch::channel(None);
            in_flight.insert(key.clone(), rx.clone());
            (tx, rx)
        };

        debug!(key = %key, "starting token refresh");
        // Created before the refresh runs so the entry is cleared even if
        // `refresh_fn` or the refresh future panics.
        let entry = InFlightEntry {
            registry: Arc::clone(&self.in_flight),
            key: key.clone(),
        };
        let refresh = refresh_fn();
        let key = key.clone();
        tokio::spawn(async move {
            let outcome = refresh.await;
            drop(entry);
            match &outcome {
                Ok(_) => metrics::record_refresh("success"),
                Err(err) => {
                    warn!(key = %key, error = %err, "token refresh failed");
                    metrics::record_refresh("failure");
                }
            }
            tx.send_replace(Some(outcome));
        });
        rx
    }
}

/// Removes a registry entry when the refresh that owns it finishes.
struct InFlightEntry {
    registry: Registry,
    key: RefreshKey,
}

impl Drop for InFlightEntry {
    fn drop(&mut self) {
        lock(&self.registry).remove(&self.key);
    }
}

fn lock(registry: &Mutex<HashMap<RefreshKey, Pending>>) -> MutexGuard<'_, HashMap<RefreshKey, Pending>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn wait_published(pending: &mut Pending) -> Option<RefreshOutcome> {
    pending
        .wait_for(Option::is_some)
        .await
        .ok()
        .and_then(|published| published.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dingtalk_auth::RemoteError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    type RefreshFuture = std::pin::Pin<Box<dyn Future<Output = RefreshOutcome> + Send>>;

    /// Refresh function that counts invocations and resolves once `gate` is notified.
    fn gated(
        calls: Arc<AtomicUsize>,
        gate: Arc<Notify>,
        outcome: RefreshOutcome,
    ) -> impl FnOnce() -> RefreshFuture {
        move || -> RefreshFuture {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                gate.notified().await;
                outcome
            })
        }
    }

    fn invalid_credentials() -> ClassifiedError {
        ClassifiedError::new(
            ErrorKind::InvalidCredentials,
            CallError::Remote(RemoteError::new(40089, "invalid appkey")),
        )
    }

    async fn exploding_refresh() -> RefreshOutcome {
        panic!("token endpoint blew up");
    }

    /// Poll until `key` shows up in the registry.
    async fn wait_in_flight(coordinator: &RefreshCoordinator, key: &RefreshKey) {
        for _ in 0..200 {
            if coordinator.in_flight(key) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("refresh for {key} never started");
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let key = RefreshKey::new("k");
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                let key = key.clone();
                let refresh = gated(Arc::clone(&calls), Arc::clone(&gate), Ok(Token::new("T1")));
                tokio::spawn(async move {
                    coordinator
                        .refresh(&key, &CancellationToken::new(), refresh)
                        .await
                })
            })
            .collect();

        wait_in_flight(&coordinator, &key).await;
        // Let every waiter attach before the refresh completes
        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.notify_one();

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap().unwrap(), Token::new("T1"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!coordinator.in_flight(&key));
    }

    #[tokio::test]
    async fn failure_is_delivered_to_every_waiter() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let key = RefreshKey::new("k");
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                let key = key.clone();
                let refresh = gated(Arc::clone(&calls), Arc::clone(&gate), Err(invalid_credentials()));
                tokio::spawn(async move {
                    coordinator
                        .refresh(&key, &CancellationToken::new(), refresh)
                        .await
                })
            })
            .collect();

        wait_in_flight(&coordinator, &key).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.notify_one();

        for waiter in waiters {
            let err = waiter.await.unwrap().unwrap_err();
            assert_eq!(err.kind(), Some(ErrorKind::InvalidCredentials));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn completed_refresh_is_not_replayed() {
        let coordinator = RefreshCoordinator::new();
        let key = RefreshKey::new("k");
        let calls = Arc::new(AtomicUsize::new(0));

        for expected in ["T1", "T2"] {
            let calls = Arc::clone(&calls);
            let token = coordinator
                .refresh(&key, &CancellationToken::new(), move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(Token::new(expected)) }
                })
                .await
                .unwrap();
            assert_eq!(token, Token::new(expected));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn different_keys_are_not_coalesced() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let gate_a = Arc::new(Notify::new());
        let gate_b = Arc::new(Notify::new());

        let a = {
            let coordinator = Arc::clone(&coordinator);
            let refresh = gated(Arc::clone(&calls), Arc::clone(&gate_a), Ok(Token::new("A")));
            tokio::spawn(async move {
                coordinator
                    .refresh(&RefreshKey::new("app-a"), &CancellationToken::new(), refresh)
                    .await
            })
        };
        let b = {
            let coordinator = Arc::clone(&coordinator);
            let refresh = gated(Arc::clone(&calls), Arc::clone(&gate_b), Ok(Token::new("B")));
            tokio::spawn(async move {
                coordinator
                    .refresh(&RefreshKey::new("app-b"), &CancellationToken::new(), refresh)
                    .await
            })
        };

        wait_in_flight(&coordinator, &RefreshKey::new("app-a")).await;
        wait_in_flight(&coordinator, &RefreshKey::new("app-b")).await;
        gate_a.notify_one();
        gate_b.notify_one();

        assert_eq!(a.await.unwrap().unwrap(), Token::new("A"));
        assert_eq!(b.await.unwrap().unwrap(), Token::new("B"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelled_waiter_leaves_refresh_running_for_others() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let key = RefreshKey::new("k");
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        // The initiator is the one that gets cancelled
        let initiator = {
            let coordinator = Arc::clone(&coordinator);
            let key = key.clone();
            let cancel = cancel.clone();
            let refresh = gated(Arc::clone(&calls), Arc::clone(&gate), Ok(Token::new("T1")));
            tokio::spawn(async move { coordinator.refresh(&key, &cancel, refresh).await })
        };
        wait_in_flight(&coordinator, &key).await;

        let other = {
            let coordinator = Arc::clone(&coordinator);
            let key = key.clone();
            let refresh = gated(Arc::clone(&calls), Arc::clone(&gate), Ok(Token::new("unused")));
            tokio::spawn(async move {
                coordinator
                    .refresh(&key, &CancellationToken::new(), refresh)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        cancel.cancel();
        assert!(initiator.await.unwrap().unwrap_err().is_cancelled());
        assert!(coordinator.in_flight(&key), "refresh must survive cancellation");

        gate.notify_one();
        assert_eq!(other.await.unwrap().unwrap(), Token::new("T1"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!coordinator.in_flight(&key));
    }

    #[tokio::test]
    async fn cancelled_caller_never_starts_refresh() {
        let coordinator = RefreshCoordinator::new();
        let key = RefreshKey::new("k");
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = coordinator
            .refresh(&key, &cancel, gated(Arc::clone(&calls), Arc::clone(&gate), Ok(Token::new("T1"))))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!coordinator.in_flight(&key));
    }

    #[tokio::test]
    async fn panicking_refresh_clears_registry() {
        let coordinator = RefreshCoordinator::new();
        let key = RefreshKey::new("k");

        let err = coordinator
            .refresh(&key, &CancellationToken::new(), exploding_refresh)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Transport));
        assert!(err.to_string().contains("aborted"), "got {err}");
        assert!(!coordinator.in_flight(&key));

        let token = coordinator
            .refresh(&key, &CancellationToken::new(), || async {
                Ok(Token::new("T2"))
            })
            .await
            .unwrap();
        assert_eq!(token, Token::new("T2"));
    }

    #[test]
    fn refresh_key_comes_from_app_key() {
        let key = RefreshKey::from(&Credentials::new("ding-app", "s"));
        assert_eq!(key.as_str(), "ding-app");
        assert_eq!(key.to_string(), "ding-app");
    }
}
