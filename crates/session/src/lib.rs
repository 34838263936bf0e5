//! Token lifecycle for DingTalk open API calls
//!
//! Keeps one access token per client, runs operations with it, and refreshes
//! it when the service reports it expired. Concurrent callers that hit the
//! same expiry share a single refresh.
//!
//! Call lifecycle:
//! 1. `RetryingInvoker::execute` reads the current token from `TokenStore`
//! 2. The operation fails → `ErrorClassifier` decides what the failure means
//! 3. `TokenExpired` → `RefreshCoordinator` fetches (or joins a fetch of) a new
//!    token, the store is updated, and the operation runs again
//! 4. Any other kind, or an exhausted retry budget → returned to the caller

pub mod classify;
pub mod coordinator;
pub mod error;
pub mod invoker;
pub mod metrics;
pub mod store;

pub use classify::{ClassifiedError, DEFAULT_RULES, ErrorClassifier, ErrorKind, Rule};
pub use coordinator::{RefreshCoordinator, RefreshKey, RefreshOutcome};
pub use error::{Error, Result};
pub use invoker::{DEFAULT_RETRY_BUDGET, RetryingInvoker};
pub use store::{TokenSnapshot, TokenStore};
