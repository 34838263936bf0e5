//! Shared access token cache
//!
//! Holds the single current token for one client instance. Reads take a
//! shared lock, writes an exclusive one; neither is held past the copy in
//! or out. Each write bumps a generation counter so a caller can tell
//! whether the token changed since it last looked.

use dingtalk_auth::Token;
use tokio::sync::RwLock;
use tracing::debug;

/// Token value together with the generation it was written at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSnapshot {
    pub token: Token,
    /// 0 until the first `set`, then incremented by each one
    pub generation: u64,
}

/// Thread-safe holder of the current access token.
#[derive(Debug, Default)]
pub struct TokenStore {
    state: RwLock<TokenSnapshot>,
}

impl TokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current token; empty if no refresh has succeeded yet.
    pub async fn current(&self) -> Token {
        self.state.read().await.token.clone()
    }

    pub async fn snapshot(&self) -> TokenSnapshot {
        self.state.read().await.clone()
    }

    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    /// Replace the token. Returns the new generation.
    pub async fn set(&self, token: Token) -> u64 {
        let mut state = self.state.write().await;
        state.token = token;
        state.generation += 1;
        debug!(generation = state.generation, "access token updated");
        state.generation
    }

    /// Replace the token only if no write happened since `generation`.
    ///
    /// Returns the new generation, or `None` when the store moved on.
    pub async fn set_if_generation(&self, generation: u64, token: Token) -> Option<u64> {
        let mut state = self.state.write().await;
        if state.generation != generation {
            return None;
        }
        state.token = token;
        state.generation += 1;
        debug!(generation = state.generation, "access token updated");
        Some(state.generation)
    }
}
