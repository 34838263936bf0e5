//! Application credentials
//!
//! `Credentials` are fixed for the lifetime of a client. The app key doubles
//! as the identity used to deduplicate token refreshes, so two clients built
//! from the same app share refresh outcomes only if they share a coordinator.

use common::Secret;

use crate::error::{Error, Result};

/// App key and secret used to request an access token.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub app_key: String,
    pub app_secret: Secret<String>,
    /// Agent (micro-app) id, required by some messaging operations
    pub agent_id: Option<String>,
    /// Separate app used for login-by-code signature authentication
    pub login: Option<LoginCredentials>,
}

/// Credentials of the login (scan-to-login) app.
#[derive(Debug, Clone)]
pub struct LoginCredentials {
    pub app_id: String,
    pub app_secret: Secret<String>,
    pub callback_uri: Option<String>,
}

impl Credentials {
    pub fn new(app_key: impl Into<String>, app_secret: impl Into<Secret<String>>) -> Self {
        Self {
            app_key: app_key.into(),
            app_secret: app_secret.into(),
            agent_id: None,
            login: None,
        }
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_login(mut self, login: LoginCredentials) -> Self {
        self.login = Some(login);
        self
    }

    /// True when either the app key or the app secret is missing.
    pub fn is_empty(&self) -> bool {
        self.app_key.trim().is_empty() || self.app_secret.is_blank()
    }

    /// Reject empty credentials before any network traffic.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::InvalidCredentials("no app provided".into()));
        }
        Ok(())
    }

    /// Login app credentials, if configured and complete.
    pub fn login(&self) -> Result<&LoginCredentials> {
        match &self.login {
            Some(login) if !login.is_empty() => Ok(login),
            _ => Err(Error::InvalidCredentials("no login app provided".into())),
        }
    }
}

impl LoginCredentials {
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<Secret<String>>) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            callback_uri: None,
        }
    }

    pub fn with_callback_uri(mut self, uri: impl Into<String>) -> Self {
        self.callback_uri = Some(uri.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.app_id.trim().is_empty() || self.app_secret.is_blank()
    }
}
