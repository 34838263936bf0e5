//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! App secrets are loaded from DINGTALK_APP_SECRET / DINGTALK_LOGIN_APP_SECRET
//! or from the `*_file` options, never stored in the TOML directly.

use common::Secret;
use dingtalk_auth::{Credentials, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS, LoginCredentials};
use dingtalk_client::ClientOptions;
use dingtalk_session::DEFAULT_RETRY_BUDGET;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_SECRET_ENV: &str = "DINGTALK_APP_SECRET";
pub const LOGIN_APP_SECRET_ENV: &str = "DINGTALK_LOGIN_APP_SECRET";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub dingtalk: DingtalkConfig,
    #[serde(default)]
    pub login: Option<LoginConfig>,
}

/// Enterprise app used for token-authenticated calls
#[derive(Debug, Deserialize)]
pub struct DingtalkConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub app_key: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(skip)]
    pub app_secret: Option<Secret<String>>,
    /// Path to a file containing the app secret (alternative to DINGTALK_APP_SECRET)
    #[serde(default)]
    pub app_secret_file: Option<PathBuf>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
}

/// Login app used for auth-code lookups
#[derive(Debug, Deserialize)]
pub struct LoginConfig {
    pub app_id: String,
    #[serde(skip)]
    pub app_secret: Option<Secret<String>>,
    #[serde(default)]
    pub app_secret_file: Option<PathBuf>,
    #[serde(default)]
    pub callback_uri: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_retry_budget() -> u32 {
    DEFAULT_RETRY_BUDGET
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Secret resolution order, for both apps:
    /// 1. environment variable
    /// 2. `app_secret_file` path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        let dingtalk = &mut config.dingtalk;
        if !dingtalk.base_url.starts_with("http://") && !dingtalk.base_url.starts_with("https://") {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                dingtalk.base_url
            )));
        }
        if dingtalk.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if dingtalk.app_key.trim().is_empty() {
            return Err(common::Error::Config("app_key must not be empty".into()));
        }

        dingtalk.app_secret = Some(
            resolve_secret(APP_SECRET_ENV, dingtalk.app_secret_file.as_deref())?
                .ok_or(common::Error::MissingSecret(APP_SECRET_ENV))?,
        );

        if let Some(login) = config.login.as_mut() {
            if login.app_id.trim().is_empty() {
                return Err(common::Error::Config(
                    "login.app_id must not be empty".into(),
                ));
            }
            login.app_secret = Some(
                resolve_secret(LOGIN_APP_SECRET_ENV, login.app_secret_file.as_deref())?
                    .ok_or(common::Error::MissingSecret(LOGIN_APP_SECRET_ENV))?,
            );
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("dingtalk-probe.toml")
    }

    /// App credentials, including the login app when configured.
    pub fn credentials(&self) -> common::Result<Credentials> {
        let secret = self
            .dingtalk
            .app_secret
            .clone()
            .ok_or(common::Error::MissingSecret(APP_SECRET_ENV))?;
        let mut credentials = Credentials::new(self.dingtalk.app_key.clone(), secret);
        if let Some(agent_id) = &self.dingtalk.agent_id {
            credentials = credentials.with_agent_id(agent_id.clone());
        }

        if let Some(login) = &self.login {
            let secret = login
                .app_secret
                .clone()
                .ok_or(common::Error::MissingSecret(LOGIN_APP_SECRET_ENV))?;
            let mut login_credentials = LoginCredentials::new(login.app_id.clone(), secret);
            if let Some(uri) = &login.callback_uri {
                login_credentials = login_credentials.with_callback_uri(uri.clone());
            }
            credentials = credentials.with_login(login_credentials);
        }

        Ok(credentials)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.dingtalk.base_url.clone(),
            timeout: Duration::from_secs(self.dingtalk.timeout_secs),
            retry_budget: self.dingtalk.retry_budget,
        }
    }
}

/// Read a secret from `env`, falling back to `file`. Blank values count as unset.
fn resolve_secret(env: &str, file: Option<&Path>) -> common::Result<Option<Secret<String>>> {
    if let Ok(value) = std::env::var(env) {
        let value = value.trim();
        if !value.is_empty() {
            return Ok(Some(Secret::new(value.to_owned())));
        }
    }

    let Some(path) = file else {
        return Ok(None);
    };
    let value = std::fs::read_to_string(path).map_err(|e| {
        common::Error::Config(format!(
            "failed to read secret file {}: {e}",
            path.display()
        ))
    })?;
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    Ok(Some(Secret::new(value.to_owned())))
}
