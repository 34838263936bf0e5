//! DingTalk probe
//!
//! Command-line client for the DingTalk open API:
//! 1. Loads app credentials from config (secrets from env or files)
//! 2. Runs one call through `dingtalk-client`, refreshing the token on expiry
//! 3. Prints the result as JSON on stdout; logs go to stderr
//! 4. SIGINT/SIGTERM cancel the call in flight

mod config;
mod metrics;

use anyhow::{Context, Result, bail};
use dingtalk_client::Client;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

const USAGE: &str = "usage: dingtalk-probe [--config PATH] [--metrics] \
<token | count [--active] | user <userid> [--language LANG] | union <unionid> | login <code>>";

/// One API call to run.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Token,
    Count { active: bool },
    User { userid: String, language: Option<String> },
    Union { unionid: String },
    Login { code: String },
}

/// Parsed command line.
#[derive(Debug, PartialEq, Eq)]
struct Cli {
    config: Option<String>,
    metrics: bool,
    command: Command,
}

/// Parse arguments (without the program name).
fn parse_args(args: &[String]) -> Result<Cli> {
    let mut config = None;
    let mut metrics = false;
    let mut active = false;
    let mut language = None;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => config = Some(iter.next().context("--config requires a path")?.clone()),
            "--metrics" => metrics = true,
            "--active" => active = true,
            "--language" => {
                language = Some(iter.next().context("--language requires a value")?.clone())
            }
            other if other.starts_with("--") => bail!("unknown option {other}\n{USAGE}"),
            other => positional.push(other),
        }
    }

    let command = match positional.as_slice() {
        ["token"] => Command::Token,
        ["count"] => Command::Count { active },
        ["user", userid] => Command::User {
            userid: userid.to_string(),
            language,
        },
        ["union", unionid] => Command::Union {
            unionid: unionid.to_string(),
        },
        ["login", code] => Command::Login {
            code: code.to_string(),
        },
        _ => bail!("{USAGE}"),
    };

    Ok(Cli {
        config,
        metrics,
        command,
    })
}

/// Run `command` and return its JSON rendering.
async fn run(client: &Client, command: &Command) -> Result<Value> {
    let value = match command {
        Command::Token => {
            let token = client.access_token().await?;
            json!({ "access_token": token.as_str() })
        }
        Command::Count { active } => json!({ "count": client.org_user_count(*active).await? }),
        Command::User { userid, language } => {
            serde_json::to_value(client.user(userid, language.as_deref()).await?)?
        }
        Command::Union { unionid } => serde_json::to_value(client.user_by_union_id(unionid).await?)?,
        Command::Login { code } => serde_json::to_value(client.user_info_by_code(code).await?)?,
    };
    Ok(value)
}

fn is_cancelled(err: &anyhow::Error) -> bool {
    err.downcast_ref::<dingtalk_session::Error>()
        .is_some_and(dingtalk_session::Error::is_cancelled)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support.
    // Logs go to stderr so stdout carries only the result.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_args(&args)?;

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus = if cli.metrics {
        Some(metrics::install_recorder().context("failed to install Prometheus recorder")?)
    } else {
        None
    };

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.dingtalk.base_url,
        app_key = %config.dingtalk.app_key,
        retry_budget = config.dingtalk.retry_budget,
        login = config.login.is_some(),
        "configuration loaded"
    );

    let credentials = config.credentials().context("incomplete app credentials")?;
    let cancel = CancellationToken::new();
    let client = Client::new(credentials, config.client_options())
        .context("failed to build DingTalk client")?
        .with_cancellation(cancel.clone());

    tokio::spawn(async move {
        shutdown_signal().await;
        cancel.cancel();
    });

    let result = run(&client, &cli.command).await;

    if let Some(handle) = prometheus {
        eprintln!("{}", handle.render());
    }

    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(err) if is_cancelled(&err) => {
            warn!("call cancelled before completion");
            Err(err)
        }
        Err(err) => {
            error!(error = %err, command = ?cli.command, "call failed");
            Err(err)
        }
    }
}

/// Wait for SIGTERM or SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, cancelling"),
        _ = terminate => info!("received SIGTERM, cancelling"),
    }
}
