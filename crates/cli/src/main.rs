//! qbt-add: add a torrent to qBittorrent and apply the category and upload
//! limit chosen by its trackers.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use thiserror::Error;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qbtrules_core::{
    load_rules_config, ConfigError, IngestConfig, IngestError, Ingestor, QBittorrentClient,
    QBittorrentConfig, RuleSet, SanitizedClientConfig, TorrentSource, TorrentSubmission,
};

/// Exit status for timeouts, submission and transport failures.
const EXIT_FAILURE: u8 = 1;
/// Exit status for configuration and usage errors.
const EXIT_USAGE: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "qbt-add", version)]
#[command(about = "Add a torrent to qBittorrent with category and upload limit chosen by tracker")]
struct Cli {
    /// Magnet URI or path to a .torrent file
    source: String,

    /// qBittorrent WebUI URL
    #[arg(long, env = "QBT_HOST", default_value = "http://localhost:8080")]
    host: String,

    /// WebUI username
    #[arg(long, env = "QBT_USERNAME")]
    username: Option<String>,

    /// WebUI password
    #[arg(long, env = "QBT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Rules file (YAML, or TOML with a .toml extension)
    #[arg(long, env = "QBT_RULES_FILE", default_value = "rules.yaml")]
    config: PathBuf,

    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,

    /// Leave the torrent paused after applying the policy
    #[arg(long)]
    no_unpause: bool,

    /// Seconds to wait for the torrent to appear on the client
    #[arg(long, default_value_t = 20)]
    timeout: u64,

    /// Delay between registration polls, in milliseconds
    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Per-request timeout for WebUI calls, in seconds
    #[arg(long, default_value_t = 30)]
    request_timeout: u32,

    /// Correlation tag to use instead of a generated one
    #[arg(long)]
    tag: Option<String>,
}

/// Invocation problems detected before anything is contacted.
#[derive(Debug, Error)]
enum UsageError {
    #[error("missing qBittorrent username (--username or QBT_USERNAME)")]
    MissingUsername,

    #[error("missing qBittorrent password (--password or QBT_PASSWORD)")]
    MissingPassword,
}

impl Cli {
    fn client_config(&self) -> Result<QBittorrentConfig, UsageError> {
        let username = self
            .username
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or(UsageError::MissingUsername)?;
        let password = self
            .password
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or(UsageError::MissingPassword)?;

        Ok(QBittorrentConfig {
            url: self.host.trim_end_matches('/').to_string(),
            username,
            password,
            timeout_secs: self.request_timeout,
            insecure: self.insecure,
        })
    }

    fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            registration_timeout_secs: self.timeout,
            poll_interval_ms: self.poll_interval_ms,
            resume: !self.no_unpause,
        }
    }

    fn submission(&self) -> TorrentSubmission {
        let source = TorrentSource::parse(&self.source);
        match &self.tag {
            Some(tag) => TorrentSubmission::with_tag(source, tag.clone()),
            None => TorrentSubmission::new(source),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only the summary line.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client_config = cli.client_config()?;

    let rules_config = load_rules_config(&cli.config)
        .with_context(|| format!("Failed to load rules from {:?}", cli.config))?;
    let rules = RuleSet::from_config(&rules_config).context("Invalid rules")?;
    info!(path = ?cli.config, rules = rules.len(), "Rules loaded");

    info!(client = ?SanitizedClientConfig::from(&client_config), "Connecting to qBittorrent");
    let client =
        QBittorrentClient::new(client_config).context("Failed to create qBittorrent client")?;
    client.login().await.context("qBittorrent login failed")?;

    let ingestor = Ingestor::new(Arc::new(client), Arc::new(rules), cli.ingest_config());
    let submission = cli.submission();

    // Honored until the policy is applied; cleanup and resume always run.
    let cancel = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        info!("Interrupted, cleaning up");
    };

    let report = ingestor
        .ingest_until(&submission, cancel)
        .await
        .with_context(|| format!("Failed to add {}", submission.source()))?;

    for failure in &report.policy_failures {
        warn!(hash = %report.hash, "{}", failure);
    }
    for warning in &report.warnings {
        warn!(hash = %report.hash, "{}", warning);
    }
    if !report.policy_complete() {
        warn!(
            hash = %report.hash,
            failed = report.policy_failures.len(),
            "Policy only partially applied"
        );
    }

    println!("{}", report.summary());
    Ok(())
}

/// Map a failure to the process exit status.
fn exit_code(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<UsageError>().is_some() || err.downcast_ref::<ConfigError>().is_some() {
        return EXIT_USAGE;
    }
    match err.downcast_ref::<IngestError>() {
        Some(IngestError::SourceUnreadable { .. }) => EXIT_USAGE,
        _ => EXIT_FAILURE,
    }
}
