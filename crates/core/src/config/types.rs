use serde::{Deserialize, Serialize};

/// Root of the rules file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,
    /// Evaluated in file order, first match wins.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// Policy applied when no rule matches.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DefaultsConfig {
    /// Category to assign (None leaves the torrent uncategorized).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Upload limit in KiB/s (0 = unlimited).
    #[serde(default)]
    pub up_limit_kib: u64,
}

/// A single tracker rule as written in the rules file.
///
/// Exactly one of `match` or `match_regex` must be set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    /// Exact tracker hostname.
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_host: Option<String>,
    /// Regular expression that must match the whole hostname.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_regex: Option<String>,
    pub category: String,
    /// Upload limit in KiB/s (0 = unlimited).
    #[serde(default)]
    pub up_limit_kib: u64,
}

/// qBittorrent WebUI connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QBittorrentConfig {
    /// WebUI base URL (e.g., "http://localhost:8080")
    #[serde(default = "default_url")]
    pub url: String,
    pub username: String,
    pub password: String,
    /// Per-request timeout in seconds, connect + read (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Skip TLS certificate verification.
    #[serde(default)]
    pub insecure: bool,
}

fn default_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout() -> u32 {
    30
}

/// Connection settings safe to log (password redacted).
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedClientConfig {
    pub url: String,
    pub username: String,
    pub password_configured: bool,
    pub timeout_secs: u32,
    pub insecure: bool,
}

impl From<&QBittorrentConfig> for SanitizedClientConfig {
    fn from(config: &QBittorrentConfig) -> Self {
        Self {
            url: config.url.clone(),
            username: config.username.clone(),
            password_configured: !config.password.is_empty(),
            timeout_secs: config.timeout_secs,
            insecure: config.insecure,
        }
    }
}
