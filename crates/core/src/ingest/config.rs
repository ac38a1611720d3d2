//! Ingestion configuration.

use std::time::Duration;

/// Configuration for a single ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// How long to wait for the submitted torrent to show up under its tag (seconds).
    pub registration_timeout_secs: u64,

    /// Delay between registration polls (milliseconds).
    pub poll_interval_ms: u64,

    /// Resume the torrent once policy is applied.
    /// When disabled the torrent stays paused for manual review.
    pub resume: bool,
}

const DEFAULT_REGISTRATION_TIMEOUT_SECS: u64 = 20;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

impl IngestConfig {
    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.registration_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        // A zero interval would spin against the WebUI.
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            registration_timeout_secs: DEFAULT_REGISTRATION_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            resume: true,
        }
    }
}
