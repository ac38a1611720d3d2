//! Testing utilities and a mock torrent client.
//!
//! The mock behaves like a qBittorrent daemon closely enough to exercise the
//! full ingestion flow without a running client.
//!
//! # Example
//!
//! ```rust,ignore
//! use qbtrules_core::testing::{fixtures, MockRegistration, MockTorrentClient};
//!
//! let client = Arc::new(MockTorrentClient::new());
//! client.set_registration(MockRegistration::AfterPolls(2)).await;
//!
//! let rules = RuleSet::from_config(&load_rules_config_from_str(fixtures::RULES_YAML, RulesFormat::Yaml)?)?;
//! let ingestor = Ingestor::new(client.clone(), Arc::new(rules), IngestConfig::default());
//! ```

mod mock_torrent_client;

pub use mock_torrent_client::{
    MockOperation, MockRegistration, MockTorrentClient, RecordedAddTorrent, RecordedCall,
};

/// Test fixtures and helper functions.
pub mod fixtures {
    /// Info hash of the first sample torrent.
    pub const HASH_A: &str = "0123456789abcdef0123456789abcdef01234567";

    /// Info hash of the second sample torrent.
    pub const HASH_B: &str = "89abcdef0123456789abcdef0123456789abcdef";

    /// A rules file covering an exact host, a regex and the fallback.
    pub const RULES_YAML: &str = r#"
defaults:
  category: Public
  up_limit_kib: 0
rules:
  - match: tracker.private.example
    category: Private
    up_limit_kib: 500
  - match_regex: '.*\.racing\.example'
    category: Racing
    up_limit_kib: 2048
"#;

    /// Build a magnet URI for `hash` with percent-encoded `tr=` parameters.
    pub fn magnet(hash: &str, trackers: &[&str]) -> String {
        let mut uri = format!("magnet:?xt=urn:btih:{}", hash);
        for tracker in trackers {
            uri.push_str("&tr=");
            uri.push_str(&urlencoding::encode(tracker));
        }
        uri
    }

    /// Same as [`magnet`] with a `dn=` display name.
    pub fn named_magnet(hash: &str, name: &str, trackers: &[&str]) -> String {
        let mut uri = magnet(hash, trackers);
        uri.push_str("&dn=");
        uri.push_str(&urlencoding::encode(name));
        uri
    }
}
