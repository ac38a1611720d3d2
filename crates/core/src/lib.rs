pub mod config;
pub mod ingest;
pub mod rules;
pub mod testing;
pub mod torrent_client;
pub mod trackers;

pub use config::{
    load_rules_config, load_rules_config_from_str, validate_rules_config, ConfigError,
    DefaultsConfig, QBittorrentConfig, RuleConfig, RulesConfig, RulesFormat,
    SanitizedClientConfig,
};
pub use ingest::{
    IngestConfig, IngestError, IngestReport, IngestStage, Ingestor, PolicyApplicationError,
    PolicyApplier, PolicyStep, RegistrationWaiter, TorrentSource, TorrentSubmission,
};
pub use rules::{AppliedPolicy, MatchKind, Policy, PolicySource, Rule, RuleSet};
pub use torrent_client::{
    AddTorrentRequest, QBittorrentClient, TorrentClient, TorrentClientError, TorrentFilters,
    TorrentInfo, TrackerEntry, UploadLimit,
};
pub use trackers::{host_from_url, hosts_from_trackers, resolve_hosts, MagnetHint};
