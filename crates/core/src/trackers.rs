//! Tracker hostname extraction.
//!
//! Hostnames come from two places. A magnet link's `tr=` parameters give an
//! early hint before submission, and trackers embedded in a `.torrent` file are
//! not visible that way. The client's tracker list for a registered torrent is
//! the authoritative source used for classification.

use std::collections::BTreeSet;

use tracing::debug;
use url::Url;

use crate::torrent_client::{TorrentClient, TorrentClientError, TrackerEntry};

/// Hostname of an announce URL: lowercased, without scheme, path or query.
///
/// The port is kept as `host:port` unless it is the scheme's default
/// (`http:80`, `https:443`). Returns None for pseudo entries
/// (`** [DHT] **`) and anything unparsable.
pub fn host_from_url(announce: &str) -> Option<String> {
    let url = Url::parse(announce.trim()).ok()?;
    let host = url.host_str()?.trim_end_matches('.');
    if host.is_empty() {
        return None;
    }
    let host = host.to_ascii_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}

/// Collect the unique hostnames of a list of announce URLs.
pub fn hosts_from_urls<I, S>(urls: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    urls.into_iter()
        .filter_map(|u| host_from_url(u.as_ref()))
        .collect()
}

/// Collect the unique hostnames of a torrent's tracker entries.
pub fn hosts_from_trackers(trackers: &[TrackerEntry]) -> BTreeSet<String> {
    hosts_from_urls(trackers.iter().map(|t| t.url.as_str()))
}

/// Ask the client for a registered torrent's trackers and extract their hostnames.
pub async fn resolve_hosts(
    client: &dyn TorrentClient,
    hash: &str,
) -> Result<BTreeSet<String>, TorrentClientError> {
    let trackers = client.get_trackers(hash).await?;
    let hosts = hosts_from_trackers(&trackers);
    debug!(
        hash,
        entries = trackers.len(),
        hosts = hosts.len(),
        "Resolved tracker hosts"
    );
    Ok(hosts)
}

/// What a magnet URI reveals before submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MagnetHint {
    /// `xt=urn:btih:` value, lowercased.
    pub info_hash: Option<String>,
    /// `dn=` display name.
    pub display_name: Option<String>,
    /// Hostnames of every `tr=` parameter.
    pub tracker_hosts: BTreeSet<String>,
}

impl MagnetHint {
    /// Parse a magnet URI. Returns None if it is not a `magnet:` URI at all.
    pub fn parse(uri: &str) -> Option<Self> {
        let url = Url::parse(uri.trim()).ok()?;
        if url.scheme() != "magnet" {
            return None;
        }

        let mut hint = MagnetHint::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "xt" => {
                    if let Some(hash) = value.strip_prefix("urn:btih:") {
                        hint.info_hash.get_or_insert_with(|| hash.to_lowercase());
                    }
                }
                "dn" => {
                    hint.display_name.get_or_insert_with(|| value.to_string());
                }
                "tr" => {
                    if let Some(host) = host_from_url(&value) {
                        hint.tracker_hosts.insert(host);
                    }
                }
                _ => {}
            }
        }

        Some(hint)
    }
}
