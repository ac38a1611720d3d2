//! Types for the ingestion engine.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::rules::AppliedPolicy;
use crate::torrent_client::{AddTorrentRequest, TorrentClientError};
use crate::trackers::MagnetHint;

use super::policy::PolicyApplicationError;

/// Prefix of generated correlation tags.
pub const TAG_PREFIX: &str = "qbt-rules-";

/// Errors that end an ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The .torrent file could not be read. Nothing was submitted.
    #[error("cannot read torrent file {path}: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The client rejected the add request. No tag to clean up.
    #[error("torrent submission failed: {0}")]
    Submission(#[source] TorrentClientError),

    /// The torrent never appeared under its tag. It may still exist on the client.
    #[error("torrent with tag {tag} did not appear within {}s", timeout.as_secs_f32())]
    RegistrationTimeout { tag: String, timeout: Duration },

    /// The caller cancelled before the policy was applied. The torrent, if
    /// registered, is left paused.
    #[error("cancelled after {after} (tag {tag})")]
    Cancelled { tag: String, after: IngestStage },

    /// A client call failed after submission.
    #[error("{step} failed after {after}: {source}")]
    Transport {
        step: &'static str,
        after: IngestStage,
        #[source]
        source: TorrentClientError,
    },
}

impl IngestError {
    /// Last stage reached before the failure, if submission happened at all.
    pub fn stage_reached(&self) -> Option<IngestStage> {
        match self {
            IngestError::SourceUnreadable { .. } | IngestError::Submission(_) => None,
            IngestError::RegistrationTimeout { .. } => Some(IngestStage::Submitted),
            IngestError::Cancelled { after, .. } | IngestError::Transport { after, .. } => {
                Some(*after)
            }
        }
    }
}

/// Stages of an ingestion run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestStage {
    /// Added to the client, paused and tagged.
    Submitted,
    /// Found under its tag; hash known.
    Registered,
    /// Trackers read and a policy chosen.
    Classified,
    /// Policy application attempted (possibly partial).
    PolicyApplied,
    /// Tag removed and torrent resumed if requested.
    Finalized,
}

impl IngestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStage::Submitted => "submitted",
            IngestStage::Registered => "registered",
            IngestStage::Classified => "classified",
            IngestStage::PolicyApplied => "policy_applied",
            IngestStage::Finalized => "finalized",
        }
    }
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller wants ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentSource {
    Magnet(String),
    File(PathBuf),
}

impl TorrentSource {
    /// Magnet URIs are recognized by their `magnet:?` prefix; anything else is a path.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.starts_with("magnet:?") {
            TorrentSource::Magnet(trimmed.to_string())
        } else {
            TorrentSource::File(PathBuf::from(input))
        }
    }
}

impl fmt::Display for TorrentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorrentSource::Magnet(uri) => {
                let shown: String = uri.chars().take(60).collect();
                if shown.len() < uri.len() {
                    write!(f, "{}...", shown)
                } else {
                    f.write_str(&shown)
                }
            }
            TorrentSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A torrent source plus the correlation tag used to find it again.
#[derive(Debug, Clone)]
pub struct TorrentSubmission {
    source: TorrentSource,
    tag: String,
}

impl TorrentSubmission {
    /// New submission with a freshly generated tag.
    pub fn new(source: TorrentSource) -> Self {
        Self {
            source,
            tag: generate_tag(),
        }
    }

    /// Submission reusing a known tag (e.g. from an interrupted run).
    pub fn with_tag(source: TorrentSource, tag: impl Into<String>) -> Self {
        Self {
            source,
            tag: tag.into(),
        }
    }

    pub fn source(&self) -> &TorrentSource {
        &self.source
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Tracker hint from the magnet URI; None for files.
    pub fn hint(&self) -> Option<MagnetHint> {
        match &self.source {
            TorrentSource::Magnet(uri) => MagnetHint::parse(uri),
            TorrentSource::File(_) => None,
        }
    }

    /// Build the paused, tagged add request, reading the file if needed.
    pub async fn to_request(&self) -> Result<AddTorrentRequest, IngestError> {
        let request = match &self.source {
            TorrentSource::Magnet(uri) => AddTorrentRequest::magnet(uri.clone()),
            TorrentSource::File(path) => {
                let data = tokio::fs::read(path)
                    .await
                    .map_err(|source| IngestError::SourceUnreadable {
                        path: path.clone(),
                        source,
                    })?;
                let request = AddTorrentRequest::torrent_file(data);
                match path.file_name().and_then(|n| n.to_str()) {
                    Some(name) => request.with_filename(name),
                    None => request,
                }
            }
        };

        Ok(request.with_tag(self.tag.clone()).with_paused(true))
    }
}

/// Generate a unique correlation tag.
pub fn generate_tag() -> String {
    format!("{}{}", TAG_PREFIX, Uuid::new_v4())
}

/// Outcome of a successful ingestion run.
#[derive(Debug)]
pub struct IngestReport {
    /// Info hash of the ingested torrent.
    pub hash: String,
    pub name: String,
    /// Correlation tag used for the run (already removed unless listed in warnings).
    pub tag: String,
    /// Authoritative tracker hostnames used for classification.
    pub hosts: BTreeSet<String>,
    /// Hostnames seen in the magnet URI before submission.
    pub hinted_hosts: BTreeSet<String>,
    pub applied: AppliedPolicy,
    /// Policy steps that failed; the others were applied.
    pub policy_failures: Vec<PolicyApplicationError>,
    /// Non-fatal cleanup problems.
    pub warnings: Vec<String>,
    pub resumed: bool,
}

impl IngestReport {
    /// True when every policy step succeeded.
    pub fn policy_complete(&self) -> bool {
        self.policy_failures.is_empty()
    }

    /// One-line summary of what was applied and why.
    pub fn summary(&self) -> String {
        let hosts = if self.hosts.is_empty() {
            "none".to_string()
        } else {
            self.hosts.iter().cloned().collect::<Vec<_>>().join(", ")
        };
        format!("Applied: {}. Hosts: {}", self.applied, hosts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Policy, PolicySource};
    use std::io::Write;

    #[test]
    fn test_source_parse() {
        assert_eq!(
            TorrentSource::parse("magnet:?xt=urn:btih:abc"),
            TorrentSource::Magnet("magnet:?xt=urn:btih:abc".to_string())
        );
        assert_eq!(
            TorrentSource::parse("/downloads/file.torrent"),
            TorrentSource::File(PathBuf::from("/downloads/file.torrent"))
        );
        // No "?" after the scheme: treated as a path
        assert!(matches!(
            TorrentSource::parse("magnet:xt"),
            TorrentSource::File(_)
        ));
    }

    #[test]
    fn test_source_display_truncates_magnets() {
        let long = format!("magnet:?xt=urn:btih:{}", "a".repeat(100));
        let shown = TorrentSource::Magnet(long).to_string();
        assert!(shown.ends_with("..."));
        assert_eq!(shown.len(), 63);
    }

    #[test]
    fn test_generated_tags_are_unique() {
        let a = generate_tag();
        let b = generate_tag();
        assert!(a.starts_with(TAG_PREFIX));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_magnet_request_is_paused_and_tagged() {
        let submission = TorrentSubmission::with_tag(
            TorrentSource::parse("magnet:?xt=urn:btih:abc"),
            "qbt-rules-fixed",
        );
        let request = submission.to_request().await.unwrap();
        assert!(request.is_paused());
        assert_eq!(request.tags(), ["qbt-rules-fixed".to_string()]);
        assert!(submission.hint().is_some());
    }

    #[tokio::test]
    async fn test_file_request_reads_bytes() {
        let mut file = tempfile::Builder::new()
            .suffix(".torrent")
            .tempfile()
            .unwrap();
        file.write_all(b"d8:announce0:e").unwrap();

        let submission = TorrentSubmission::new(TorrentSource::File(file.path().to_path_buf()));
        assert!(submission.hint().is_none());

        match submission.to_request().await.unwrap() {
            AddTorrentRequest::TorrentFile {
                data,
                filename,
                paused,
                ..
            } => {
                assert_eq!(data, b"d8:announce0:e");
                assert!(filename.unwrap().ends_with(".torrent"));
                assert!(paused);
            }
            _ => panic!("Expected TorrentFile variant"),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_unreadable() {
        let submission =
            TorrentSubmission::new(TorrentSource::File(PathBuf::from("/nonexistent/x.torrent")));
        let err = submission.to_request().await.unwrap_err();
        assert!(matches!(err, IngestError::SourceUnreadable { .. }));
        assert_eq!(err.stage_reached(), None);
    }

    #[test]
    fn test_error_stage_reached() {
        let timeout = IngestError::RegistrationTimeout {
            tag: "t".to_string(),
            timeout: Duration::from_secs(20),
        };
        assert_eq!(timeout.stage_reached(), Some(IngestStage::Submitted));
        assert!(timeout.to_string().contains("20s"));

        let transport = IngestError::Transport {
            step: "get trackers",
            after: IngestStage::Registered,
            source: TorrentClientError::Timeout,
        };
        assert_eq!(transport.stage_reached(), Some(IngestStage::Registered));
        assert_eq!(
            transport.to_string(),
            "get trackers failed after registered: Request timeout"
        );

        let cancelled = IngestError::Cancelled {
            tag: "t".to_string(),
            after: IngestStage::Registered,
        };
        assert_eq!(cancelled.stage_reached(), Some(IngestStage::Registered));
        assert_eq!(cancelled.to_string(), "cancelled after registered (tag t)");
    }

    #[test]
    fn test_report_summary() {
        let report = IngestReport {
            hash: "abc".to_string(),
            name: "x".to_string(),
            tag: "qbt-rules-1".to_string(),
            hosts: ["b.example", "a.example"].iter().map(|s| s.to_string()).collect(),
            hinted_hosts: BTreeSet::new(),
            applied: AppliedPolicy {
                policy: Policy::new("Private", 500),
                source: PolicySource::Defaults,
            },
            policy_failures: vec![],
            warnings: vec![],
            resumed: true,
        };
        assert!(report.policy_complete());
        assert_eq!(
            report.summary(),
            "Applied: category=Private, up_limit_kib=500. Hosts: a.example, b.example"
        );
    }
}
