//! Ingestion orchestrator.
//!
//! Drives one torrent through the stages:
//! submitted -> registered -> classified -> policy applied -> finalized
//!
//! The correlation tag is detached and deleted on success and on every failure after a
//! successful submission.

use std::collections::BTreeSet;
use std::future::{pending, Future};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::rules::{AppliedPolicy, RuleSet};
use crate::torrent_client::{TorrentClient, TorrentFilters};
use crate::trackers::resolve_hosts;

use super::config::IngestConfig;
use super::policy::{PolicyApplicationError, PolicyApplier};
use super::types::{IngestError, IngestReport, IngestStage, TorrentSubmission};
use super::waiter::RegistrationWaiter;

/// Adds torrents to the client and applies the matching tracker policy.
pub struct Ingestor {
    client: Arc<dyn TorrentClient>,
    rules: Arc<RuleSet>,
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(client: Arc<dyn TorrentClient>, rules: Arc<RuleSet>, config: IngestConfig) -> Self {
        Self {
            client,
            rules,
            config,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingest one torrent, waiting for registration up to the configured timeout.
    pub async fn ingest(&self, submission: &TorrentSubmission) -> Result<IngestReport, IngestError> {
        self.ingest_until(submission, pending()).await
    }

    /// Like [`Ingestor::ingest`], but the run is abandoned when `cancel`
    /// completes before the policy is applied. The tag is still released and
    /// the torrent stays paused.
    pub async fn ingest_until<F>(
        &self,
        submission: &TorrentSubmission,
        cancel: F,
    ) -> Result<IngestReport, IngestError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        let tag = submission.tag();
        let hinted_hosts = submission
            .hint()
            .map(|h| h.tracker_hosts)
            .unwrap_or_default();

        let request = submission.to_request().await?;

        info!(
            tag,
            source = %submission.source(),
            client = self.client.name(),
            "Submitting torrent (paused)"
        );
        self.client
            .add_torrent(request)
            .await
            .map_err(IngestError::Submission)?;
        debug!(tag, stage = %IngestStage::Submitted, "Stage reached");

        let waiter = RegistrationWaiter::new(
            self.client.as_ref(),
            self.config.registration_timeout(),
            self.config.poll_interval(),
        );
        let torrent = match waiter.wait(tag, cancel.as_mut()).await {
            Ok(torrent) => torrent,
            Err(e) => {
                warn!(tag, error = %e, "Torrent did not register");
                self.release_tag_by_lookup(tag).await;
                return Err(e);
            }
        };
        let hash = torrent.hash.clone();
        info!(tag, hash = %hash, name = %torrent.name, stage = %IngestStage::Registered, "Torrent registered");

        let outcome = tokio::select! {
            biased;
            _ = cancel.as_mut() => Err(IngestError::Cancelled {
                tag: tag.to_string(),
                after: IngestStage::Registered,
            }),
            outcome = self.classify_and_apply(&hash, &hinted_hosts) => outcome,
        };
        let (hosts, applied, policy_failures) = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(tag, hash = %hash, error = %e, "Leaving torrent paused");
                self.release_tag(&hash, tag).await;
                return Err(e);
            }
        };

        let warnings = self.release_tag(&hash, tag).await;

        let resumed = if self.config.resume {
            self.client
                .resume_torrent(&hash)
                .await
                .map_err(|source| IngestError::Transport {
                    step: "resume",
                    after: IngestStage::PolicyApplied,
                    source,
                })?;
            true
        } else {
            info!(hash = %hash, "Leaving torrent paused");
            false
        };
        info!(hash = %hash, resumed, stage = %IngestStage::Finalized, "Ingestion finished");

        Ok(IngestReport {
            hash,
            name: torrent.name,
            tag: tag.to_string(),
            hosts,
            hinted_hosts,
            applied,
            policy_failures,
            warnings,
            resumed,
        })
    }

    /// Read the trackers, pick a policy and apply it.
    async fn classify_and_apply(
        &self,
        hash: &str,
        hinted_hosts: &BTreeSet<String>,
    ) -> Result<(BTreeSet<String>, AppliedPolicy, Vec<PolicyApplicationError>), IngestError> {
        let hosts = resolve_hosts(self.client.as_ref(), hash)
            .await
            .map_err(|source| IngestError::Transport {
                step: "get trackers",
                after: IngestStage::Registered,
                source,
            })?;
        log_hint_mismatch(hinted_hosts, &hosts);

        let applied = self.rules.classify(&hosts);
        info!(hash, policy = %applied, stage = %IngestStage::Classified, "Torrent classified");

        let mut applier = PolicyApplier::new(self.client.as_ref());
        let policy_failures = applier.apply(hash, &applied.policy).await;
        for failure in &policy_failures {
            warn!(hash, step = %failure.step, error = %failure.source, "Policy step failed");
        }
        debug!(
            hash,
            failed_steps = policy_failures.len(),
            stage = %IngestStage::PolicyApplied,
            "Stage reached"
        );

        Ok((hosts, applied, policy_failures))
    }

    /// Detach the tag from the torrent, then delete it from the client's tag
    /// list. Problems are logged and returned as warnings.
    async fn release_tag(&self, hash: &str, tag: &str) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Err(e) = self.client.remove_tags(hash, &[tag.to_string()]).await {
            warn!(tag, hash, error = %e, "Failed to remove correlation tag");
            warnings.push(format!("correlation tag {} was not removed: {}", tag, e));
        }
        warnings.extend(self.delete_tag(tag).await);
        warnings
    }

    async fn delete_tag(&self, tag: &str) -> Option<String> {
        match self.client.delete_tags(&[tag.to_string()]).await {
            Ok(()) => {
                debug!(tag, "Deleted correlation tag");
                None
            }
            Err(e) => {
                warn!(tag, error = %e, "Failed to delete correlation tag");
                Some(format!("correlation tag {} was not deleted: {}", tag, e))
            }
        }
    }

    /// Best-effort cleanup when the hash is unknown: untag whatever carries
    /// the tag now, then delete the tag itself.
    async fn release_tag_by_lookup(&self, tag: &str) {
        match self.client.list_torrents(&TorrentFilters::tagged(tag)).await {
            Ok(torrents) => {
                for torrent in torrents.iter().filter(|t| t.tags.iter().any(|x| x == tag)) {
                    match self.client.remove_tags(&torrent.hash, &[tag.to_string()]).await {
                        Ok(()) => info!(tag, hash = %torrent.hash, "Removed correlation tag from late torrent"),
                        Err(e) => warn!(tag, hash = %torrent.hash, error = %e, "Failed to remove correlation tag"),
                    }
                }
            }
            Err(e) => warn!(tag, error = %e, "Could not look up tagged torrent for cleanup"),
        }
        self.delete_tag(tag).await;
    }
}

/// The magnet hint can be incomplete, but hosts it names should show up
/// among the client's trackers.
fn log_hint_mismatch(hinted: &BTreeSet<String>, resolved: &BTreeSet<String>) {
    let missing: Vec<&String> = hinted.difference(resolved).collect();
    if !missing.is_empty() {
        debug!(?missing, "Magnet trackers not reported by the client");
    }
}
