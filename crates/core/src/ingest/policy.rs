//! Applying a category and upload limit to a registered torrent.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::{debug, info};

use crate::rules::Policy;
use crate::torrent_client::{TorrentClient, TorrentClientError, UploadLimit};

/// Sub-steps of policy application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyStep {
    EnsureCategory,
    SetCategory,
    SetUploadLimit,
}

impl PolicyStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyStep::EnsureCategory => "ensure category",
            PolicyStep::SetCategory => "set category",
            PolicyStep::SetUploadLimit => "set upload limit",
        }
    }
}

impl fmt::Display for PolicyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A policy step that failed. Earlier or later steps may still have succeeded.
#[derive(Debug, Error)]
#[error("{step} failed: {source}")]
pub struct PolicyApplicationError {
    pub step: PolicyStep,
    #[source]
    pub source: TorrentClientError,
}

/// Applies policies through a torrent client.
///
/// Remembers which categories it already handled, so each category name is
/// checked/created at most once per applier.
pub struct PolicyApplier<'a> {
    client: &'a dyn TorrentClient,
    /// Category name -> whether ensuring it succeeded.
    categories: HashMap<String, bool>,
}

impl<'a> PolicyApplier<'a> {
    pub fn new(client: &'a dyn TorrentClient) -> Self {
        Self {
            client,
            categories: HashMap::new(),
        }
    }

    /// Create `name` unless the client already has it.
    ///
    /// An existing category is success, including one that appears between
    /// the listing and the create call.
    pub async fn ensure_category(&mut self, name: &str) -> Result<(), TorrentClientError> {
        if let Some(ok) = self.categories.get(name) {
            debug!(category = name, "Category already handled in this run");
            return if *ok {
                Ok(())
            } else {
                Err(TorrentClientError::Internal(format!(
                    "creating category {name:?} already failed in this run"
                )))
            };
        }

        let result = self.create_if_missing(name).await;
        self.categories.insert(name.to_string(), result.is_ok());
        result
    }

    async fn create_if_missing(&self, name: &str) -> Result<(), TorrentClientError> {
        if self.client.list_categories().await?.iter().any(|c| c == name) {
            return Ok(());
        }

        match self.client.create_category(name).await {
            Ok(()) => {
                info!(category = name, "Created category");
                Ok(())
            }
            Err(TorrentClientError::Conflict(msg)) => {
                // Conflict is also returned for invalid names, so check again.
                if self.client.list_categories().await?.iter().any(|c| c == name) {
                    debug!(category = name, "Category created concurrently");
                    Ok(())
                } else {
                    Err(TorrentClientError::Conflict(msg))
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Apply `policy` to the torrent. Every step is attempted; failures are
    /// returned, nothing is rolled back.
    pub async fn apply(&mut self, hash: &str, policy: &Policy) -> Vec<PolicyApplicationError> {
        let mut failures = Vec::new();

        if let Some(category) = &policy.category {
            if let Err(source) = self.ensure_category(category).await {
                failures.push(PolicyApplicationError {
                    step: PolicyStep::EnsureCategory,
                    source,
                });
            }

            if let Err(source) = self.client.set_category(hash, category).await {
                failures.push(PolicyApplicationError {
                    step: PolicyStep::SetCategory,
                    source,
                });
            }
        }

        let limit = UploadLimit::from_kib(policy.upload_limit_kib);
        if let Err(source) = self.client.set_upload_limit(hash, limit).await {
            failures.push(PolicyApplicationError {
                step: PolicyStep::SetUploadLimit,
                source,
            });
        }

        failures
    }
}
