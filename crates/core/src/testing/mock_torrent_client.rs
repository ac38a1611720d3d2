//! Mock torrent client for testing.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

use crate::torrent_client::{
    AddTorrentRequest, TorrentClient, TorrentClientError, TorrentFilters, TorrentInfo,
    TrackerEntry, UploadLimit,
};
use crate::trackers::MagnetHint;

/// Pseudo trackers qBittorrent lists for every torrent.
const PSEUDO_TRACKERS: [&str; 3] = ["** [DHT] **", "** [PeX] **", "** [LSD] **"];

/// Client operations, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Add,
    List,
    Get,
    Trackers,
    ListCategories,
    CreateCategory,
    SetCategory,
    SetUploadLimit,
    RemoveTags,
    DeleteTags,
    Resume,
}

/// When newly added torrents become visible to listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockRegistration {
    /// Listed right away.
    Immediate,
    /// Hidden from the first N list calls after being added.
    AfterPolls(u32),
    /// Never listed.
    Never,
}

/// A recorded torrent addition for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedAddTorrent {
    /// The request that was made.
    pub request: AddTorrentRequest,
}

/// A recorded client call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub operation: MockOperation,
    /// Hash, category or tag the call was about.
    pub target: Option<String>,
}

/// Internal state for a mock torrent.
#[derive(Debug, Clone)]
struct MockTorrentState {
    info: TorrentInfo,
    trackers: Vec<TrackerEntry>,
    /// Remaining list calls this torrent stays hidden from (None = forever).
    hidden_polls: Option<u32>,
}

impl MockTorrentState {
    fn visible(&self) -> bool {
        self.hidden_polls == Some(0)
    }
}

/// Mock implementation of the TorrentClient trait.
///
/// Behaves like a qBittorrent daemon closely enough for ingestion tests:
/// - Torrents carry tags, categories, upload limits and tracker lists
/// - Registration can be delayed by a number of list calls, or never happen
/// - Setting an unknown category fails, creating an existing one conflicts
/// - Tags given on add land in a global tag list until deleted
/// - Any operation can be made to fail once or always
///
/// # Example
///
/// ```rust,ignore
/// let client = MockTorrentClient::new();
/// client.set_registration(MockRegistration::AfterPolls(2)).await;
/// client.fail_always(MockOperation::SetUploadLimit).await;
///
/// client.add_torrent(AddTorrentRequest::magnet("magnet:?...").with_tag("t")).await?;
/// assert_eq!(client.call_count(MockOperation::Add).await, 1);
/// ```
#[derive(Debug)]
pub struct MockTorrentClient {
    /// Recorded add_torrent calls.
    added: Arc<RwLock<Vec<RecordedAddTorrent>>>,
    /// Every call, in order.
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    /// Current torrent states by hash.
    torrents: Arc<RwLock<HashMap<String, MockTorrentState>>>,
    categories: Arc<RwLock<BTreeSet<String>>>,
    /// Categories that exist but are left out of the next listing.
    hidden_categories: Arc<RwLock<HashSet<String>>>,
    /// Global tag list, as `torrents/tags` would report it.
    tags: Arc<RwLock<BTreeSet<String>>>,
    /// Simulated response time per operation.
    latency: Arc<RwLock<HashMap<MockOperation, Duration>>>,
    /// Queued one-shot failures per operation.
    next_errors: Arc<RwLock<HashMap<MockOperation, VecDeque<TorrentClientError>>>>,
    /// Operations that always fail.
    always_fail: Arc<RwLock<HashSet<MockOperation>>>,
    registration: Arc<RwLock<MockRegistration>>,
    /// Announce URLs given to the next added .torrent file.
    file_trackers: Arc<RwLock<Vec<String>>>,
    /// Counter for generating unique hashes.
    hash_counter: Arc<RwLock<u32>>,
}

impl Default for MockTorrentClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTorrentClient {
    /// Create a new mock torrent client.
    pub fn new() -> Self {
        Self {
            added: Arc::new(RwLock::new(Vec::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            torrents: Arc::new(RwLock::new(HashMap::new())),
            categories: Arc::new(RwLock::new(BTreeSet::new())),
            hidden_categories: Arc::new(RwLock::new(HashSet::new())),
            tags: Arc::new(RwLock::new(BTreeSet::new())),
            latency: Arc::new(RwLock::new(HashMap::new())),
            next_errors: Arc::new(RwLock::new(HashMap::new())),
            always_fail: Arc::new(RwLock::new(HashSet::new())),
            registration: Arc::new(RwLock::new(MockRegistration::Immediate)),
            file_trackers: Arc::new(RwLock::new(Vec::new())),
            hash_counter: Arc::new(RwLock::new(0)),
        }
    }

    /// Get all recorded add_torrent calls.
    pub async fn added_torrents(&self) -> Vec<RecordedAddTorrent> {
        self.added.read().await.clone()
    }

    /// Get every recorded call.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    /// Number of calls (including failed ones) to an operation.
    pub async fn call_count(&self, operation: MockOperation) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Registration behavior for torrents added from now on.
    pub async fn set_registration(&self, registration: MockRegistration) {
        *self.registration.write().await = registration;
    }

    /// Announce URLs for .torrent files added from now on.
    pub async fn set_file_trackers(&self, urls: &[&str]) {
        *self.file_trackers.write().await = urls.iter().map(|u| u.to_string()).collect();
    }

    /// Make the next call to `operation` fail with `error`. Calls queue up.
    pub async fn fail_next(&self, operation: MockOperation, error: TorrentClientError) {
        self.next_errors
            .write()
            .await
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Make every call to `operation` fail.
    pub async fn fail_always(&self, operation: MockOperation) {
        self.always_fail.write().await.insert(operation);
    }

    /// Make every call to `operation` take `delay` before answering.
    pub async fn set_latency(&self, operation: MockOperation, delay: Duration) {
        self.latency.write().await.insert(operation, delay);
    }

    /// Clear all injected failures.
    pub async fn clear_failures(&self) {
        self.next_errors.write().await.clear();
        self.always_fail.write().await.clear();
    }

    /// Pre-create a category.
    pub async fn add_category(&self, name: &str) {
        self.categories.write().await.insert(name.to_string());
    }

    /// Create a category that the next listing will not report, as if it was
    /// created by someone else right after that listing.
    pub async fn add_category_hidden_once(&self, name: &str) {
        self.categories.write().await.insert(name.to_string());
        self.hidden_categories.write().await.insert(name.to_string());
    }

    /// Snapshot of the category names.
    pub async fn categories(&self) -> BTreeSet<String> {
        self.categories.read().await.clone()
    }

    /// Snapshot of the global tag list.
    pub async fn tags(&self) -> BTreeSet<String> {
        self.tags.read().await.clone()
    }

    /// Look at a torrent regardless of its registration state.
    pub async fn torrent(&self, hash: &str) -> Option<TorrentInfo> {
        self.torrents.read().await.get(hash).map(|t| t.info.clone())
    }

    /// Check if a torrent is paused.
    pub async fn is_paused(&self, hash: &str) -> bool {
        self.torrents
            .read()
            .await
            .get(hash)
            .map(|t| t.info.paused)
            .unwrap_or(false)
    }

    /// Get the number of torrents.
    pub async fn torrent_count(&self) -> usize {
        self.torrents.read().await.len()
    }

    /// Pre-populate a registered torrent.
    pub async fn add_mock_torrent(&self, info: TorrentInfo, tracker_urls: &[&str]) {
        let hash = info.hash.clone();
        self.tags.write().await.extend(info.tags.iter().cloned());
        self.torrents.write().await.insert(
            hash,
            MockTorrentState {
                info,
                trackers: tracker_entries(tracker_urls.iter().map(|u| u.to_string())),
                hidden_polls: Some(0),
            },
        );
    }

    async fn record(&self, operation: MockOperation, target: Option<&str>) {
        self.calls.write().await.push(RecordedCall {
            operation,
            target: target.map(str::to_string),
        });
    }

    /// Record the call and return the injected failure, if any.
    async fn enter(
        &self,
        operation: MockOperation,
        target: Option<&str>,
    ) -> Result<(), TorrentClientError> {
        self.record(operation, target).await;

        let delay = self.latency.read().await.get(&operation).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self
            .next_errors
            .write()
            .await
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }

        if self.always_fail.read().await.contains(&operation) {
            return Err(TorrentClientError::ApiError(format!(
                "injected failure for {:?}",
                operation
            )));
        }

        Ok(())
    }

    /// Generate a unique mock hash.
    async fn generate_hash(&self) -> String {
        let mut counter = self.hash_counter.write().await;
        *counter += 1;
        format!("{:040x}", *counter)
    }

    /// Apply `f` to a registered torrent.
    async fn with_torrent<F>(&self, hash: &str, f: F) -> Result<(), TorrentClientError>
    where
        F: FnOnce(&mut MockTorrentState),
    {
        let mut torrents = self.torrents.write().await;
        match torrents.get_mut(hash) {
            Some(torrent) if torrent.visible() => {
                f(torrent);
                Ok(())
            }
            _ => Err(TorrentClientError::TorrentNotFound(hash.to_string())),
        }
    }
}

/// Entries as qBittorrent reports them: pseudo trackers first.
fn tracker_entries(urls: impl IntoIterator<Item = String>) -> Vec<TrackerEntry> {
    PSEUDO_TRACKERS
        .iter()
        .map(|p| TrackerEntry::new(*p))
        .chain(urls.into_iter().map(TrackerEntry::new))
        .collect()
}

/// Raw `tr=` values of a magnet URI.
fn magnet_tracker_urls(uri: &str) -> Vec<String> {
    Url::parse(uri)
        .map(|url| {
            url.query_pairs()
                .filter(|(k, _)| k == "tr")
                .map(|(_, v)| v.into_owned())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl TorrentClient for MockTorrentClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn add_torrent(&self, request: AddTorrentRequest) -> Result<(), TorrentClientError> {
        self.enter(MockOperation::Add, None).await?;

        self.added.write().await.push(RecordedAddTorrent {
            request: request.clone(),
        });

        let (hash, name, tracker_urls) = match &request {
            AddTorrentRequest::Magnet { uri, .. } => {
                let hint = MagnetHint::parse(uri).unwrap_or_default();
                let hash = match hint.info_hash {
                    Some(hash) => hash,
                    None => self.generate_hash().await,
                };
                let name = hint.display_name.unwrap_or_else(|| hash.clone());
                (hash, name, magnet_tracker_urls(uri))
            }
            AddTorrentRequest::TorrentFile { filename, .. } => {
                let hash = self.generate_hash().await;
                let name = filename
                    .clone()
                    .unwrap_or_else(|| format!("Mock Torrent {}", &hash[..8]));
                (hash, name, self.file_trackers.read().await.clone())
            }
        };

        let mut torrents = self.torrents.write().await;
        if torrents.contains_key(&hash) {
            // qBittorrent answers "Fails." for duplicates.
            return Err(TorrentClientError::InvalidTorrent(format!(
                "torrent {} already added",
                hash
            )));
        }

        let hidden_polls = match *self.registration.read().await {
            MockRegistration::Immediate => Some(0),
            MockRegistration::AfterPolls(n) => Some(n),
            MockRegistration::Never => None,
        };

        let info = TorrentInfo {
            hash: hash.clone(),
            name,
            paused: request.is_paused(),
            category: None,
            tags: request.tags().to_vec(),
            upload_limit: UploadLimit::Unlimited,
        };

        // qBittorrent creates unknown tags on add.
        self.tags
            .write()
            .await
            .extend(request.tags().iter().cloned());

        torrents.insert(
            hash,
            MockTorrentState {
                info,
                trackers: tracker_entries(tracker_urls),
                hidden_polls,
            },
        );

        Ok(())
    }

    async fn list_torrents(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        self.enter(MockOperation::List, filters.tag.as_deref()).await?;

        let mut torrents = self.torrents.write().await;
        let mut result: Vec<TorrentInfo> = Vec::new();
        for torrent in torrents.values_mut() {
            if !torrent.visible() {
                if let Some(n) = torrent.hidden_polls.as_mut() {
                    *n -= 1;
                }
                continue;
            }
            if let Some(tag) = &filters.tag {
                if !torrent.info.tags.contains(tag) {
                    continue;
                }
            }
            result.push(torrent.info.clone());
        }

        result.sort_by(|a, b| a.hash.cmp(&b.hash));

        Ok(result)
    }

    async fn get_torrent(&self, hash: &str) -> Result<TorrentInfo, TorrentClientError> {
        self.enter(MockOperation::Get, Some(hash)).await?;

        self.torrents
            .read()
            .await
            .get(hash)
            .filter(|t| t.visible())
            .map(|t| t.info.clone())
            .ok_or_else(|| TorrentClientError::TorrentNotFound(hash.to_string()))
    }

    async fn get_trackers(&self, hash: &str) -> Result<Vec<TrackerEntry>, TorrentClientError> {
        self.enter(MockOperation::Trackers, Some(hash)).await?;

        self.torrents
            .read()
            .await
            .get(hash)
            .filter(|t| t.visible())
            .map(|t| t.trackers.clone())
            .ok_or_else(|| TorrentClientError::TorrentNotFound(hash.to_string()))
    }

    async fn list_categories(&self) -> Result<Vec<String>, TorrentClientError> {
        self.enter(MockOperation::ListCategories, None).await?;

        let hidden: HashSet<String> = self.hidden_categories.write().await.drain().collect();
        Ok(self
            .categories
            .read()
            .await
            .iter()
            .filter(|c| !hidden.contains(*c))
            .cloned()
            .collect())
    }

    async fn create_category(&self, name: &str) -> Result<(), TorrentClientError> {
        self.enter(MockOperation::CreateCategory, Some(name)).await?;

        if self.categories.write().await.insert(name.to_string()) {
            Ok(())
        } else {
            Err(TorrentClientError::Conflict(format!(
                "category {} already exists",
                name
            )))
        }
    }

    async fn set_category(&self, hash: &str, category: &str) -> Result<(), TorrentClientError> {
        self.enter(MockOperation::SetCategory, Some(hash)).await?;

        if !self.categories.read().await.contains(category) {
            return Err(TorrentClientError::Conflict(format!(
                "category {} does not exist",
                category
            )));
        }

        self.with_torrent(hash, |t| t.info.category = Some(category.to_string()))
            .await
    }

    async fn set_upload_limit(
        &self,
        hash: &str,
        limit: UploadLimit,
    ) -> Result<(), TorrentClientError> {
        self.enter(MockOperation::SetUploadLimit, Some(hash)).await?;
        self.with_torrent(hash, |t| t.info.upload_limit = limit).await
    }

    async fn remove_tags(&self, hash: &str, tags: &[String]) -> Result<(), TorrentClientError> {
        self.enter(MockOperation::RemoveTags, Some(hash)).await?;
        self.with_torrent(hash, |t| t.info.tags.retain(|x| !tags.contains(x)))
            .await
    }

    async fn delete_tags(&self, tags: &[String]) -> Result<(), TorrentClientError> {
        self.enter(MockOperation::DeleteTags, tags.first().map(String::as_str))
            .await?;

        self.tags.write().await.retain(|x| !tags.contains(x));
        for torrent in self.torrents.write().await.values_mut() {
            torrent.info.tags.retain(|x| !tags.contains(x));
        }
        Ok(())
    }

    async fn resume_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        self.enter(MockOperation::Resume, Some(hash)).await?;
        self.with_torrent(hash, |t| t.info.paused = false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[tokio::test]
    async fn test_add_and_get_torrent() {
        let client = MockTorrentClient::new();
        let magnet = fixtures::magnet(fixtures::HASH_A, &["https://tracker.private.example/announce"]);

        client
            .add_torrent(AddTorrentRequest::magnet(magnet).with_paused(true))
            .await
            .unwrap();

        let info = client.get_torrent(fixtures::HASH_A).await.unwrap();
        assert_eq!(info.hash, fixtures::HASH_A);
        assert!(info.paused);

        let trackers = client.get_trackers(fixtures::HASH_A).await.unwrap();
        assert_eq!(trackers.len(), 4);
        assert_eq!(trackers[3].url, "https://tracker.private.example/announce");
    }

    #[tokio::test]
    async fn test_file_torrents_get_generated_hashes() {
        let client = MockTorrentClient::new();
        client
            .set_file_trackers(&["http://tracker.example:2710/announce"])
            .await;

        client
            .add_torrent(AddTorrentRequest::torrent_file(vec![1, 2, 3]).with_filename("a.torrent"))
            .await
            .unwrap();
        client
            .add_torrent(AddTorrentRequest::torrent_file(vec![4, 5, 6]))
            .await
            .unwrap();

        assert_eq!(client.torrent_count().await, 2);
        let all = client.list_torrents(&TorrentFilters::default()).await.unwrap();
        assert!(all.iter().all(|t| t.hash.len() == 40));
        assert!(all.iter().any(|t| t.name == "a.torrent"));
    }

    #[tokio::test]
    async fn test_duplicate_add_is_rejected() {
        let client = MockTorrentClient::new();
        let magnet = fixtures::magnet(fixtures::HASH_A, &[]);

        client
            .add_torrent(AddTorrentRequest::magnet(magnet.clone()))
            .await
            .unwrap();
        let result = client.add_torrent(AddTorrentRequest::magnet(magnet)).await;
        assert!(matches!(result, Err(TorrentClientError::InvalidTorrent(_))));
    }

    #[tokio::test]
    async fn test_registration_delay() {
        let client = MockTorrentClient::new();
        client.set_registration(MockRegistration::AfterPolls(2)).await;
        client
            .add_torrent(AddTorrentRequest::magnet(fixtures::magnet(fixtures::HASH_A, &[])).with_tag("t"))
            .await
            .unwrap();

        let filters = TorrentFilters::tagged("t");
        assert!(client.list_torrents(&filters).await.unwrap().is_empty());
        assert!(client.get_torrent(fixtures::HASH_A).await.is_err());
        assert!(client.list_torrents(&filters).await.unwrap().is_empty());
        assert_eq!(client.list_torrents(&filters).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_error_injection() {
        let client = MockTorrentClient::new();

        client
            .fail_next(
                MockOperation::Add,
                TorrentClientError::ConnectionFailed("test".into()),
            )
            .await;

        let result = client
            .add_torrent(AddTorrentRequest::magnet(fixtures::magnet(fixtures::HASH_A, &[])))
            .await;
        assert!(result.is_err());

        // Error should be consumed
        let result = client
            .add_torrent(AddTorrentRequest::magnet(fixtures::magnet(fixtures::HASH_A, &[])))
            .await;
        assert!(result.is_ok());
        assert_eq!(client.call_count(MockOperation::Add).await, 2);
        assert_eq!(client.added_torrents().await.len(), 1);
    }

    #[tokio::test]
    async fn test_always_fail_until_cleared() {
        let client = MockTorrentClient::new();
        client.fail_always(MockOperation::ListCategories).await;

        assert!(client.list_categories().await.is_err());
        assert!(client.list_categories().await.is_err());

        client.clear_failures().await;
        assert!(client.list_categories().await.is_ok());
    }

    #[tokio::test]
    async fn test_category_semantics() {
        let client = MockTorrentClient::new();
        client
            .add_torrent(AddTorrentRequest::magnet(fixtures::magnet(fixtures::HASH_A, &[])))
            .await
            .unwrap();

        // Unknown category cannot be assigned
        assert!(client.set_category(fixtures::HASH_A, "Movies").await.is_err());

        client.create_category("Movies").await.unwrap();
        assert!(matches!(
            client.create_category("Movies").await,
            Err(TorrentClientError::Conflict(_))
        ));

        client.set_category(fixtures::HASH_A, "Movies").await.unwrap();
        let info = client.get_torrent(fixtures::HASH_A).await.unwrap();
        assert_eq!(info.category.as_deref(), Some("Movies"));
    }

    #[tokio::test]
    async fn test_hidden_category_reappears() {
        let client = MockTorrentClient::new();
        client.add_category_hidden_once("Racy").await;

        assert!(client.list_categories().await.unwrap().is_empty());
        assert_eq!(client.list_categories().await.unwrap(), vec!["Racy".to_string()]);
    }

    #[tokio::test]
    async fn test_tags_and_resume() {
        let client = MockTorrentClient::new();
        client
            .add_torrent(
                AddTorrentRequest::magnet(fixtures::magnet(fixtures::HASH_A, &[]))
                    .with_tag("keep")
                    .with_tag("drop")
                    .with_paused(true),
            )
            .await
            .unwrap();

        client
            .remove_tags(fixtures::HASH_A, &["drop".to_string()])
            .await
            .unwrap();
        client.resume_torrent(fixtures::HASH_A).await.unwrap();

        let info = client.torrent(fixtures::HASH_A).await.unwrap();
        assert_eq!(info.tags, vec!["keep".to_string()]);
        assert!(!client.is_paused(fixtures::HASH_A).await);
    }

    #[tokio::test]
    async fn test_tags_are_global_until_deleted() {
        let client = MockTorrentClient::new();
        client
            .add_torrent(
                AddTorrentRequest::magnet(fixtures::magnet(fixtures::HASH_A, &[]))
                    .with_tag("qbt-rules-1"),
            )
            .await
            .unwrap();
        let tag = vec!["qbt-rules-1".to_string()];

        // Detaching keeps the tag known to the client.
        client.remove_tags(fixtures::HASH_A, &tag).await.unwrap();
        assert!(client.tags().await.contains("qbt-rules-1"));

        client.delete_tags(&tag).await.unwrap();
        assert!(client.tags().await.is_empty());

        // Deleting an unknown tag is not an error.
        client.delete_tags(&tag).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_tags_detaches_from_torrents() {
        let client = MockTorrentClient::new();
        client
            .add_torrent(
                AddTorrentRequest::magnet(fixtures::magnet(fixtures::HASH_A, &[]))
                    .with_tag("qbt-rules-1"),
            )
            .await
            .unwrap();

        client.delete_tags(&["qbt-rules-1".to_string()]).await.unwrap();
        assert!(client.torrent(fixtures::HASH_A).await.unwrap().tags.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_delays_answers() {
        let client = MockTorrentClient::new();
        client
            .set_latency(MockOperation::ListCategories, Duration::from_secs(2))
            .await;

        let started = tokio::time::Instant::now();
        client.list_categories().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }
}
