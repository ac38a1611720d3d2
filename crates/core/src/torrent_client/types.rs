//! Types for torrent client operations.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during torrent client operations.
#[derive(Debug, Error)]
pub enum TorrentClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Torrent not found: {0}")]
    TorrentNotFound(String),

    #[error("Invalid torrent data: {0}")]
    InvalidTorrent(String),

    #[error("Endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Information about a torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentInfo {
    /// Info hash (lowercase hex).
    pub hash: String,
    /// Torrent name.
    pub name: String,
    /// Paused (stopped, in qBittorrent 5 terms).
    pub paused: bool,
    /// Category, None when unset.
    pub category: Option<String>,
    /// Tags attached to the torrent.
    pub tags: Vec<String>,
    /// Upload limit.
    pub upload_limit: UploadLimit,
}

/// Per-torrent upload rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadLimit {
    /// No cap on upload throughput.
    Unlimited,
    /// Cap in bytes/second (never zero).
    BytesPerSec(u64),
}

impl UploadLimit {
    /// Convert a KiB/s setting, where 0 means unlimited.
    pub fn from_kib(kib: u64) -> Self {
        if kib == 0 {
            UploadLimit::Unlimited
        } else {
            UploadLimit::BytesPerSec(kib.saturating_mul(1024))
        }
    }

    /// Back to KiB/s (0 = unlimited), rounding down.
    pub fn as_kib(&self) -> u64 {
        match self {
            UploadLimit::Unlimited => 0,
            UploadLimit::BytesPerSec(bytes) => bytes / 1024,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, UploadLimit::Unlimited)
    }
}

/// One announce entry of a torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerEntry {
    /// Announce URL, or a pseudo entry such as `** [DHT] **`.
    pub url: String,
}

impl TrackerEntry {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Request to add a new torrent.
#[derive(Debug, Clone)]
pub enum AddTorrentRequest {
    /// Add via magnet URI.
    Magnet {
        /// Magnet URI.
        uri: String,
        /// Tags to attach on add.
        tags: Vec<String>,
        /// Start paused.
        paused: bool,
    },
    /// Add via .torrent file contents.
    TorrentFile {
        /// Raw .torrent file bytes.
        data: Vec<u8>,
        /// Original filename (for logging).
        filename: Option<String>,
        /// Tags to attach on add.
        tags: Vec<String>,
        /// Start paused.
        paused: bool,
    },
}

impl AddTorrentRequest {
    /// Create a magnet request with default options.
    pub fn magnet(uri: impl Into<String>) -> Self {
        AddTorrentRequest::Magnet {
            uri: uri.into(),
            tags: Vec::new(),
            paused: false,
        }
    }

    /// Create a torrent file request with default options.
    pub fn torrent_file(data: Vec<u8>) -> Self {
        AddTorrentRequest::TorrentFile {
            data,
            filename: None,
            tags: Vec::new(),
            paused: false,
        }
    }

    /// Set the filename reported to the client (ignored for magnets).
    pub fn with_filename(mut self, name: impl Into<String>) -> Self {
        if let AddTorrentRequest::TorrentFile { filename, .. } = &mut self {
            *filename = Some(name.into());
        }
        self
    }

    /// Attach a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        match &mut self {
            AddTorrentRequest::Magnet { tags, .. } | AddTorrentRequest::TorrentFile { tags, .. } => {
                tags.push(tag.into());
            }
        }
        self
    }

    /// Set whether to start paused.
    pub fn with_paused(mut self, p: bool) -> Self {
        match &mut self {
            AddTorrentRequest::Magnet { paused, .. }
            | AddTorrentRequest::TorrentFile { paused, .. } => {
                *paused = p;
            }
        }
        self
    }

    pub fn tags(&self) -> &[String] {
        match self {
            AddTorrentRequest::Magnet { tags, .. } | AddTorrentRequest::TorrentFile { tags, .. } => {
                tags
            }
        }
    }

    pub fn is_paused(&self) -> bool {
        match self {
            AddTorrentRequest::Magnet { paused, .. }
            | AddTorrentRequest::TorrentFile { paused, .. } => *paused,
        }
    }
}

/// Filters for listing torrents.
#[derive(Debug, Clone, Default)]
pub struct TorrentFilters {
    /// Filter by tag.
    pub tag: Option<String>,
}

impl TorrentFilters {
    /// Only torrents carrying `tag`.
    pub fn tagged(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
        }
    }
}

/// Trait for the torrent client the ingestion engine drives.
#[async_trait]
pub trait TorrentClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Submit a new torrent. Registration on the client side is asynchronous;
    /// use a tag and [`TorrentClient::list_torrents`] to find it afterwards.
    async fn add_torrent(&self, request: AddTorrentRequest) -> Result<(), TorrentClientError>;

    /// List torrents, optionally filtered.
    async fn list_torrents(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError>;

    /// Get a specific torrent by hash.
    async fn get_torrent(&self, hash: &str) -> Result<TorrentInfo, TorrentClientError>;

    /// Get the announce entries of a torrent.
    async fn get_trackers(&self, hash: &str) -> Result<Vec<TrackerEntry>, TorrentClientError>;

    /// List category names known to the client.
    async fn list_categories(&self) -> Result<Vec<String>, TorrentClientError>;

    /// Create a category. Fails with [`TorrentClientError::Conflict`] if it exists.
    async fn create_category(&self, name: &str) -> Result<(), TorrentClientError>;

    /// Assign a torrent to an existing category.
    async fn set_category(&self, hash: &str, category: &str) -> Result<(), TorrentClientError>;

    /// Set upload speed limit for a torrent.
    async fn set_upload_limit(
        &self,
        hash: &str,
        limit: UploadLimit,
    ) -> Result<(), TorrentClientError>;

    /// Remove tags from a torrent. The tags stay in the client's tag list.
    async fn remove_tags(&self, hash: &str, tags: &[String]) -> Result<(), TorrentClientError>;

    /// Delete tags from the client's tag list (and from every torrent
    /// carrying them). Unknown tags are ignored.
    async fn delete_tags(&self, tags: &[String]) -> Result<(), TorrentClientError>;

    /// Resume a paused torrent.
    async fn resume_torrent(&self, hash: &str) -> Result<(), TorrentClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_limit_from_kib() {
        assert_eq!(UploadLimit::from_kib(0), UploadLimit::Unlimited);
        assert_eq!(UploadLimit::from_kib(500), UploadLimit::BytesPerSec(512_000));
        assert_eq!(
            UploadLimit::from_kib(u64::MAX),
            UploadLimit::BytesPerSec(u64::MAX)
        );
    }

    #[test]
    fn test_upload_limit_zero_is_not_a_stall() {
        let limit = UploadLimit::from_kib(0);
        assert!(limit.is_unlimited());
        assert_ne!(limit, UploadLimit::BytesPerSec(0));
        assert_eq!(limit.as_kib(), 0);
        assert_eq!(UploadLimit::from_kib(500).as_kib(), 500);
    }

    #[test]
    fn test_add_torrent_request_magnet_builder() {
        let req = AddTorrentRequest::magnet("magnet:?xt=urn:btih:abc123")
            .with_tag("qbt-rules-1")
            .with_paused(true);

        assert_eq!(req.tags(), ["qbt-rules-1".to_string()]);
        assert!(req.is_paused());
        match req {
            AddTorrentRequest::Magnet { uri, .. } => {
                assert_eq!(uri, "magnet:?xt=urn:btih:abc123");
            }
            _ => panic!("Expected Magnet variant"),
        }
    }

    #[test]
    fn test_add_torrent_request_file_builder() {
        let data = vec![0u8; 100];
        let req = AddTorrentRequest::torrent_file(data)
            .with_filename("linux.iso.torrent")
            .with_tag("qbt-rules-2")
            .with_paused(false);

        assert!(!req.is_paused());
        match req {
            AddTorrentRequest::TorrentFile {
                data, filename, tags, ..
            } => {
                assert_eq!(data.len(), 100);
                assert_eq!(filename.as_deref(), Some("linux.iso.torrent"));
                assert_eq!(tags, vec!["qbt-rules-2".to_string()]);
            }
            _ => panic!("Expected TorrentFile variant"),
        }
    }

    #[test]
    fn test_filename_ignored_for_magnet() {
        let req = AddTorrentRequest::magnet("magnet:?xt=urn:btih:abc").with_filename("x");
        assert!(matches!(req, AddTorrentRequest::Magnet { .. }));
    }

    #[test]
    fn test_torrent_filters() {
        assert!(TorrentFilters::default().tag.is_none());
        let tagged = TorrentFilters::tagged("qbt-rules-x");
        assert_eq!(tagged.tag.as_deref(), Some("qbt-rules-x"));
    }
}
