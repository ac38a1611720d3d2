//! qBittorrent WebUI (API v2) client implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::QBittorrentConfig;

use super::{
    AddTorrentRequest, TorrentClient, TorrentClientError, TorrentFilters, TorrentInfo,
    TrackerEntry, UploadLimit,
};

const TORRENT_MIME: &str = "application/x-bittorrent";

/// qBittorrent client implementation.
pub struct QBittorrentClient {
    client: Client,
    config: QBittorrentConfig,
    /// Session marker (the SID cookie itself lives in the cookie jar).
    session: Arc<RwLock<Option<String>>>,
}

impl QBittorrentClient {
    /// Create a new qBittorrent client.
    pub fn new(config: QBittorrentConfig) -> Result<Self, TorrentClientError> {
        if config.insecure {
            warn!(
                url = %config.url,
                "TLS certificate verification disabled for qBittorrent WebUI"
            );
        }

        let timeout = Duration::from_secs(config.timeout_secs as u64);
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .cookie_store(true)
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| TorrentClientError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            session: Arc::new(RwLock::new(None)),
        })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Login and store session cookie.
    pub async fn login(&self) -> Result<(), TorrentClientError> {
        let url = format!("{}/api/v2/auth/login", self.base_url());

        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() && body.trim() == "Ok." {
            debug!("qBittorrent login successful");
            let mut session = self.session.write().await;
            *session = Some("authenticated".to_string());
            Ok(())
        } else if body.contains("Fails.") || status == StatusCode::FORBIDDEN {
            Err(TorrentClientError::AuthenticationFailed(
                "Invalid credentials or IP banned".to_string(),
            ))
        } else {
            Err(TorrentClientError::AuthenticationFailed(format!(
                "Unexpected response (HTTP {}): {}",
                status,
                truncate(&body)
            )))
        }
    }

    /// Ensure we have a valid session, logging in if needed.
    async fn ensure_authenticated(&self) -> Result<(), TorrentClientError> {
        let session = self.session.read().await;
        if session.is_some() {
            return Ok(());
        }
        drop(session);
        self.login().await
    }

    /// Send an authenticated request, re-authenticating once on 403.
    ///
    /// `build` is called again for the retry, so it must be repeatable.
    async fn execute<F>(&self, endpoint: &str, build: F) -> Result<String, TorrentClientError>
    where
        F: Fn(&Client, &str) -> Result<RequestBuilder, TorrentClientError>,
    {
        self.ensure_authenticated().await?;

        let url = format!("{}{}", self.base_url(), endpoint);
        debug!(endpoint, "qBittorrent request");
        let mut response = build(&self.client, &url)?
            .send()
            .await
            .map_err(map_send_error)?;

        if response.status() == StatusCode::FORBIDDEN {
            warn!("qBittorrent session expired, re-authenticating");
            {
                let mut session = self.session.write().await;
                *session = None;
            }
            self.login().await?;

            response = build(&self.client, &url)?
                .send()
                .await
                .map_err(map_send_error)?;
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TorrentClientError::ApiError(e.to_string()))?;

        match status {
            s if s.is_success() => Ok(body),
            StatusCode::NOT_FOUND => Err(TorrentClientError::EndpointNotFound(endpoint.to_string())),
            StatusCode::CONFLICT => Err(TorrentClientError::Conflict(format!(
                "{}: {}",
                endpoint,
                truncate(&body)
            ))),
            StatusCode::UNSUPPORTED_MEDIA_TYPE => {
                Err(TorrentClientError::InvalidTorrent(truncate(&body)))
            }
            s => Err(TorrentClientError::ApiError(format!(
                "HTTP {} from {}: {}",
                s,
                endpoint,
                truncate(&body)
            ))),
        }
    }

    /// Make an authenticated GET request.
    async fn get(&self, endpoint: &str) -> Result<String, TorrentClientError> {
        self.execute(endpoint, |client, url| Ok(client.get(url)))
            .await
    }

    /// Make an authenticated POST request with form data.
    async fn post_form(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<String, TorrentClientError> {
        self.execute(endpoint, |client, url| Ok(client.post(url).form(params)))
            .await
    }
}

/// Map a reqwest send failure to a client error.
fn map_send_error(e: reqwest::Error) -> TorrentClientError {
    if e.is_timeout() {
        TorrentClientError::Timeout
    } else if e.is_connect() {
        TorrentClientError::ConnectionFailed(e.to_string())
    } else {
        TorrentClientError::ApiError(e.to_string())
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(100).collect()
}

/// Build the multipart form for `torrents/add`.
///
/// Both `paused` (API < 2.11) and `stopped` (qBittorrent 5) are sent.
fn add_form(request: &AddTorrentRequest) -> Result<multipart::Form, TorrentClientError> {
    let mut form = match request {
        AddTorrentRequest::Magnet { uri, .. } => multipart::Form::new().text("urls", uri.clone()),
        AddTorrentRequest::TorrentFile { data, filename, .. } => {
            let part = multipart::Part::bytes(data.clone())
                .file_name(
                    filename
                        .clone()
                        .unwrap_or_else(|| "upload.torrent".to_string()),
                )
                .mime_str(TORRENT_MIME)
                .map_err(|e| TorrentClientError::InvalidTorrent(e.to_string()))?;
            multipart::Form::new().part("torrents", part)
        }
    };

    if !request.tags().is_empty() {
        form = form.text("tags", request.tags().join(","));
    }
    if request.is_paused() {
        form = form.text("paused", "true").text("stopped", "true");
    }

    Ok(form)
}

/// qBittorrent torrent info response.
#[derive(Debug, Deserialize)]
struct QBTorrentInfo {
    hash: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    up_limit: i64,
}

impl QBTorrentInfo {
    fn into_torrent_info(self) -> TorrentInfo {
        TorrentInfo {
            hash: self.hash.to_lowercase(),
            name: self.name,
            paused: is_paused_state(&self.state),
            category: if self.category.is_empty() {
                None
            } else {
                Some(self.category)
            },
            tags: parse_tags(&self.tags),
            upload_limit: parse_upload_limit(self.up_limit),
        }
    }
}

/// qBittorrent tracker entry response.
#[derive(Debug, Deserialize)]
struct QBTracker {
    url: String,
}

/// qBittorrent < 5 says "paused", 5.x says "stopped".
fn is_paused_state(state: &str) -> bool {
    matches!(state, "pausedDL" | "pausedUP" | "stoppedDL" | "stoppedUP")
}

/// Tags come back as one comma-separated string.
fn parse_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// The API reports "no limit" as -1 (or 0 on some versions).
fn parse_upload_limit(up_limit: i64) -> UploadLimit {
    if up_limit > 0 {
        UploadLimit::BytesPerSec(up_limit as u64)
    } else {
        UploadLimit::Unlimited
    }
}

/// Value for the `limit` field of `torrents/setUploadLimit`.
fn upload_limit_param(limit: UploadLimit) -> String {
    match limit {
        UploadLimit::Unlimited => "-1".to_string(),
        UploadLimit::BytesPerSec(bytes) => bytes.to_string(),
    }
}

/// `torrents/categories` returns an object keyed by category name.
fn parse_categories(body: &str) -> Result<Vec<String>, TorrentClientError> {
    let categories: HashMap<String, serde_json::Value> = serde_json::from_str(body)
        .map_err(|e| TorrentClientError::ApiError(format!("Failed to parse categories: {}", e)))?;
    let mut names: Vec<String> = categories.into_keys().collect();
    names.sort();
    Ok(names)
}

#[async_trait]
impl TorrentClient for QBittorrentClient {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    async fn add_torrent(&self, request: AddTorrentRequest) -> Result<(), TorrentClientError> {
        // Fail on a bad file part before touching the network.
        add_form(&request)?;

        let body = self
            .execute("/api/v2/torrents/add", |client, url| {
                Ok(client.post(url).multipart(add_form(&request)?))
            })
            .await?;

        if body.trim() == "Fails." {
            return Err(TorrentClientError::InvalidTorrent(
                "qBittorrent rejected the torrent (invalid or already added)".to_string(),
            ));
        }

        Ok(())
    }

    async fn list_torrents(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        let endpoint = match &filters.tag {
            Some(tag) => format!("/api/v2/torrents/info?tag={}", urlencoding::encode(tag)),
            None => "/api/v2/torrents/info".to_string(),
        };

        let response = self.get(&endpoint).await?;
        let torrents: Vec<QBTorrentInfo> = serde_json::from_str(&response)
            .map_err(|e| TorrentClientError::ApiError(format!("Failed to parse response: {}", e)))?;

        Ok(torrents.into_iter().map(|t| t.into_torrent_info()).collect())
    }

    async fn get_torrent(&self, hash: &str) -> Result<TorrentInfo, TorrentClientError> {
        let hash_lower = hash.to_lowercase();
        let endpoint = format!("/api/v2/torrents/info?hashes={}", hash_lower);
        let response = self.get(&endpoint).await?;

        let torrents: Vec<QBTorrentInfo> = serde_json::from_str(&response)
            .map_err(|e| TorrentClientError::ApiError(format!("Failed to parse response: {}", e)))?;

        torrents
            .into_iter()
            .next()
            .map(|t| t.into_torrent_info())
            .ok_or_else(|| TorrentClientError::TorrentNotFound(hash.to_string()))
    }

    async fn get_trackers(&self, hash: &str) -> Result<Vec<TrackerEntry>, TorrentClientError> {
        let hash_lower = hash.to_lowercase();
        let endpoint = format!("/api/v2/torrents/trackers?hash={}", hash_lower);
        let response = match self.get(&endpoint).await {
            Err(TorrentClientError::EndpointNotFound(_)) => {
                return Err(TorrentClientError::TorrentNotFound(hash.to_string()));
            }
            other => other?,
        };

        let trackers: Vec<QBTracker> = serde_json::from_str(&response)
            .map_err(|e| TorrentClientError::ApiError(format!("Failed to parse trackers: {}", e)))?;

        Ok(trackers.into_iter().map(|t| TrackerEntry::new(t.url)).collect())
    }

    async fn list_categories(&self) -> Result<Vec<String>, TorrentClientError> {
        let response = self.get("/api/v2/torrents/categories").await?;
        parse_categories(&response)
    }

    async fn create_category(&self, name: &str) -> Result<(), TorrentClientError> {
        self.post_form(
            "/api/v2/torrents/createCategory",
            &[("category", name), ("savePath", "")],
        )
        .await?;
        Ok(())
    }

    async fn set_category(&self, hash: &str, category: &str) -> Result<(), TorrentClientError> {
        let hash_lower = hash.to_lowercase();
        self.post_form(
            "/api/v2/torrents/setCategory",
            &[("hashes", &hash_lower), ("category", category)],
        )
        .await?;
        Ok(())
    }

    async fn set_upload_limit(
        &self,
        hash: &str,
        limit: UploadLimit,
    ) -> Result<(), TorrentClientError> {
        let hash_lower = hash.to_lowercase();
        let limit_str = upload_limit_param(limit);
        self.post_form(
            "/api/v2/torrents/setUploadLimit",
            &[("hashes", &hash_lower), ("limit", &limit_str)],
        )
        .await?;
        Ok(())
    }

    async fn remove_tags(&self, hash: &str, tags: &[String]) -> Result<(), TorrentClientError> {
        let hash_lower = hash.to_lowercase();
        let tags = tags.join(",");
        self.post_form(
            "/api/v2/torrents/removeTags",
            &[("hashes", &hash_lower), ("tags", &tags)],
        )
        .await?;
        Ok(())
    }

    async fn delete_tags(&self, tags: &[String]) -> Result<(), TorrentClientError> {
        let tags = tags.join(",");
        self.post_form("/api/v2/torrents/deleteTags", &[("tags", &tags)])
            .await?;
        Ok(())
    }

    async fn resume_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        let hash_lower = hash.to_lowercase();
        match self
            .post_form("/api/v2/torrents/resume", &[("hashes", &hash_lower)])
            .await
        {
            // qBittorrent 5 renamed resume to start.
            Err(TorrentClientError::EndpointNotFound(_)) => {
                debug!("torrents/resume not available, using torrents/start");
                self.post_form("/api/v2/torrents/start", &[("hashes", &hash_lower)])
                    .await?;
            }
            other => {
                other?;
            }
        }
        Ok(())
    }
}
