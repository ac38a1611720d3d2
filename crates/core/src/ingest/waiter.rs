//! Waiting for a submitted torrent to register on the client.
//!
//! qBittorrent registers added torrents asynchronously and the add call does
//! not return a hash, so the waiter polls for the correlation tag until the
//! torrent shows up, the timeout expires, or the caller cancels.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::torrent_client::{TorrentClient, TorrentFilters, TorrentInfo};

use super::types::{IngestError, IngestStage};

/// Polls the client for a tagged torrent.
pub struct RegistrationWaiter<'a> {
    client: &'a dyn TorrentClient,
    timeout: Duration,
    poll_interval: Duration,
}

impl<'a> RegistrationWaiter<'a> {
    pub fn new(client: &'a dyn TorrentClient, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            client,
            timeout,
            poll_interval,
        }
    }

    /// Wait until a torrent carrying `tag` is listed.
    ///
    /// Polls at least once. Failed polls are logged and retried until the
    /// deadline; the last sleep is shortened so the timeout fires on time.
    /// Completion of `cancel` aborts the wait with [`IngestError::Cancelled`].
    pub async fn wait<F>(&self, tag: &str, cancel: F) -> Result<TorrentInfo, IngestError>
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let filters = TorrentFilters::tagged(tag);
        tokio::pin!(cancel);

        let mut polls: u32 = 0;
        loop {
            polls += 1;
            let poll = tokio::time::timeout_at(deadline, self.client.list_torrents(&filters));

            tokio::select! {
                biased;
                _ = &mut cancel => {
                    return Err(IngestError::Cancelled {
                        tag: tag.to_string(),
                        after: IngestStage::Submitted,
                    });
                }
                result = poll => match result {
                    Ok(Ok(torrents)) => {
                        // Older WebUI versions ignore the tag filter.
                        if let Some(torrent) = torrents
                            .into_iter()
                            .find(|t| t.tags.iter().any(|x| x == tag))
                        {
                            debug!(
                                tag,
                                polls,
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                hash = %torrent.hash,
                                "Torrent registered"
                            );
                            return Ok(torrent);
                        }
                    }
                    Ok(Err(e)) => {
                        warn!(tag, poll = polls, error = %e, "Registration poll failed, retrying");
                    }
                    Err(_) => {
                        debug!(tag, poll = polls, "Registration poll outlived the deadline");
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(IngestError::RegistrationTimeout {
                    tag: tag.to_string(),
                    timeout: self.timeout,
                });
            }

            let nap = self.poll_interval.min(deadline - now);
            tokio::select! {
                biased;
                _ = &mut cancel => {
                    return Err(IngestError::Cancelled {
                        tag: tag.to_string(),
                        after: IngestStage::Submitted,
                    });
                }
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockOperation, MockRegistration, MockTorrentClient};
    use crate::torrent_client::{AddTorrentRequest, TorrentClientError};
    use std::future::pending;

    const TAG: &str = "qbt-rules-test";

    async fn submit(client: &MockTorrentClient) {
        let magnet = fixtures::magnet(fixtures::HASH_A, &["https://tracker.private.example/announce"]);
        client
            .add_torrent(
                AddTorrentRequest::magnet(magnet)
                    .with_tag(TAG)
                    .with_paused(true),
            )
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_found_on_first_poll() {
        let client = MockTorrentClient::new();
        submit(&client).await;

        let waiter = RegistrationWaiter::new(&client, Duration::from_secs(20), Duration::from_secs(1));
        let torrent = waiter.wait(TAG, pending()).await.unwrap();

        assert_eq!(torrent.hash, fixtures::HASH_A);
        assert_eq!(client.call_count(MockOperation::List).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_found_on_poll_k() {
        let client = MockTorrentClient::new();
        client.set_registration(MockRegistration::AfterPolls(3)).await;
        submit(&client).await;

        let started = Instant::now();
        let waiter = RegistrationWaiter::new(&client, Duration::from_secs(20), Duration::from_secs(1));
        let torrent = waiter.wait(TAG, pending()).await.unwrap();

        assert_eq!(torrent.hash, fixtures::HASH_A);
        // Hidden for 3 polls, found on the 4th, three intervals later.
        assert_eq!(client.call_count(MockOperation::List).await, 4);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_on_time() {
        let client = MockTorrentClient::new();
        client.set_registration(MockRegistration::Never).await;
        submit(&client).await;

        let started = Instant::now();
        let waiter = RegistrationWaiter::new(
            &client,
            Duration::from_millis(2500),
            Duration::from_secs(1),
        );
        let err = waiter.wait(TAG, pending()).await.unwrap_err();

        assert!(matches!(err, IngestError::RegistrationTimeout { .. }));
        // Polls at 0s, 1s, 2s and 2.5s; the last nap is clamped.
        assert_eq!(started.elapsed(), Duration::from_millis(2500));
        assert_eq!(client.call_count(MockOperation::List).await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_polls_once() {
        let client = MockTorrentClient::new();
        let waiter = RegistrationWaiter::new(&client, Duration::ZERO, Duration::from_secs(1));
        let err = waiter.wait(TAG, pending()).await.unwrap_err();

        assert!(matches!(err, IngestError::RegistrationTimeout { .. }));
        assert_eq!(client.call_count(MockOperation::List).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_errors_are_retried() {
        let client = MockTorrentClient::new();
        submit(&client).await;
        client
            .fail_next(MockOperation::List, TorrentClientError::Timeout)
            .await;
        client
            .fail_next(
                MockOperation::List,
                TorrentClientError::ConnectionFailed("refused".to_string()),
            )
            .await;

        let waiter = RegistrationWaiter::new(&client, Duration::from_secs(20), Duration::from_secs(1));
        let torrent = waiter.wait(TAG, pending()).await.unwrap();

        assert_eq!(torrent.hash, fixtures::HASH_A);
        assert_eq!(client.call_count(MockOperation::List).await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_errors_end_in_timeout() {
        let client = MockTorrentClient::new();
        submit(&client).await;
        client.fail_always(MockOperation::List).await;

        let waiter = RegistrationWaiter::new(&client, Duration::from_secs(3), Duration::from_secs(1));
        let err = waiter.wait(TAG, pending()).await.unwrap_err();
        assert!(matches!(err, IngestError::RegistrationTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_tags_are_ignored() {
        let client = MockTorrentClient::new();
        submit(&client).await;

        let waiter = RegistrationWaiter::new(&client, Duration::from_secs(2), Duration::from_secs(1));
        let err = waiter.wait("qbt-rules-someone-else", pending()).await.unwrap_err();
        assert!(matches!(err, IngestError::RegistrationTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_waiting() {
        let client = MockTorrentClient::new();
        client.set_registration(MockRegistration::Never).await;
        submit(&client).await;

        let started = Instant::now();
        let waiter = RegistrationWaiter::new(&client, Duration::from_secs(60), Duration::from_secs(1));
        let cancel = tokio::time::sleep(Duration::from_millis(4500));
        let err = waiter.wait(TAG, cancel).await.unwrap_err();

        assert!(matches!(err, IngestError::Cancelled { .. }));
        assert_eq!(started.elapsed(), Duration::from_millis(4500));
    }
}
