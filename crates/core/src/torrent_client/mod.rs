//! Torrent client abstraction.
//!
//! This module provides the `TorrentClient` trait consumed by the ingestion
//! engine and its qBittorrent WebUI implementation.

mod qbittorrent;
mod types;

pub use qbittorrent::QBittorrentClient;
pub use types::*;
