//! Shared types for external client interfaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which download client owns a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadClientKind {
    Qbittorrent,
    Sabnzbd,
    Direct,
}

impl DownloadClientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadClientKind::Qbittorrent => "qbittorrent",
            DownloadClientKind::Sabnzbd => "sabnzbd",
            DownloadClientKind::Direct => "direct",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "qbittorrent" => Some(DownloadClientKind::Qbittorrent),
            "sabnzbd" => Some(DownloadClientKind::Sabnzbd),
            "direct" => Some(DownloadClientKind::Direct),
            _ => None,
        }
    }
}

/// Transfer protocol advertised by an indexer result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Torrent,
    Usenet,
    Direct,
}

/// Search query sent to the indexer aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseQuery {
    pub title: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asin: Option<String>,
}

/// One candidate release returned by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleaseCandidate {
    pub title: String,
    pub indexer_id: i64,
    pub indexer_name: String,
    /// Aggregator-side priority, lower wins.
    pub indexer_priority: i32,
    pub download_url: String,
    pub protocol: Protocol,
    pub size_bytes: u64,
    pub seeders: u32,
    /// Indexer flags such as "freeleech".
    #[serde(default)]
    pub flags: Vec<String>,
    /// Alternate slow-download mirrors for direct candidates.
    #[serde(default)]
    pub mirror_urls: Vec<String>,
}

/// One item from the aggregator's combined RSS feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RssItem {
    pub title: String,
    pub indexer_id: i64,
    pub download_url: String,
    pub protocol: Protocol,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}
