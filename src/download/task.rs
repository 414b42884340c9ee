//! Download task model and lifecycle.

use crate::core::utils::now_millis;
use serde::{Deserialize, Serialize};

/// Kind of media behind a task's URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    /// Serialize to string for DB storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }

    /// Parse from stored string value.
    pub fn parse(s: &str) -> Self {
        match s {
            "video" => MediaKind::Video,
            "audio" => MediaKind::Audio,
            _ => MediaKind::Image,
        }
    }
}

/// Lifecycle status of a task.
///
/// `Pending → Downloading → {Completed | Error | Paused | Canceled}`;
/// `Paused → Pending` on resume, `Error → Pending` on retry. `Completed`
/// and `Canceled` are terminal: nothing transitions out of them
/// automatically. Only the scheduler moves bytes/status; user actions move
/// status alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Paused,
    Completed,
    Error,
    Canceled,
}

impl DownloadStatus {
    /// Serialize to string for DB storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Pending => "Pending",
            DownloadStatus::Downloading => "Downloading",
            DownloadStatus::Paused => "Paused",
            DownloadStatus::Completed => "Completed",
            DownloadStatus::Error => "Error",
            DownloadStatus::Canceled => "Canceled",
        }
    }

    /// Parse from stored string value.
    pub fn parse(s: &str) -> Self {
        match s {
            "Downloading" => DownloadStatus::Downloading,
            "Paused" => DownloadStatus::Paused,
            "Completed" => DownloadStatus::Completed,
            "Error" => DownloadStatus::Error,
            "Canceled" => DownloadStatus::Canceled,
            _ => DownloadStatus::Pending,
        }
    }

    /// True for states the retention sweep may purge.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed | DownloadStatus::Canceled | DownloadStatus::Error
        )
    }
}

/// One download unit: a single media URL bound for local storage.
///
/// Rows are exclusively owned by the download manager and its backing
/// store; nothing else mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadTask {
    /// Unique task identifier (UUID), stable for the task's lifetime.
    pub id: String,
    /// Direct media URL to transfer.
    pub url: String,
    /// Target file name inside the download directory.
    pub file_name: String,
    /// Media kind of the payload.
    pub kind: MediaKind,
    /// Originating post URL.
    pub source_url: String,
    /// Normalized post id (foreign reference into the posts table).
    pub post_id: Option<String>,
    /// Display title (usually the leading post text).
    pub title: Option<String>,
    /// Thumbnail URL for list display.
    pub thumbnail_url: Option<String>,
    /// Expected size in bytes when the server reported one.
    pub total_bytes: Option<u64>,
    /// Bytes transferred so far.
    pub downloaded_bytes: u64,
    /// Lifecycle status.
    pub status: DownloadStatus,
    /// Human-readable message for the latest error, if any.
    pub error: Option<String>,
    /// Stable error kind tag ("Http", "EmptyBody", "Io", "Unknown").
    pub error_kind: Option<String>,
    /// Numeric error code when one exists (HTTP status).
    pub error_code: Option<u16>,
    /// Creation timestamp (millis since epoch).
    pub created_at: i64,
    /// Last update timestamp (millis since epoch).
    pub updated_at: i64,
}

impl DownloadTask {
    /// Creates a fresh `Pending` task with a generated id.
    pub fn new(
        url: impl Into<String>,
        file_name: impl Into<String>,
        kind: MediaKind,
        source_url: impl Into<String>,
    ) -> Self {
        let now = now_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            file_name: file_name.into(),
            kind,
            source_url: source_url.into(),
            post_id: None,
            title: None,
            thumbnail_url: None,
            total_bytes: None,
            downloaded_bytes: 0,
            status: DownloadStatus::Pending,
            error: None,
            error_kind: None,
            error_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attaches the post reference and display metadata.
    #[must_use]
    pub fn with_post(
        mut self,
        post_id: Option<String>,
        title: Option<String>,
        thumbnail_url: Option<String>,
    ) -> Self {
        self.post_id = post_id;
        self.title = title;
        self.thumbnail_url = thumbnail_url;
        self
    }

    /// Progress fraction in `[0, 1]`; 0 while the total is unknown or zero.
    pub fn progress(&self) -> f32 {
        match self.total_bytes {
            Some(total) if total > 0 => self.downloaded_bytes as f32 / total as f32,
            _ => 0.0,
        }
    }
}
