//! Savora saves media from public posts: a link goes through a headless
//! page render and a structural extractor, and the resulting media items
//! feed a persistent, resumable download scheduler backed by SQLite.

pub mod core;
pub mod download;
pub mod media;
pub mod parse;
pub mod render;
pub mod storage;

pub use crate::core::error::{AppError, AppResult, DownloadError, ParseError};
pub use crate::download::{DownloadEvent, DownloadStatus, DownloadTask, MediaKind, PersistentDownloadManager};
pub use crate::media::{MediaItem, MediaRepository};
