//! Media repository: turns post links into saved-media history.
//!
//! Sits between the link parser and storage. Parse results are cached per
//! normalized link, persisted as post rows, and flattened into a media item
//! list ready for the download scheduler.

use crate::core::config::parse as parse_config;
use crate::core::error::ParseError;
use crate::core::utils::{now_millis, sanitize_file_name};
use crate::download::task::MediaKind;
use crate::parse::cache::{CacheStats, ParseCache};
use crate::parse::parser::LinkParser;
use crate::parse::ParsedPost;
use crate::render::PageRenderer;
use crate::storage::db::{self, DbPool};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// The longest leading slice of post text used as a display title.
const TITLE_MAX_CHARS: usize = 60;

/// A fetched post, keyed by its normalized link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Normalized post link (primary key).
    pub id: String,
    /// Link as the user provided it.
    pub url: String,
    pub account_name: Option<String>,
    pub avatar_url: Option<String>,
    pub text: Option<String>,
    /// Fetch timestamp (millis since epoch).
    pub fetched_at: i64,
}

/// One downloadable media entry derived from a parsed post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    /// Direct media URL.
    pub url: String,
    pub kind: MediaKind,
    /// The post link this media came from.
    pub source_url: String,
    /// Normalized post link, when the post row exists.
    pub post_id: Option<String>,
    /// Display title (leading post text).
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
    /// Suggested target file name.
    pub file_name: String,
    /// When the item entered the history (millis since epoch).
    pub saved_at: i64,
}

impl MediaItem {
    pub fn new(url: impl Into<String>, kind: MediaKind, source_url: impl Into<String>) -> Self {
        let url = url.into();
        let file_name = file_name_for_url(&url);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url,
            kind,
            source_url: source_url.into(),
            post_id: None,
            title: None,
            thumbnail_url: None,
            file_name,
            saved_at: now_millis(),
        }
    }
}

/// Canonical form of a post link: trimmed, query and fragment stripped.
/// Links that do not parse as URLs are stripped textually instead.
pub fn normalize_link(link: &str) -> String {
    let trimmed = link.trim();
    match url::Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            let mut normalized = url.to_string();
            // Url::to_string keeps a trailing slash on bare-host links;
            // drop it so textual and parsed forms agree.
            if normalized.ends_with('/') && !trimmed.ends_with('/') {
                normalized.pop();
            }
            normalized
        }
        Err(_) => {
            let without_fragment = trimmed.split('#').next().unwrap_or(trimmed);
            without_fragment.split('?').next().unwrap_or(without_fragment).to_string()
        }
    }
}

/// Suggested file name for a media URL: last path segment, percent-decoded,
/// sanitized for the filesystem. Falls back to `media` when the URL has no
/// usable segment.
pub fn file_name_for_url(media_url: &str) -> String {
    let segment = url::Url::parse(media_url)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
                .map(|s| s.to_string())
        })
        .unwrap_or_default();
    let decoded = urlencoding::decode(&segment)
        .map(|s| s.into_owned())
        .unwrap_or(segment);
    let name = sanitize_file_name(decoded.trim());
    if name.is_empty() || name.chars().all(|c| c == '_' || c == '.') {
        "media".to_string()
    } else {
        name
    }
}

/// Flattens a parsed post into media items.
///
/// Every image becomes one item (its own URL doubles as the thumbnail).
/// Every video variant with at least one source becomes one item using the
/// first source; poster-only variants carry no downloadable URL and are
/// skipped.
pub fn derive_media_items(post: &ParsedPost, source_url: &str, post_id: &str) -> Vec<MediaItem> {
    let title = post.text.as_ref().map(|text| text.chars().take(TITLE_MAX_CHARS).collect::<String>());
    let mut items = Vec::new();
    for video in &post.videos {
        let Some(source_url_direct) = video.default_source() else {
            debug!("Skipping poster-only video variant in {}", source_url);
            continue;
        };
        let mut item = MediaItem::new(source_url_direct.to_string(), MediaKind::Video, source_url);
        item.post_id = Some(post_id.to_string());
        item.title = title.clone();
        item.thumbnail_url = video.poster.clone();
        items.push(item);
    }
    for image in &post.images {
        let mut item = MediaItem::new(image.clone(), MediaKind::Image, source_url);
        item.post_id = Some(post_id.to_string());
        item.title = title.clone();
        item.thumbnail_url = Some(image.clone());
        items.push(item);
    }
    items
}

/// Parse-and-persist front end over the link parser.
pub struct MediaRepository<R: PageRenderer> {
    parser: LinkParser<R>,
    cache: ParseCache,
    pool: Arc<DbPool>,
}

impl<R: PageRenderer> MediaRepository<R> {
    pub fn new(renderer: R, pool: Arc<DbPool>) -> Self {
        Self {
            parser: LinkParser::new(renderer),
            cache: ParseCache::new(
                Duration::from_secs(parse_config::CACHE_TTL_SECS),
                parse_config::CACHE_CAPACITY,
            ),
            pool,
        }
    }

    /// Parses a post link into its media items.
    ///
    /// Results are cached per normalized link. The post row is persisted
    /// even when the post carries no media, so an `Empty` outcome is still
    /// recorded.
    pub async fn parse_link(&self, link: &str) -> Result<Arc<Vec<MediaItem>>, ParseError> {
        let normalized = normalize_link(link);
        if let Some(items) = self.cache.get(&normalized).await {
            let stats = self.cache.stats();
            debug!(
                "Parse cache hit for {} ({} hits / {} misses, {:.0}% hit rate)",
                normalized, stats.hits, stats.misses, stats.hit_rate
            );
            return Ok(items);
        }

        let outcome = self.parser.parse_link(link).await;
        let Some(post) = outcome.content else {
            return Err(outcome.error.unwrap_or(ParseError::Unknown(None)));
        };

        self.persist_post(&normalized, link, &post)
            .map_err(|e| ParseError::Unknown(Some(e.to_string())))?;

        let items = derive_media_items(&post, link, &normalized);
        if items.is_empty() {
            return Err(outcome.error.unwrap_or(ParseError::Empty));
        }
        info!("Parsed {} media items from {}", items.len(), normalized);
        let items = Arc::new(items);
        self.cache.insert(normalized, Arc::clone(&items)).await;
        Ok(items)
    }

    /// Records a finished download in the saved-media history.
    pub fn record_download(&self, item: &MediaItem) -> crate::core::error::AppResult<()> {
        let conn = db::get_connection(&self.pool)?;
        db::insert_media_item(&conn, item)
    }

    /// Saved media history, optionally filtered by kind.
    pub fn history(&self, kind: Option<MediaKind>) -> crate::core::error::AppResult<Vec<MediaItem>> {
        let conn = db::get_connection(&self.pool)?;
        match kind {
            Some(kind) => db::list_media_items_by_kind(&conn, kind),
            None => db::list_media_items(&conn),
        }
    }

    /// Removes one history entry; returns whether it existed.
    pub fn remove_history_item(&self, id: &str) -> crate::core::error::AppResult<bool> {
        let conn = db::get_connection(&self.pool)?;
        db::delete_media_item(&conn, id)
    }

    /// Drops the cached parse for a link, forcing the next parse to render.
    pub async fn invalidate(&self, link: &str) {
        self.cache.invalidate(&normalize_link(link)).await;
    }

    /// Running hit/miss counters for the parse cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn persist_post(&self, normalized: &str, link: &str, post: &ParsedPost) -> crate::core::error::AppResult<()> {
        let conn = db::get_connection(&self.pool)?;
        db::upsert_post(
            &conn,
            &Post {
                id: normalized.to_string(),
                url: link.trim().to_string(),
                account_name: post.account_name.clone(),
                avatar_url: post.avatar_url.clone(),
                text: post.text.clone(),
                fetched_at: now_millis(),
            },
        )
    }
}
