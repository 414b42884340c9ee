//! Link parsing: rendered post markup → structured media references.

pub mod cache;
pub mod extractor;
pub mod parser;

use serde::Serialize;

pub use cache::{CacheStats, ParseCache};
pub use extractor::extract_post;
pub use parser::{LinkParser, ParseOutcome};

/// Structural markers the extractor depends on. These are `data-testid`
/// values the source platform keeps stable across visual redesigns; when one
/// disappears the parse surfaces `StructureChanged` instead of guessing.
pub mod markers {
    /// Primary content container for a single post.
    pub const POST: &str = "tweet";
    /// One photo/video slot inside the post.
    pub const PHOTO_SLOT: &str = "tweetPhoto";
    /// Video player component inside a slot.
    pub const VIDEO_COMPONENT: &str = "videoComponent";
    /// Poster account avatar block.
    pub const AVATAR: &str = "Tweet-User-Avatar";
    /// Poster account name block.
    pub const USER_NAME: &str = "User-Name";
    /// Post body text block.
    pub const TEXT: &str = "tweetText";
}

/// Parsed result of one post: account metadata plus every media reference
/// the post carries. Transient value owned by the caller; only the media
/// items derived from it are persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedPost {
    pub avatar_url: Option<String>,
    pub account_name: Option<String>,
    pub text: Option<String>,
    /// Video variants in document order.
    pub videos: Vec<VideoVariant>,
    /// Image URLs in document order, deduplicated.
    pub images: Vec<String>,
}

/// One video slot: a poster image plus its typed sources. The first source
/// is the default one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoVariant {
    pub poster: Option<String>,
    pub sources: Vec<VideoSource>,
}

impl VideoVariant {
    /// URL of the default (first) source, if the variant has any.
    pub fn default_source(&self) -> Option<&str> {
        self.sources.first().map(|s| s.url.as_str())
    }
}

/// A single `<source>` entry of a video element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoSource {
    pub url: String,
    pub mime_type: Option<String>,
}

impl ParsedPost {
    /// True when the post structure parsed but no media is attached.
    pub fn is_empty(&self) -> bool {
        self.videos.is_empty() && self.images.is_empty()
    }
}
