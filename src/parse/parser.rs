//! Link parse orchestrator: URL → rendered markup → [`ParsedPost`].
//!
//! Composes the renderer and the extractor into a single classified
//! operation. Expected failures come back as tagged [`ParseError`] values,
//! never as panics or `Err` plumbing the caller has to dissect.

use std::time::Duration;

use crate::core::config;
use crate::core::error::ParseError;
use crate::parse::{extract_post, markers, ParsedPost};
use crate::render::{PageRenderer, RenderRequest};

/// Outcome of one parse operation. Exactly one of these shapes holds:
/// success (`content` set, `error` empty), media-less success (`content` set,
/// `error == Empty`), or failure (`content` empty, `error` set).
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub content: Option<ParsedPost>,
    pub error: Option<ParseError>,
}

impl ParseOutcome {
    fn failure(error: ParseError) -> Self {
        Self { content: None, error: Some(error) }
    }
}

/// Parses post links through an injected [`PageRenderer`].
pub struct LinkParser<R> {
    renderer: R,
    timeout: Duration,
    poll_interval: Duration,
}

impl<R: PageRenderer> LinkParser<R> {
    /// Parser with the configured default render timeout and poll interval.
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            timeout: config::render::timeout(),
            poll_interval: config::render::poll_interval(),
        }
    }

    /// Overrides the render timeout (mainly for tests).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Renders the page behind `url`, waits for the post container, and
    /// extracts its media. A render that produces no markup maps to
    /// `NetworkTimeout`; a render whose markup lacks the container maps to
    /// `StructureChanged`; intact structure without media tags the content
    /// `Empty`.
    pub async fn parse_link(&self, url: &str) -> ParseOutcome {
        let request = RenderRequest {
            url: url.to_string(),
            timeout: self.timeout,
            wait_marker: Some(markers::POST.to_string()),
            poll_interval: self.poll_interval,
        };

        let Some(markup) = self.renderer.fetch_markup(&request).await else {
            log::warn!("Parse of {} failed: renderer returned nothing", url);
            return ParseOutcome::failure(ParseError::NetworkTimeout);
        };

        match extract_post(&markup) {
            Ok(post) if post.is_empty() => {
                log::info!("Parsed {} but found no media", url);
                ParseOutcome {
                    content: Some(post),
                    error: Some(ParseError::Empty),
                }
            }
            Ok(post) => {
                log::info!(
                    "Parsed {}: {} image(s), {} video(s)",
                    url,
                    post.images.len(),
                    post.videos.len()
                );
                ParseOutcome { content: Some(post), error: None }
            }
            Err(error) => {
                log::warn!("Parse of {} failed: {}", url, error.kind());
                ParseOutcome::failure(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct CannedRenderer(Option<String>);

    #[async_trait]
    impl PageRenderer for CannedRenderer {
        async fn fetch_markup(&self, _request: &RenderRequest) -> Option<String> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn test_null_markup_maps_to_network_timeout() {
        let parser = LinkParser::new(CannedRenderer(None));
        let outcome = parser.parse_link("https://x.com/u/status/1").await;
        assert!(outcome.content.is_none());
        assert_eq!(outcome.error, Some(ParseError::NetworkTimeout));
    }

    #[tokio::test]
    async fn test_missing_container_maps_to_structure_changed() {
        let parser = LinkParser::new(CannedRenderer(Some("<div>redesigned</div>".into())));
        let outcome = parser.parse_link("https://x.com/u/status/1").await;
        assert!(outcome.content.is_none());
        assert_eq!(outcome.error, Some(ParseError::StructureChanged));
    }

    #[tokio::test]
    async fn test_structure_without_media_is_empty_with_content() {
        let markup = r#"<article data-testid="tweet"><div data-testid="tweetText"><span>hi</span></div></article>"#;
        let parser = LinkParser::new(CannedRenderer(Some(markup.into())));
        let outcome = parser.parse_link("https://x.com/u/status/1").await;
        assert!(outcome.content.is_some());
        assert_eq!(outcome.error, Some(ParseError::Empty));
    }

    #[tokio::test]
    async fn test_successful_parse_has_no_error() {
        let markup = r#"<article data-testid="tweet"><div data-testid="tweetPhoto"><img src="https://pbs.example/a.jpg"/></div></article>"#;
        let parser = LinkParser::new(CannedRenderer(Some(markup.into())));
        let outcome = parser.parse_link("https://x.com/u/status/1").await;
        let post = outcome.content.unwrap();
        assert_eq!(post.images.len(), 1);
        assert!(outcome.error.is_none());
    }
}
