//! HttpRenderer — desktop-UA page fetch with marker polling.
//!
//! Loads the URL with a desktop user agent (the extractor depends on the
//! desktop DOM variant), then, when a wait marker was requested, re-fetches
//! on the poll interval until an element carrying the marker shows up and
//! returns that element's serialized markup. The whole sequence runs under
//! one hard timeout. Subresources (images, scripts) are never fetched, which
//! also covers the "image loading disabled" contract for free.

use async_trait::async_trait;
use reqwest::Client;
use select::document::Document;
use select::predicate::Attr;

use crate::core::config;
use crate::render::{PageRenderer, RenderRequest};

/// Production [`PageRenderer`] backed by reqwest.
pub struct HttpRenderer {
    client: Client,
}

impl Default for HttpRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRenderer {
    pub fn new() -> Self {
        // Failing to assemble a UA + timeout client config is a programming
        // error, not a runtime condition.
        #[allow(clippy::expect_used)]
        let client = Client::builder()
            .user_agent(config::render::DESKTOP_USER_AGENT)
            .connect_timeout(config::network::connect_timeout())
            .read_timeout(config::network::read_timeout())
            .build()
            .expect("HTTP client build failed: user_agent + timeout config should always succeed");

        Self { client }
    }

    /// One page load. `None` on any transport failure, including TLS errors
    /// (reqwest aborts the connection before handing us anything).
    async fn load_page(&self, url: &str) -> Option<String> {
        let response = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                log::warn!("Render load failed for {}: {}", url, e);
                return None;
            }
        };

        if !response.status().is_success() {
            log::warn!("Render load for {} returned HTTP {}", url, response.status());
            return None;
        }

        match response.text().await {
            Ok(body) => Some(body),
            Err(e) => {
                log::warn!("Render body read failed for {}: {}", url, e);
                None
            }
        }
    }

    async fn fetch_inner(&self, request: &RenderRequest) -> Option<String> {
        let Some(marker) = request.wait_marker.as_deref() else {
            return self.load_page(&request.url).await;
        };

        // Poll until the marker appears. Each round is a fresh load: pages
        // that populate the marker late do so on the server side too, so a
        // re-fetch is the moral equivalent of re-querying the DOM.
        loop {
            if let Some(body) = self.load_page(&request.url).await {
                if let Some(markup) = extract_marked_element(&body, marker) {
                    return Some(markup);
                }
            } else {
                // Main-frame failure resolves the render, no point polling on.
                return None;
            }
            tokio::time::sleep(request.poll_interval).await;
        }
    }
}

/// Returns the serialized markup of the first element carrying
/// `data-testid=<marker>`, if present.
pub(crate) fn extract_marked_element(body: &str, marker: &str) -> Option<String> {
    let document = Document::from(body);
    document
        .find(Attr("data-testid", marker))
        .next()
        .map(|node| node.html())
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn fetch_markup(&self, request: &RenderRequest) -> Option<String> {
        let started = std::time::Instant::now();
        log::debug!(
            "Rendering url={}, timeout={:?}, marker={:?}",
            request.url,
            request.timeout,
            request.wait_marker
        );

        let result = tokio::time::timeout(request.timeout, self.fetch_inner(request)).await;

        // The client and any in-flight connection are dropped on every path
        // out of here; there is no longer-lived rendering context to leak.
        match result {
            Ok(Some(markup)) => {
                log::debug!(
                    "Render success url={}, length={}, time={:?}",
                    request.url,
                    markup.len(),
                    started.elapsed()
                );
                Some(markup)
            }
            Ok(None) => {
                log::warn!(
                    "Render finished with no result url={}, time={:?}",
                    request.url,
                    started.elapsed()
                );
                None
            }
            Err(_) => {
                log::warn!(
                    "Render timed out url={}, after={:?}",
                    request.url,
                    started.elapsed()
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_marked_element_present() {
        let body = r#"<html><body><div><article data-testid="tweet"><span>hi</span></article></div></body></html>"#;
        let markup = extract_marked_element(body, "tweet").unwrap();
        assert!(markup.contains("data-testid=\"tweet\""));
        assert!(markup.contains("<span>hi</span>"));
    }

    #[test]
    fn test_extract_marked_element_absent() {
        let body = "<html><body><p>loading...</p></body></html>";
        assert!(extract_marked_element(body, "tweet").is_none());
    }

    #[test]
    fn test_extract_marked_element_takes_first_match() {
        let body = r#"<div data-testid="slot"><b>one</b></div><div data-testid="slot"><b>two</b></div>"#;
        let markup = extract_marked_element(body, "slot").unwrap();
        assert!(markup.contains("one"));
        assert!(!markup.contains("two"));
    }
}
