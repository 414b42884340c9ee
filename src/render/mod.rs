//! Page rendering behind an injected capability.
//!
//! The parse pipeline never touches the network directly; it asks a
//! [`PageRenderer`] for the markup of a URL and works from there. That keeps
//! the extractor and orchestrator testable against canned markup, and keeps
//! the actual rendering engine swappable (the production implementation in
//! [`http`] uses a plain desktop-UA fetch with marker polling).

pub mod http;

use async_trait::async_trait;
use std::time::Duration;

use crate::core::config;

pub use http::HttpRenderer;

/// One render request: load `url`, optionally wait for a content marker,
/// and hand back serialized markup.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Page to load.
    pub url: String,
    /// Hard wall-clock timeout around the whole fetch-and-wait sequence.
    pub timeout: Duration,
    /// Optional structural marker (a `data-testid` value) to wait for.
    /// When present, the renderer polls until an element carrying the marker
    /// appears and returns that element's markup only; when absent, the full
    /// document markup is returned after the first successful load.
    pub wait_marker: Option<String>,
    /// Interval between marker presence checks.
    pub poll_interval: Duration,
}

impl RenderRequest {
    /// Request with the configured default timeout and poll interval.
    pub fn new(url: impl Into<String>, wait_marker: Option<String>) -> Self {
        Self {
            url: url.into(),
            timeout: config::render::timeout(),
            wait_marker,
            poll_interval: config::render::poll_interval(),
        }
    }
}

/// A headless page-rendering capability.
///
/// Contract:
/// - Returns `Some(markup)` on success, `None` on every failure: main-frame
///   network error, TLS failure (the connection must be aborted, never
///   trusted), renderer crash, or the request timeout elapsing.
/// - Implementations must tear down whatever rendering context they hold on
///   every exit path, success or not; a render never leaks resources to the
///   caller.
/// - Implementations must not block the calling thread between marker polls;
///   waiting suspends the task.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn fetch_markup(&self, request: &RenderRequest) -> Option<String>;
}

/// Delegating impl so callers can share one renderer behind an `Arc`.
#[async_trait]
impl<T: PageRenderer + ?Sized> PageRenderer for std::sync::Arc<T> {
    async fn fetch_markup(&self, request: &RenderRequest) -> Option<String> {
        self.as_ref().fetch_markup(request).await
    }
}
