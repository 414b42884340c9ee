//! Shared fixtures: a temp-file database pool, a canned page renderer, and
//! a minimal local HTTP byte server with range support.

#![allow(dead_code)]

use async_trait::async_trait;
use savora::render::{PageRenderer, RenderRequest};
use savora::storage::db::{self, DbPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Database pool backed by a file in a temp dir. The dir guard must stay
/// alive for the duration of the test.
pub fn temp_pool() -> (tempfile::TempDir, Arc<DbPool>) {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = db::create_pool(dir.path().join("savora.sqlite")).expect("pool");
    (dir, Arc::new(pool))
}

/// Renderer returning a fixed markup response, counting calls.
pub struct FakeRenderer {
    markup: Option<String>,
    calls: AtomicUsize,
}

impl FakeRenderer {
    pub fn returning(markup: impl Into<String>) -> Self {
        Self {
            markup: Some(markup.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Renderer that fails every fetch, like an unreachable page.
    pub fn failing() -> Self {
        Self {
            markup: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn fetch_markup(&self, _request: &RenderRequest) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.markup.clone()
    }
}

/// Behavior knobs for [`ByteServer`].
#[derive(Clone)]
pub struct ServerOptions {
    /// Force this HTTP status on every request (with an empty body).
    pub force_status: Option<u16>,
    /// Honor `Range: bytes=N-` requests with a 206 response.
    pub support_range: bool,
    /// Bytes per write.
    pub chunk_size: usize,
    /// Sleep between writes, to keep a transfer in flight long enough for
    /// pause/cancel to land.
    pub chunk_delay: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            force_status: None,
            support_range: true,
            chunk_size: 8 * 1024,
            chunk_delay: Duration::ZERO,
        }
    }
}

/// One-endpoint HTTP server handing out a fixed byte payload.
pub struct ByteServer {
    url: String,
    handle: JoinHandle<()>,
}

impl ByteServer {
    pub async fn start(body: Vec<u8>, options: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let body = body.clone();
                let options = options.clone();
                tokio::spawn(async move {
                    let _ = serve_one(stream, body, options).await;
                });
            }
        });
        Self {
            url: format!("http://{}/payload.bin", addr),
            handle,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for ByteServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_one(
    mut stream: tokio::net::TcpStream,
    body: Vec<u8>,
    options: ServerOptions,
) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
        if request.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let request = String::from_utf8_lossy(&request);

    if let Some(status) = options.force_status {
        let head = format!(
            "HTTP/1.1 {} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            status
        );
        stream.write_all(head.as_bytes()).await?;
        return stream.shutdown().await;
    }

    let range_offset = request
        .lines()
        .find_map(|line| line.strip_prefix("Range: bytes="))
        .and_then(|range| range.trim_end_matches('-').trim().parse::<usize>().ok())
        .filter(|_| options.support_range);

    let (head, payload) = match range_offset {
        Some(offset) if offset < body.len() => (
            format!(
                "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {}-{}/{}\r\nConnection: close\r\n\r\n",
                body.len() - offset,
                offset,
                body.len() - 1,
                body.len()
            ),
            body[offset..].to_vec(),
        ),
        _ => (
            format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            ),
            body,
        ),
    };

    stream.write_all(head.as_bytes()).await?;
    for chunk in payload.chunks(options.chunk_size.max(1)) {
        stream.write_all(chunk).await?;
        stream.flush().await?;
        if options.chunk_delay > Duration::ZERO {
            tokio::time::sleep(options.chunk_delay).await;
        }
    }
    stream.shutdown().await
}
