//! Download scheduling and transfer execution.

pub mod manager;
pub mod task;
pub mod worker;

pub use manager::{DownloadEvent, PersistentDownloadManager};
pub use task::{DownloadStatus, DownloadTask, MediaKind};
pub use worker::{run_download_work, run_with_retry, WorkInput, WorkOutcome};

use crate::core::config::network;
use std::time::Duration;

/// Shared HTTP client for media transfers, tuned from the network config.
#[allow(clippy::expect_used)]
pub fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(network::connect_timeout())
        .read_timeout(network::read_timeout())
        .pool_max_idle_per_host(network::POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Duration::from_secs(network::POOL_IDLE_TIMEOUT_SECS))
        .build()
        .expect("HTTP client configuration is static and valid")
}
