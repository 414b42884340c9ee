use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration constants for the downloader

/// Download folder path
/// Read from SAVORA_DOWNLOAD_DIR environment variable.
/// Supports tilde (~) expansion for home directory.
pub static DOWNLOAD_FOLDER: Lazy<String> = Lazy::new(|| {
    env::var("SAVORA_DOWNLOAD_DIR").unwrap_or_else(|_| "~/downloads/savora".to_string())
});

/// SQLite database path
/// Read from SAVORA_DB environment variable.
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("SAVORA_DB").unwrap_or_else(|_| "savora.sqlite".to_string()));

/// Resolved download directory with tilde expansion applied.
pub fn download_dir() -> PathBuf {
    PathBuf::from(shellexpand::tilde(DOWNLOAD_FOLDER.as_str()).to_string())
}

/// Transfer scheduling configuration
pub mod downloads {
    use super::Duration;

    /// Maximum number of concurrent transfers (permit pool size)
    pub const MAX_CONCURRENT: usize = 3;

    /// Minimum interval between durable progress flushes per task (in milliseconds).
    /// Byte counters still update the in-memory overlay on every chunk.
    pub const PROGRESS_FLUSH_MS: u64 = 400;

    /// Progress flush interval duration
    pub fn flush_interval() -> Duration {
        Duration::from_millis(PROGRESS_FLUSH_MS)
    }
}

/// Terminal-task retention configuration
pub mod retention {
    use super::Duration;

    /// Interval between retention sweeps (in seconds)
    pub const CLEANUP_INTERVAL_SECS: u64 = 60;

    /// Age after which terminal tasks are purged (in seconds)
    pub const FINISHED_RETENTION_SECS: u64 = 6 * 60 * 60; // 6h

    /// Sweep interval duration
    pub fn cleanup_interval() -> Duration {
        Duration::from_secs(CLEANUP_INTERVAL_SECS)
    }

    /// Retention window duration
    pub fn retention_window() -> Duration {
        Duration::from_secs(FINISHED_RETENTION_SECS)
    }
}

/// Page renderer configuration
pub mod render {
    use super::Duration;

    /// Hard wall-clock timeout around the whole fetch-and-wait sequence (in milliseconds)
    pub const TIMEOUT_MS: u64 = 25_000;

    /// Interval between content-marker presence checks (in milliseconds)
    pub const POLL_INTERVAL_MS: u64 = 500;

    /// Desktop user agent override. The mobile DOM variant of the page lacks
    /// the markers the extractor depends on, so every render requests the
    /// desktop template.
    pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
         AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 savora/0.3";

    /// Render timeout duration
    pub fn timeout() -> Duration {
        Duration::from_millis(TIMEOUT_MS)
    }

    /// Poll interval duration
    pub fn poll_interval() -> Duration {
        Duration::from_millis(POLL_INTERVAL_MS)
    }
}

/// Network configuration for the transfer client
pub mod network {
    use super::Duration;

    /// TCP connect timeout (in seconds)
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;

    /// Read timeout for response bodies (in seconds). The download path has
    /// no overall deadline; long transfers rely on these per-operation
    /// timeouts instead.
    pub const READ_TIMEOUT_SECS: u64 = 30;

    /// Maximum idle connections kept per host for reuse
    pub const POOL_MAX_IDLE_PER_HOST: usize = 8;

    /// Idle connection lifetime (in seconds)
    pub const POOL_IDLE_TIMEOUT_SECS: u64 = 300;

    /// Connect timeout duration
    pub fn connect_timeout() -> Duration {
        Duration::from_secs(CONNECT_TIMEOUT_SECS)
    }

    /// Read timeout duration
    pub fn read_timeout() -> Duration {
        Duration::from_secs(READ_TIMEOUT_SECS)
    }
}

/// Parse-result cache configuration
pub mod parse {
    /// Time-to-live for cached parse results (in seconds)
    pub const CACHE_TTL_SECS: u64 = 5 * 60;

    /// Maximum number of cached parse results (LRU-bounded)
    pub const CACHE_CAPACITY: u64 = 32;
}

/// Background executor retry configuration
pub mod retry {
    use super::Duration;

    /// Maximum number of retry attempts for a background transfer
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Initial delay before the first retry (in seconds)
    pub const INITIAL_DELAY_SECS: u64 = 2;

    /// Initial retry delay duration
    pub fn initial_delay() -> Duration {
        Duration::from_secs(INITIAL_DELAY_SECS)
    }
}
