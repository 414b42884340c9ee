//! One-shot download executor.
//!
//! A reliable single-task runner for an (id, url, file name) triple, used
//! when a transfer must outlive the in-process scheduler. Transfers share the
//! scheduler's byte counting, throttled persistence, and error taxonomy, but
//! retries are driven here: transient failures report `Retry`, malformed
//! input and empty bodies fail permanently.

use crate::core::config::downloads;
use crate::core::error::DownloadError;
use crate::core::retry::RetryConfig;
use crate::core::utils::now_millis;
use crate::download::task::DownloadStatus;
use crate::storage::db::{self, DbPool};
use futures_util::StreamExt;
use log::{debug, warn};
use std::io::Write as _;
use std::path::Path;
use std::time::Instant;

/// Validated input for one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkInput {
    pub task_id: String,
    pub url: String,
    pub file_name: String,
}

impl WorkInput {
    /// Builds the input from optional parts; any missing or blank part is
    /// malformed and yields `None` (a permanent failure at the call site).
    pub fn from_parts(
        task_id: Option<&str>,
        url: Option<&str>,
        file_name: Option<&str>,
    ) -> Option<Self> {
        let task_id = task_id?.trim();
        let url = url?.trim();
        let file_name = file_name?.trim();
        if task_id.is_empty() || url.is_empty() || file_name.is_empty() {
            return None;
        }
        Some(Self {
            task_id: task_id.to_string(),
            url: url.to_string(),
            file_name: file_name.to_string(),
        })
    }
}

/// Disposition of one execution attempt.
#[derive(Debug)]
pub enum WorkOutcome {
    /// File fully written and the store updated.
    Success,
    /// Transient failure; the host scheduler should run the work again.
    Retry(DownloadError),
    /// Permanent failure; running again cannot help.
    Failure(DownloadError),
}

impl WorkOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkOutcome::Success)
    }
}

/// Runs one download attempt to completion.
///
/// HTTP and transport failures are transient (`Retry`); an empty response
/// body is permanent (`Failure`). Progress flushes to the store on the usual
/// throttle when the task row exists; a missing row still downloads, it just
/// has nowhere to report.
pub async fn run_download_work(
    client: &reqwest::Client,
    pool: &DbPool,
    input: &WorkInput,
    download_dir: &Path,
) -> WorkOutcome {
    match transfer(client, pool, input, download_dir).await {
        Ok(()) => {
            debug!("Work item {} finished", input.task_id);
            WorkOutcome::Success
        }
        Err(error) => {
            persist_error(pool, &input.task_id, &error);
            match error {
                DownloadError::EmptyBody => WorkOutcome::Failure(error),
                DownloadError::Http(_) | DownloadError::Io(_) | DownloadError::Unknown(_) => {
                    WorkOutcome::Retry(error)
                }
            }
        }
    }
}

/// Drives `run_download_work` through the retry schedule, sleeping the
/// configured backoff between attempts. Returns the outcome of the final
/// attempt.
pub async fn run_with_retry(
    client: &reqwest::Client,
    pool: &DbPool,
    input: &WorkInput,
    download_dir: &Path,
    config: &RetryConfig,
) -> WorkOutcome {
    let mut attempt = 0;
    loop {
        let outcome = run_download_work(client, pool, input, download_dir).await;
        match outcome {
            WorkOutcome::Retry(ref error) if attempt + 1 < config.max_retries => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "Work item {} failed ({}), retrying in {:?} (attempt {}/{})",
                    input.task_id,
                    error,
                    delay,
                    attempt + 1,
                    config.max_retries
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            outcome => return outcome,
        }
    }
}

async fn transfer(
    client: &reqwest::Client,
    pool: &DbPool,
    input: &WorkInput,
    download_dir: &Path,
) -> Result<(), DownloadError> {
    let response = client
        .get(&input.url)
        .send()
        .await
        .map_err(|e| DownloadError::Io(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Http(status.as_u16()));
    }
    let total = response.content_length();

    std::fs::create_dir_all(download_dir).map_err(|e| DownloadError::Io(e.to_string()))?;
    let path = download_dir.join(&input.file_name);
    let mut file = std::fs::File::create(&path).map_err(|e| DownloadError::Io(e.to_string()))?;

    let mut downloaded: u64 = 0;
    let mut last_flush = Instant::now();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DownloadError::Io(e.to_string()))?;
        file.write_all(&chunk).map_err(|e| DownloadError::Io(e.to_string()))?;
        downloaded += chunk.len() as u64;
        if last_flush.elapsed() >= downloads::flush_interval() {
            persist_progress(pool, &input.task_id, DownloadStatus::Downloading, downloaded, total);
            last_flush = Instant::now();
        }
    }
    file.flush().map_err(|e| DownloadError::Io(e.to_string()))?;

    if downloaded == 0 {
        return Err(DownloadError::EmptyBody);
    }
    persist_progress(pool, &input.task_id, DownloadStatus::Completed, downloaded, Some(downloaded));
    Ok(())
}

/// Best-effort store update; the work item does not fail over bookkeeping.
fn persist_progress(
    pool: &DbPool,
    task_id: &str,
    status: DownloadStatus,
    downloaded: u64,
    total: Option<u64>,
) {
    let result = db::get_connection(pool).and_then(|conn| {
        let Some(mut task) = db::get_task(&conn, task_id)? else {
            return Ok(());
        };
        task.status = status;
        task.downloaded_bytes = downloaded;
        if total.is_some() {
            task.total_bytes = total;
        }
        task.error = None;
        task.error_kind = None;
        task.error_code = None;
        task.updated_at = now_millis();
        db::update_task_progress(&conn, &task)
    });
    if let Err(e) = result {
        warn!("Progress update for work item {} failed: {}", task_id, e);
    }
}

fn persist_error(pool: &DbPool, task_id: &str, error: &DownloadError) {
    let result = db::get_connection(pool).and_then(|conn| {
        let Some(mut task) = db::get_task(&conn, task_id)? else {
            return Ok(());
        };
        task.status = DownloadStatus::Error;
        task.error = Some(error.to_message());
        task.error_kind = Some(error.kind().to_string());
        task.error_code = error.code();
        task.updated_at = now_millis();
        db::update_task_progress(&conn, &task)
    });
    if let Err(e) = result {
        warn!("Error update for work item {} failed: {}", task_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_valid() {
        let input = WorkInput::from_parts(Some("t1"), Some("https://cdn.example/a.mp4"), Some("a.mp4"))
            .expect("all parts present");
        assert_eq!(input.task_id, "t1");
        assert_eq!(input.file_name, "a.mp4");
    }

    #[test]
    fn test_from_parts_missing() {
        assert!(WorkInput::from_parts(None, Some("u"), Some("f")).is_none());
        assert!(WorkInput::from_parts(Some("t"), None, Some("f")).is_none());
        assert!(WorkInput::from_parts(Some("t"), Some("u"), None).is_none());
    }

    #[test]
    fn test_from_parts_blank() {
        assert!(WorkInput::from_parts(Some("  "), Some("u"), Some("f")).is_none());
        assert!(WorkInput::from_parts(Some("t"), Some(""), Some("f")).is_none());
    }

    #[test]
    fn test_outcome_is_success() {
        assert!(WorkOutcome::Success.is_success());
        assert!(!WorkOutcome::Retry(DownloadError::Http(503)).is_success());
        assert!(!WorkOutcome::Failure(DownloadError::EmptyBody).is_success());
    }
}
