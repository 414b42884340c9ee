//! Persistent download scheduler.
//!
//! Accepts enqueue/pause/resume/cancel/delete operations, bounds concurrent
//! transfers with a semaphore permit pool, supports HTTP range-resume for
//! paused partials, throttles progress persistence, and purges old terminal
//! rows on a periodic sweep. Durable state lives in the task store; a small
//! in-memory overlay carries the not-yet-flushed view of in-flight tasks.

use crate::core::config::{downloads, retention};
use crate::core::error::{AppResult, DownloadError};
use crate::core::utils::now_millis;
use crate::download::task::{DownloadStatus, DownloadTask};
use crate::storage::db::{self, DbPool};
use futures_util::{FutureExt, StreamExt};
use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Terminal notification for one task, delivered over the manager's event
/// channel instead of a stored callback.
#[derive(Debug, Clone)]
pub struct DownloadEvent {
    pub task_id: String,
    pub status: DownloadStatus,
    pub error: Option<DownloadError>,
}

/// Entry in the FIFO wait queue. `resume` survives the `Paused → Pending`
/// transition so the transfer knows whether a range request is allowed.
#[derive(Debug, Clone)]
struct PendingEntry {
    task_id: String,
    resume: bool,
}

struct Inner {
    pool: Arc<DbPool>,
    client: reqwest::Client,
    download_dir: PathBuf,
    permits: Arc<Semaphore>,
    pending: Mutex<VecDeque<PendingEntry>>,
    /// In-flight tasks, ahead of the throttled durable writes.
    overlay: Mutex<HashMap<String, DownloadTask>>,
    tokens: Mutex<HashMap<String, Arc<CancellationToken>>>,
    events: mpsc::UnboundedSender<DownloadEvent>,
}

/// Download scheduler with durable task state.
///
/// Cheap to clone; all clones share the same permit pool, wait queue, and
/// overlay.
#[derive(Clone)]
pub struct PersistentDownloadManager {
    inner: Arc<Inner>,
}

impl PersistentDownloadManager {
    /// Creates a manager with the default permit count.
    pub fn new(
        pool: Arc<DbPool>,
        client: reqwest::Client,
        download_dir: PathBuf,
    ) -> (Self, mpsc::UnboundedReceiver<DownloadEvent>) {
        Self::with_permits(pool, client, download_dir, downloads::MAX_CONCURRENT)
    }

    /// Creates a manager with an explicit permit count.
    pub fn with_permits(
        pool: Arc<DbPool>,
        client: reqwest::Client,
        download_dir: PathBuf,
        permits: usize,
    ) -> (Self, mpsc::UnboundedReceiver<DownloadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = Self {
            inner: Arc::new(Inner {
                pool,
                client,
                download_dir,
                permits: Arc::new(Semaphore::new(permits)),
                pending: Mutex::new(VecDeque::new()),
                overlay: Mutex::new(HashMap::new()),
                tokens: Mutex::new(HashMap::new()),
                events: tx,
            }),
        };
        (manager, rx)
    }

    /// Persists the task as `Pending`, then starts it immediately if a permit
    /// is free, otherwise appends it to the wait queue.
    pub async fn enqueue(&self, task: DownloadTask) -> AppResult<()> {
        info!("Enqueuing download task {} for {}", task.id, task.url);
        let mut task = task;
        task.status = DownloadStatus::Pending;
        task.updated_at = now_millis();
        {
            let conn = db::get_connection(&self.inner.pool)?;
            db::upsert_task(&conn, &task)?;
        }
        self.inner.pending.lock().await.push_back(PendingEntry {
            task_id: task.id,
            resume: false,
        });
        Inner::promote(&self.inner).await;
        Ok(())
    }

    /// Marks the task `Paused`. An in-flight transfer notices the
    /// cancellation at the next chunk, stops writing, and leaves the partial
    /// file in place.
    pub async fn pause(&self, task_id: &str) -> AppResult<()> {
        self.inner.pending.lock().await.retain(|e| e.task_id != task_id);
        let downloaded = self.inner.overlay.lock().await.get(task_id).map(|t| t.downloaded_bytes);
        self.persist_status(task_id, DownloadStatus::Paused, downloaded).await?;
        if let Some(token) = self.inner.tokens.lock().await.get(task_id) {
            token.cancel();
        }
        info!("Paused download task {}", task_id);
        Ok(())
    }

    /// Sets the task back to `Pending` and re-attempts scheduling. No-op if
    /// already `Completed`. A `Paused` task with an existing partial file
    /// resumes with a byte-range request; anything else restarts from zero.
    pub async fn resume(&self, task_id: &str) -> AppResult<()> {
        let prior = {
            let conn = db::get_connection(&self.inner.pool)?;
            db::get_task(&conn, task_id)?
        };
        let Some(prior) = prior else {
            warn!("Resume requested for unknown task {}", task_id);
            return Ok(());
        };
        if prior.status == DownloadStatus::Completed {
            return Ok(());
        }
        // Already scheduled or mid-transfer: a second entry for the same id
        // would put two writers on one file.
        if matches!(prior.status, DownloadStatus::Pending | DownloadStatus::Downloading) {
            debug!("Resume ignored for already-active task {}", task_id);
            return Ok(());
        }
        if self
            .inner
            .tokens
            .lock()
            .await
            .get(task_id)
            .is_some_and(|t| !t.is_cancelled())
        {
            debug!("Resume ignored for in-flight task {}", task_id);
            return Ok(());
        }
        let resume = prior.status == DownloadStatus::Paused;
        self.persist_status(task_id, DownloadStatus::Pending, None).await?;
        {
            let mut pending = self.inner.pending.lock().await;
            if pending.iter().any(|e| e.task_id == task_id) {
                return Ok(());
            }
            pending.push_back(PendingEntry {
                task_id: task_id.to_string(),
                resume,
            });
        }
        Inner::promote(&self.inner).await;
        info!("Resumed download task {} (range resume: {})", task_id, resume);
        Ok(())
    }

    /// Marks the task `Canceled`. The partial file stays on disk; only an
    /// explicit `delete` removes state.
    pub async fn cancel(&self, task_id: &str) -> AppResult<()> {
        self.inner.pending.lock().await.retain(|e| e.task_id != task_id);
        let downloaded = self.inner.overlay.lock().await.get(task_id).map(|t| t.downloaded_bytes);
        self.persist_status(task_id, DownloadStatus::Canceled, downloaded).await?;
        if let Some(token) = self.inner.tokens.lock().await.get(task_id) {
            token.cancel();
        }
        info!("Canceled download task {}", task_id);
        Ok(())
    }

    /// Removes the durable task record. An in-flight transfer is cancelled
    /// first. File cleanup stays with the caller.
    pub async fn delete(&self, task_id: &str) -> AppResult<bool> {
        self.inner.pending.lock().await.retain(|e| e.task_id != task_id);
        if let Some(token) = self.inner.tokens.lock().await.remove(task_id) {
            token.cancel();
        }
        self.inner.overlay.lock().await.remove(task_id);
        let conn = db::get_connection(&self.inner.pool)?;
        let removed = db::delete_task(&conn, task_id)?;
        info!("Deleted download task {} (existed: {})", task_id, removed);
        Ok(removed)
    }

    /// All known tasks, newest first. In-flight tasks reflect the overlay's
    /// unflushed progress rather than the last durable write.
    pub async fn tasks(&self) -> AppResult<Vec<DownloadTask>> {
        let mut tasks = {
            let conn = db::get_connection(&self.inner.pool)?;
            db::list_tasks(&conn)?
        };
        let overlay = self.inner.overlay.lock().await;
        for task in tasks.iter_mut() {
            if let Some(live) = overlay.get(&task.id) {
                *task = live.clone();
            }
        }
        Ok(tasks)
    }

    /// One task by id, overlay first.
    pub async fn task(&self, task_id: &str) -> AppResult<Option<DownloadTask>> {
        if let Some(live) = self.inner.overlay.lock().await.get(task_id) {
            return Ok(Some(live.clone()));
        }
        let conn = db::get_connection(&self.inner.pool)?;
        db::get_task(&conn, task_id)
    }

    /// Re-schedules work interrupted by a previous shutdown: `Downloading`
    /// rows fall back to `Paused` (their partial files can range-resume),
    /// `Pending` rows rejoin the wait queue.
    pub async fn recover_interrupted(&self) -> AppResult<usize> {
        let rows = {
            let conn = db::get_connection(&self.inner.pool)?;
            db::list_tasks(&conn)?
        };
        let mut recovered = 0;
        for row in rows {
            match row.status {
                DownloadStatus::Downloading => {
                    self.persist_status(&row.id, DownloadStatus::Paused, None).await?;
                    recovered += 1;
                }
                DownloadStatus::Pending => {
                    self.inner.pending.lock().await.push_back(PendingEntry {
                        task_id: row.id,
                        resume: false,
                    });
                    recovered += 1;
                }
                _ => {}
            }
        }
        if recovered > 0 {
            info!("Recovered {} interrupted download tasks", recovered);
            Inner::promote(&self.inner).await;
        }
        Ok(recovered)
    }

    /// Spawns the periodic sweep that purges terminal rows older than the
    /// retention window.
    pub fn spawn_retention_sweep(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(retention::cleanup_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let cutoff = now_millis() - retention::retention_window().as_millis() as i64;
                let purged = db::get_connection(&inner.pool)
                    .and_then(|conn| db::cleanup_finished_tasks(&conn, cutoff));
                match purged {
                    Ok(0) => {}
                    Ok(n) => info!("Retention sweep purged {} finished download tasks", n),
                    Err(e) => warn!("Retention sweep failed: {}", e),
                }
            }
        })
    }

    async fn persist_status(
        &self,
        task_id: &str,
        status: DownloadStatus,
        downloaded: Option<u64>,
    ) -> AppResult<()> {
        let conn = db::get_connection(&self.inner.pool)?;
        let Some(mut task) = db::get_task(&conn, task_id)? else {
            return Ok(());
        };
        // Completed is terminal; a pause/cancel racing a finished transfer
        // must not regress it.
        if task.status == DownloadStatus::Completed {
            return Ok(());
        }
        task.status = status;
        if let Some(downloaded) = downloaded {
            task.downloaded_bytes = downloaded;
        }
        task.updated_at = now_millis();
        db::update_task_progress(&conn, &task)?;
        let mut overlay = self.inner.overlay.lock().await;
        if let Some(live) = overlay.get_mut(task_id) {
            live.status = status;
            live.updated_at = task.updated_at;
        }
        Ok(())
    }
}

impl Inner {
    /// Starts waiting tasks while permits are free. Called after every
    /// enqueue/resume and after every transfer finishes.
    // Returns a boxed future to break the `promote` -> `run_transfer` ->
    // `promote` async recursion cycle so the spawned future can be proven
    // `Send`.
    fn promote(inner: &Arc<Inner>) -> futures_util::future::BoxFuture<'_, ()> {
        async move {
            loop {
                let Ok(permit) = Arc::clone(&inner.permits).try_acquire_owned() else {
                    return;
                };
                let Some(entry) = inner.pending.lock().await.pop_front() else {
                    drop(permit);
                    return;
                };
                let inner = Arc::clone(inner);
                tokio::spawn(async move {
                    Inner::run_transfer(inner, permit, entry).await;
                });
            }
        }
        .boxed()
    }

    async fn run_transfer(inner: Arc<Inner>, permit: OwnedSemaphorePermit, entry: PendingEntry) {
        let task_id = entry.task_id.clone();
        let token = Arc::new(CancellationToken::new());
        inner.tokens.lock().await.insert(task_id.clone(), Arc::clone(&token));

        let outcome = Inner::transfer(&inner, &entry, &token).await;

        {
            // A fast pause-then-resume can start a successor transfer before
            // this one unwinds; only drop the entry this transfer installed.
            let mut tokens = inner.tokens.lock().await;
            if tokens.get(&task_id).is_some_and(|t| Arc::ptr_eq(t, &token)) {
                tokens.remove(&task_id);
                inner.overlay.lock().await.remove(&task_id);
            }
        }
        drop(permit);

        match outcome {
            TransferOutcome::Completed => {
                let _ = inner.events.send(DownloadEvent {
                    task_id,
                    status: DownloadStatus::Completed,
                    error: None,
                });
            }
            TransferOutcome::Failed(error) => {
                let _ = inner.events.send(DownloadEvent {
                    task_id,
                    status: DownloadStatus::Error,
                    error: Some(error),
                });
            }
            TransferOutcome::Interrupted(status) => {
                let _ = inner.events.send(DownloadEvent { task_id, status, error: None });
            }
            TransferOutcome::Skipped => {}
        }

        Inner::promote(&inner).await;
    }

    /// Runs one transfer to a terminal disposition. An interrupted transfer
    /// never writes a terminal status itself; pause/cancel already persisted
    /// the state the user asked for.
    async fn transfer(inner: &Arc<Inner>, entry: &PendingEntry, token: &CancellationToken) -> TransferOutcome {
        let task = match Inner::load_task(inner, &entry.task_id) {
            Ok(Some(task)) => task,
            Ok(None) => {
                warn!("Download task {} vanished before start", entry.task_id);
                return TransferOutcome::Skipped;
            }
            Err(e) => {
                warn!("Failed to load download task {}: {}", entry.task_id, e);
                return TransferOutcome::Skipped;
            }
        };
        // Pause/cancel may have landed while we waited for a permit.
        if task.status != DownloadStatus::Pending {
            debug!("Skipping task {} in status {:?}", task.id, task.status);
            return TransferOutcome::Skipped;
        }

        let mut task = task;
        task.status = DownloadStatus::Downloading;
        task.error = None;
        task.error_kind = None;
        task.error_code = None;
        if let Err(e) = Inner::flush_progress(inner, &task).await {
            warn!("Failed to mark task {} as downloading: {}", task.id, e);
            return TransferOutcome::Skipped;
        }

        match Inner::stream_to_file(inner, &mut task, entry.resume, token).await {
            Ok(true) => {
                task.status = DownloadStatus::Completed;
                task.total_bytes = Some(task.downloaded_bytes);
                task.updated_at = now_millis();
                if let Err(e) = Inner::flush_progress(inner, &task).await {
                    warn!("Failed to persist completion of task {}: {}", task.id, e);
                }
                info!("Download task {} completed ({} bytes)", task.id, task.downloaded_bytes);
                TransferOutcome::Completed
            }
            Ok(false) => {
                debug!("Download task {} interrupted cooperatively", task.id);
                let status = Inner::load_task(inner, &task.id)
                    .ok()
                    .flatten()
                    .map(|t| t.status)
                    .unwrap_or(DownloadStatus::Paused);
                TransferOutcome::Interrupted(status)
            }
            Err(error) => {
                warn!("Download task {} failed: {}", task.id, error);
                task.status = DownloadStatus::Error;
                task.error = Some(error.to_message());
                task.error_kind = Some(error.kind().to_string());
                task.error_code = error.code();
                task.updated_at = now_millis();
                if let Err(e) = Inner::flush_progress(inner, &task).await {
                    warn!("Failed to persist error for task {}: {}", task.id, e);
                }
                TransferOutcome::Failed(error)
            }
        }
    }

    /// Streams the response body into the target file. Returns `Ok(true)` on
    /// completion and `Ok(false)` when the token fired mid-stream.
    async fn stream_to_file(
        inner: &Arc<Inner>,
        task: &mut DownloadTask,
        resume: bool,
        token: &CancellationToken,
    ) -> Result<bool, DownloadError> {
        let path = inner.download_dir.join(&task.file_name);
        let existing_bytes = if resume {
            std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0)
        } else {
            0
        };

        let mut request = inner.client.get(&task.url);
        if existing_bytes > 0 {
            request = request.header(reqwest::header::RANGE, format!("bytes={}-", existing_bytes));
        }
        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::Io(e.to_string()))?;

        let status = response.status();
        if !(status.is_success() || status == reqwest::StatusCode::PARTIAL_CONTENT) {
            return Err(DownloadError::Http(status.as_u16()));
        }

        // A plain 200 on a range request means the server ignored the range;
        // restart from zero rather than append a full body to a partial file.
        let range_honored = existing_bytes > 0 && status == reqwest::StatusCode::PARTIAL_CONTENT;
        let offset = if range_honored { existing_bytes } else { 0 };

        let total = if range_honored {
            parse_content_range_total(&response)
                .or_else(|| response.content_length().map(|len| existing_bytes + len))
                .or(task.total_bytes)
        } else {
            response.content_length()
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DownloadError::Io(e.to_string()))?;
        }
        let mut file = if range_honored {
            std::fs::OpenOptions::new()
                .append(true)
                .open(&path)
                .map_err(|e| DownloadError::Io(e.to_string()))?
        } else {
            std::fs::File::create(&path).map_err(|e| DownloadError::Io(e.to_string()))?
        };

        task.total_bytes = total;
        task.downloaded_bytes = offset;
        task.updated_at = now_millis();
        Inner::flush_progress(inner, task)
            .await
            .map_err(|e| DownloadError::Unknown(e.to_string()))?;

        let mut stream = response.bytes_stream();
        let mut last_flush = Instant::now();
        while let Some(chunk) = stream.next().await {
            if token.is_cancelled() {
                return Ok(false);
            }
            let chunk = chunk.map_err(|e| DownloadError::Io(e.to_string()))?;
            file.write_all(&chunk).map_err(|e| DownloadError::Io(e.to_string()))?;
            task.downloaded_bytes += chunk.len() as u64;
            task.updated_at = now_millis();
            // Live counters go to the overlay on every chunk; only the
            // durable write is throttled.
            Inner::update_overlay(inner, task).await;
            if last_flush.elapsed() >= downloads::flush_interval() {
                if let Err(e) = Inner::flush_progress(inner, task).await {
                    warn!("Progress flush for task {} failed: {}", task.id, e);
                }
                last_flush = Instant::now();
            }
        }
        file.flush().map_err(|e| DownloadError::Io(e.to_string()))?;

        if task.downloaded_bytes == 0 {
            return Err(DownloadError::EmptyBody);
        }
        Ok(true)
    }

    fn load_task(inner: &Arc<Inner>, task_id: &str) -> AppResult<Option<DownloadTask>> {
        let conn = db::get_connection(&inner.pool)?;
        db::get_task(&conn, task_id)
    }

    /// Writes the task to both the store and the overlay.
    async fn flush_progress(inner: &Arc<Inner>, task: &DownloadTask) -> AppResult<()> {
        {
            let conn = db::get_connection(&inner.pool)?;
            db::update_task_progress(&conn, task)?;
        }
        Inner::update_overlay(inner, task).await;
        Ok(())
    }

    /// Writes the in-flight view of the task to the overlay only.
    async fn update_overlay(inner: &Arc<Inner>, task: &DownloadTask) {
        inner.overlay.lock().await.insert(task.id.clone(), task.clone());
    }
}

enum TransferOutcome {
    Completed,
    Failed(DownloadError),
    /// Token fired mid-stream; carries the status pause/cancel persisted.
    Interrupted(DownloadStatus),
    Skipped,
}

/// Total size from a `Content-Range: bytes start-end/total` header, when the
/// server reports one.
fn parse_content_range_total(response: &reqwest::Response) -> Option<u64> {
    let value = response.headers().get(reqwest::header::CONTENT_RANGE)?.to_str().ok()?;
    let total = value.rsplit('/').next()?;
    total.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_entry_keeps_resume_flag() {
        let entry = PendingEntry {
            task_id: "t1".to_string(),
            resume: true,
        };
        let cloned = entry.clone();
        assert!(cloned.resume);
        assert_eq!(cloned.task_id, "t1");
    }
}
