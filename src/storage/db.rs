//! SQLite-backed persistence: download tasks, fetched posts, and the saved
//! media history.

use crate::core::error::{AppError, AppResult};
use crate::download::task::{DownloadStatus, DownloadTask, MediaKind};
use crate::media::{MediaItem, Post};
use log::info;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Opens (or creates) the database and applies the schema.
pub fn create_pool(path: impl AsRef<Path>) -> AppResult<DbPool> {
    let manager = SqliteConnectionManager::file(path.as_ref());
    let pool = Pool::builder().max_size(10).build(manager)?;
    let conn = pool.get()?;
    migrate_schema(&conn)?;
    info!("Database ready at {}", path.as_ref().display());
    Ok(pool)
}

/// In-memory database for tests and ephemeral runs.
pub fn create_memory_pool() -> AppResult<DbPool> {
    let manager = SqliteConnectionManager::memory();
    // A single connection keeps every user of the pool on the same
    // in-memory database.
    let pool = Pool::builder().max_size(1).build(manager)?;
    let conn = pool.get()?;
    migrate_schema(&conn)?;
    Ok(pool)
}

pub fn get_connection(pool: &DbPool) -> AppResult<DbConnection> {
    pool.get().map_err(AppError::from)
}

fn migrate_schema(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS download_tasks (
            id               TEXT PRIMARY KEY,
            url              TEXT NOT NULL,
            file_name        TEXT NOT NULL,
            kind             TEXT NOT NULL,
            source_url       TEXT NOT NULL,
            post_id          TEXT,
            title            TEXT,
            thumbnail_url    TEXT,
            total_bytes      INTEGER,
            downloaded_bytes INTEGER NOT NULL DEFAULT 0,
            status           TEXT NOT NULL,
            error            TEXT,
            error_kind       TEXT,
            error_code       INTEGER,
            created_at       INTEGER NOT NULL,
            updated_at       INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_download_tasks_status
            ON download_tasks (status);
        CREATE INDEX IF NOT EXISTS idx_download_tasks_updated_at
            ON download_tasks (updated_at);

        CREATE TABLE IF NOT EXISTS posts (
            id           TEXT PRIMARY KEY,
            url          TEXT NOT NULL,
            account_name TEXT,
            avatar_url   TEXT,
            text         TEXT,
            fetched_at   INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS media_items (
            id            TEXT PRIMARY KEY,
            url           TEXT NOT NULL,
            kind          TEXT NOT NULL,
            source_url    TEXT NOT NULL,
            post_id       TEXT,
            title         TEXT,
            thumbnail_url TEXT,
            file_name     TEXT NOT NULL,
            saved_at      INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_media_items_kind
            ON media_items (kind);",
    )?;
    Ok(())
}

// ==================== download_tasks ====================

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<DownloadTask> {
    Ok(DownloadTask {
        id: row.get("id")?,
        url: row.get("url")?,
        file_name: row.get("file_name")?,
        kind: MediaKind::parse(&row.get::<_, String>("kind")?),
        source_url: row.get("source_url")?,
        post_id: row.get("post_id")?,
        title: row.get("title")?,
        thumbnail_url: row.get("thumbnail_url")?,
        total_bytes: row.get::<_, Option<i64>>("total_bytes")?.map(|v| v as u64),
        downloaded_bytes: row.get::<_, i64>("downloaded_bytes")? as u64,
        status: DownloadStatus::parse(&row.get::<_, String>("status")?),
        error: row.get("error")?,
        error_kind: row.get("error_kind")?,
        error_code: row.get::<_, Option<i64>>("error_code")?.map(|v| v as u16),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Inserts the task, or replaces an existing row with the same id.
pub fn upsert_task(conn: &Connection, task: &DownloadTask) -> AppResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO download_tasks
            (id, url, file_name, kind, source_url, post_id, title, thumbnail_url,
             total_bytes, downloaded_bytes, status, error, error_kind, error_code,
             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            task.id,
            task.url,
            task.file_name,
            task.kind.as_str(),
            task.source_url,
            task.post_id,
            task.title,
            task.thumbnail_url,
            task.total_bytes.map(|v| v as i64),
            task.downloaded_bytes as i64,
            task.status.as_str(),
            task.error,
            task.error_kind,
            task.error_code.map(|v| v as i64),
            task.created_at,
            task.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_task(conn: &Connection, id: &str) -> AppResult<Option<DownloadTask>> {
    let task = conn
        .query_row("SELECT * FROM download_tasks WHERE id = ?1", params![id], task_from_row)
        .optional()?;
    Ok(task)
}

/// All tasks, newest first.
pub fn list_tasks(conn: &Connection) -> AppResult<Vec<DownloadTask>> {
    let mut stmt = conn.prepare("SELECT * FROM download_tasks ORDER BY created_at DESC")?;
    let tasks = stmt
        .query_map([], task_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

/// Updates the mutable progress fields of an existing row.
pub fn update_task_progress(conn: &Connection, task: &DownloadTask) -> AppResult<()> {
    conn.execute(
        "UPDATE download_tasks
         SET status = ?2, downloaded_bytes = ?3, total_bytes = ?4, updated_at = ?5,
             error = ?6, error_kind = ?7, error_code = ?8
         WHERE id = ?1",
        params![
            task.id,
            task.status.as_str(),
            task.downloaded_bytes as i64,
            task.total_bytes.map(|v| v as i64),
            task.updated_at,
            task.error,
            task.error_kind,
            task.error_code.map(|v| v as i64),
        ],
    )?;
    Ok(())
}

/// Removes the row; returns whether it existed.
pub fn delete_task(conn: &Connection, id: &str) -> AppResult<bool> {
    let removed = conn.execute("DELETE FROM download_tasks WHERE id = ?1", params![id])?;
    Ok(removed > 0)
}

/// Purges terminal rows last touched before `cutoff_millis`. Returns the
/// number of rows removed.
pub fn cleanup_finished_tasks(conn: &Connection, cutoff_millis: i64) -> AppResult<usize> {
    let removed = conn.execute(
        "DELETE FROM download_tasks
         WHERE status IN ('Completed', 'Canceled', 'Error') AND updated_at < ?1",
        params![cutoff_millis],
    )?;
    Ok(removed)
}

// ==================== posts ====================

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get("id")?,
        url: row.get("url")?,
        account_name: row.get("account_name")?,
        avatar_url: row.get("avatar_url")?,
        text: row.get("text")?,
        fetched_at: row.get("fetched_at")?,
    })
}

pub fn upsert_post(conn: &Connection, post: &Post) -> AppResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO posts (id, url, account_name, avatar_url, text, fetched_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![post.id, post.url, post.account_name, post.avatar_url, post.text, post.fetched_at],
    )?;
    Ok(())
}

pub fn get_post(conn: &Connection, id: &str) -> AppResult<Option<Post>> {
    let post = conn
        .query_row("SELECT * FROM posts WHERE id = ?1", params![id], post_from_row)
        .optional()?;
    Ok(post)
}

// ==================== media_items ====================

fn media_item_from_row(row: &Row<'_>) -> rusqlite::Result<MediaItem> {
    Ok(MediaItem {
        id: row.get("id")?,
        url: row.get("url")?,
        kind: MediaKind::parse(&row.get::<_, String>("kind")?),
        source_url: row.get("source_url")?,
        post_id: row.get("post_id")?,
        title: row.get("title")?,
        thumbnail_url: row.get("thumbnail_url")?,
        file_name: row.get("file_name")?,
        saved_at: row.get("saved_at")?,
    })
}

pub fn insert_media_item(conn: &Connection, item: &MediaItem) -> AppResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO media_items
            (id, url, kind, source_url, post_id, title, thumbnail_url, file_name, saved_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            item.id,
            item.url,
            item.kind.as_str(),
            item.source_url,
            item.post_id,
            item.title,
            item.thumbnail_url,
            item.file_name,
            item.saved_at,
        ],
    )?;
    Ok(())
}

/// Saved media history, newest first.
pub fn list_media_items(conn: &Connection) -> AppResult<Vec<MediaItem>> {
    let mut stmt = conn.prepare("SELECT * FROM media_items ORDER BY saved_at DESC")?;
    let items = stmt
        .query_map([], media_item_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

pub fn list_media_items_by_kind(conn: &Connection, kind: MediaKind) -> AppResult<Vec<MediaItem>> {
    let mut stmt =
        conn.prepare("SELECT * FROM media_items WHERE kind = ?1 ORDER BY saved_at DESC")?;
    let items = stmt
        .query_map(params![kind.as_str()], media_item_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

pub fn delete_media_item(conn: &Connection, id: &str) -> AppResult<bool> {
    let removed = conn.execute("DELETE FROM media_items WHERE id = ?1", params![id])?;
    Ok(removed > 0)
}

pub fn delete_all_media_items(conn: &Connection) -> AppResult<usize> {
    let removed = conn.execute("DELETE FROM media_items", [])?;
    Ok(removed)
}
