//! Command-line front end: parse a post link, download its media, inspect
//! the task list and the saved-media history.

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use savora::core::config;
use savora::core::init_logger;
use savora::download::{build_http_client, DownloadStatus, DownloadTask, MediaKind, PersistentDownloadManager};
use savora::media::MediaRepository;
use savora::render::HttpRenderer;
use savora::storage::db;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "savora", version, about = "Save media from public posts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a post link and list its media without downloading.
    Parse {
        /// Post link to parse.
        url: String,
        /// Print the media list as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Parse a post link and download every media item it carries.
    Download {
        /// Post link to download from.
        url: String,
    },
    /// Show the download task list, newest first.
    Tasks,
    /// Show the saved-media history.
    History {
        /// Restrict to one media kind: image, video, or audio.
        #[arg(long)]
        kind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger("savora.log").context("failed to initialize logging")?;

    let pool = Arc::new(db::create_pool(config::DATABASE_PATH.as_str()).context("failed to open database")?);

    match cli.command {
        Command::Parse { url, json } => {
            let repository = MediaRepository::new(HttpRenderer::new(), Arc::clone(&pool));
            let items = repository
                .parse_link(&url)
                .await
                .with_context(|| format!("failed to parse {}", url))?;
            if json {
                println!("{}", serde_json::to_string_pretty(items.as_ref())?);
            } else {
                for item in items.iter() {
                    println!("{:>5}  {}  ->  {}", item.kind.as_str(), item.url, item.file_name);
                }
            }
        }
        Command::Download { url } => {
            let repository = MediaRepository::new(HttpRenderer::new(), Arc::clone(&pool));
            let items = repository
                .parse_link(&url)
                .await
                .with_context(|| format!("failed to parse {}", url))?;

            let download_dir = config::download_dir();
            std::fs::create_dir_all(&download_dir)
                .with_context(|| format!("failed to create {}", download_dir.display()))?;
            let (manager, mut events) =
                PersistentDownloadManager::new(Arc::clone(&pool), build_http_client(), download_dir.clone());
            manager.recover_interrupted().await?;
            let sweep = manager.spawn_retention_sweep();

            let mut by_id = std::collections::HashMap::new();
            for item in items.iter() {
                let task = DownloadTask::new(item.url.clone(), item.file_name.clone(), item.kind, item.source_url.clone())
                    .with_post(item.post_id.clone(), item.title.clone(), item.thumbnail_url.clone());
                by_id.insert(task.id.clone(), item.clone());
                manager.enqueue(task).await?;
            }
            info!("Enqueued {} downloads into {}", by_id.len(), download_dir.display());

            let mut remaining = by_id.len();
            while remaining > 0 {
                let Some(event) = events.recv().await else {
                    break;
                };
                let Some(item) = by_id.get(&event.task_id) else {
                    continue;
                };
                match event.status {
                    DownloadStatus::Completed => {
                        repository.record_download(item)?;
                        println!("done   {}", item.file_name);
                    }
                    DownloadStatus::Error => {
                        let message = event.error.map(|e| e.to_message()).unwrap_or_default();
                        println!("failed {}  ({})", item.file_name, message);
                    }
                    status => println!("{:<6} {}", status.as_str().to_lowercase(), item.file_name),
                }
                remaining -= 1;
            }
            sweep.abort();
        }
        Command::Tasks => {
            let conn = db::get_connection(&pool)?;
            for task in db::list_tasks(&conn)? {
                println!(
                    "{}  {:<11}  {:>4.0}%  {}",
                    task.id,
                    task.status.as_str(),
                    task.progress() * 100.0,
                    task.file_name
                );
            }
        }
        Command::History { kind } => {
            let kind = kind.as_deref().map(MediaKind::parse);
            let conn = db::get_connection(&pool)?;
            let items = match kind {
                Some(kind) => db::list_media_items_by_kind(&conn, kind)?,
                None => db::list_media_items(&conn)?,
            };
            for item in items {
                println!("{:>5}  {}  ({})", item.kind.as_str(), item.file_name, item.source_url);
            }
        }
    }
    Ok(())
}
