//! `cachelm threads` — List or delete persisted threads.

use std::path::PathBuf;

use cachelm_core::checkpoint::{CheckpointStore, ThreadId};
use tracing::info;

pub async fn run(
    checkpoint_db: Option<PathBuf>,
    delete: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let path = checkpoint_db
        .or(config.checkpoint.db_path)
        .ok_or("--checkpoint-db (or CACHELM_CHECKPOINT_DB) is required")?;
    info!(path = %path.display(), "Opening checkpoint store");
    let store = super::open_store(&path).await?;

    if let Some(id) = delete {
        let thread_id = ThreadId::from(id);
        if store.delete(&thread_id).await? {
            println!("Deleted thread {thread_id}");
        } else {
            println!("No thread {thread_id}");
        }
        return Ok(());
    }

    let threads = store.list_threads().await?;
    if threads.is_empty() {
        println!("(no threads)");
    }
    for thread_id in threads {
        println!("{thread_id}");
    }

    Ok(())
}
