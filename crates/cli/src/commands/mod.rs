pub mod manual_stats;
pub mod run;
pub mod threads;

use std::path::Path;
use std::sync::{Arc, LazyLock, Mutex};

use cachelm_checkpoint::SqliteStore;
use cachelm_config::AppConfig;
use cachelm_orchestrator::{ManualCache, ReferenceDocument};

static MANUALS: LazyLock<Mutex<ManualCache>> = LazyLock::new(|| Mutex::new(ManualCache::new()));

pub(crate) fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

pub(crate) fn load_manual(config: &AppConfig) -> Result<Arc<ReferenceDocument>, Box<dyn std::error::Error>> {
    let mut cache = MANUALS.lock().map_err(|_| "manual cache lock poisoned")?;
    Ok(cache.get(&config.manual_path)?)
}

pub(crate) async fn open_store(path: &Path) -> Result<SqliteStore, Box<dyn std::error::Error>> {
    Ok(SqliteStore::open(path)
        .await
        .map_err(|e| format!("Failed to open checkpoint db {}: {e}", path.display()))?)
}
