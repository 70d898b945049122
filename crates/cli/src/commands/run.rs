//! `cachelm run` — Answer one user utterance.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cachelm_core::checkpoint::ThreadId;
use cachelm_core::message::Message;
use cachelm_orchestrator::{Orchestrator, render_metrics};
use serde_json::Value;
use tracing::{info, warn};

pub struct RunArgs {
    pub input: Option<String>,
    pub messages: Option<PathBuf>,
    pub thread_id: Option<String>,
    pub checkpoint_db: Option<PathBuf>,
    pub json: bool,
    pub show_metrics: bool,
}

pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;

    // Flags win over config/env
    let thread_id = args.thread_id.or_else(|| config.checkpoint.thread_id.clone());
    let checkpoint_db = args.checkpoint_db.or_else(|| config.checkpoint.db_path.clone());
    check_persistence(thread_id.as_deref(), checkpoint_db.as_deref())?;

    let incoming = match (&args.messages, args.input) {
        (Some(path), _) => read_messages(path)?,
        (None, Some(input)) => vec![Message::user(input)],
        (None, None) => return Err("one of --input or --messages is required".into()),
    };

    let document = super::load_manual(&config)?;
    let provider = cachelm_providers::build_from_config(&config)?;
    let mut orchestrator = Orchestrator::from_config(&config, document, provider)?;
    if let Some(path) = &checkpoint_db {
        orchestrator = orchestrator.with_store(Arc::new(super::open_store(path).await?));
    }

    info!(
        mode = ?config.mode,
        execution = ?config.expert_execution,
        thread_id = thread_id.as_deref().unwrap_or("-"),
        "Running turn"
    );
    let thread_id = thread_id.map(ThreadId::from);
    let state = orchestrator.run_messages(incoming, thread_id.as_ref()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        println!("{}", state.response);
    }

    if args.show_metrics {
        if let Some(metrics) = render_metrics(&state) {
            println!("\n{metrics}");
        }
    }

    Ok(())
}

/// Persistence needs both a thread id and a database, or neither.
fn check_persistence(thread_id: Option<&str>, checkpoint_db: Option<&Path>) -> Result<(), String> {
    let refusal = match (thread_id, checkpoint_db) {
        (Some(_), None) => "--thread-id requires --checkpoint-db (or CACHELM_CHECKPOINT_DB)",
        (None, Some(_)) => "--checkpoint-db requires --thread-id (or CACHELM_THREAD_ID)",
        _ => return Ok(()),
    };
    warn!(?thread_id, ?checkpoint_db, "Refusing half-configured persistence");
    Err(refusal.to_string())
}

/// Read a JSON array of loosely-shaped messages.
fn read_messages(path: &Path) -> Result<Vec<Message>, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)?;
    let items = value
        .as_array()
        .ok_or_else(|| format!("{} must contain a JSON array of messages", path.display()))?;

    Ok(items
        .iter()
        .map(Message::from_json)
        .collect::<Result<Vec<_>, _>>()?)
}
