//! `cachelm manual-stats` — Show the manual's size and prompt fingerprints.

use cachelm_orchestrator::prompt;
use tracing::info;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    info!(path = %config.manual_path.display(), "Fingerprinting manual");
    let document = super::load_manual(&config)?;
    let fingerprint = prompt::fingerprint(&document);

    println!("manual_path: {}", document.path.display());
    println!("manual_bytes: {}", document.len());
    println!("manual_sha256: {}", fingerprint.manual_sha256);
    println!("system_prefix_hash: {}", fingerprint.system_prefix_hash);

    Ok(())
}
