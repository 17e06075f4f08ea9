//! Validate a sync configuration file.

use anyhow::{Context, Result};
use notesync_client::SyncConfig;
use notesync_types::ResourceKind;
use std::path::Path;

/// Run the check-config command.
pub fn run(path: &Path) -> Result<()> {
    let config = SyncConfig::from_file(path)
        .with_context(|| format!("Invalid configuration {}", path.display()))?;

    println!("{}: OK", path.display());
    println!();
    match &config.queue.data_dir {
        Some(dir) => println!("Queue:     mirrored in {}", dir.display()),
        None => println!("Queue:     in memory only"),
    }
    println!(
        "Dispatch:  retry after {}ms, bad requests {}",
        config.dispatch.retry_delay_ms,
        if config.dispatch.strict_bad_request {
            "fail loudly"
        } else {
            "dropped"
        }
    );
    println!(
        "Reconcile: entities over {} bytes skipped",
        config.reconcile.max_entity_bytes
    );
    if config.realtime.enabled {
        println!(
            "Realtime:  on, backoff +{}ms up to {}ms",
            config.realtime.backoff_step_ms, config.realtime.backoff_ceiling_ms
        );
    } else {
        println!("Realtime:  off");
    }
    if config.polling.enabled {
        let mode = if config.polling.fast_mode { "fast" } else { "normal" };
        println!("Polling:   on ({} mode)", mode);
        for kind in ResourceKind::ALL {
            let period = config.polling.period(kind, config.polling.fast_mode);
            println!("  {:<16} every {}s", kind.to_string(), period.as_secs());
        }
    } else {
        println!("Polling:   off");
    }
    Ok(())
}
