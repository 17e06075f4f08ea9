//! Show the operations queued in a mirror.

use anyhow::{Context, Result};
use notesync_client::{LoadedMirror, QueueMirror};
use notesync_core::{PriorityClass, CURRENT_SCHEMA_VERSION};
use notesync_types::Operation;
use std::fmt::Write;

/// Run the inspect command.
pub async fn run(mirror: &QueueMirror, json: bool) -> Result<()> {
    if !mirror.path().exists() {
        if json {
            println!("[]");
        } else {
            println!("No queue mirror at {}", mirror.path().display());
        }
        return Ok(());
    }

    tracing::debug!(path = %mirror.path().display(), "Loading queue mirror");
    let loaded = mirror
        .load()
        .await
        .with_context(|| format!("Failed to read {}", mirror.path().display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&loaded.operations)?);
    } else {
        print!("{}", render(mirror, &loaded));
    }
    Ok(())
}

/// Human-readable summary of a loaded mirror.
fn render(mirror: &QueueMirror, loaded: &LoadedMirror) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== notesync queue ===");
    let _ = writeln!(out);
    let _ = writeln!(out, "Mirror:  {}", mirror.path().display());
    if loaded.stored_version == CURRENT_SCHEMA_VERSION {
        let _ = writeln!(out, "Schema:  v{}", loaded.stored_version);
    } else {
        let _ = writeln!(
            out,
            "Schema:  v{} (current v{}; run 'notesync migrate' to upgrade)",
            loaded.stored_version, CURRENT_SCHEMA_VERSION
        );
    }
    let _ = writeln!(out, "Pending: {} operations", loaded.operations.len());

    if loaded.operations.is_empty() {
        return out;
    }
    let _ = writeln!(out);
    for (i, op) in loaded.operations.iter().enumerate() {
        let _ = writeln!(out, "  [{}] {}", i, describe(op));
    }
    out
}

fn describe(op: &Operation) -> String {
    let class = match PriorityClass::of(op) {
        PriorityClass::Sync => "sync",
        PriorityClass::Mutation => "mutation",
        PriorityClass::Media => "media",
    };
    let mut line = format!("{:<28} {:<8}", op.name(), class);
    match op {
        Operation::Sync { kind, delta_token } => {
            let _ = write!(line, " {}", kind);
            match delta_token {
                Some(token) => {
                    let _ = write!(line, " from {}", token.as_str());
                }
                None => line.push_str(" (full)"),
            }
        }
        _ => {
            if let Some(note) = op.note_local_id() {
                let _ = write!(line, " note {}", note.as_str());
            }
            if let Some(media) = op.media_local_id() {
                let _ = write!(line, " media {}", media.as_str());
            }
        }
    }
    if !op.is_valid() {
        line.push_str(" (waiting for remote id)");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_types::{DeltaToken, LocalId, ResourceKind};
    use tempfile::tempdir;

    #[tokio::test]
    async fn inspect_missing_mirror() {
        let dir = tempdir().unwrap();
        let mirror = QueueMirror::new(dir.path().join("queue.json"));

        assert!(run(&mirror, false).await.is_ok());
        assert!(run(&mirror, true).await.is_ok());
    }

    #[tokio::test]
    async fn inspect_corrupt_mirror_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let result = run(&QueueMirror::new(&path), false).await;
        assert!(result.is_err());
    }

    #[test]
    fn render_lists_operations_in_order() {
        let mirror = QueueMirror::new("/data/queue.json");
        let local_id = LocalId::from_string("note-1");
        let loaded = LoadedMirror {
            stored_version: CURRENT_SCHEMA_VERSION,
            operations: vec![
                Operation::sync(ResourceKind::Notes, Some(DeltaToken::new("T1"))),
                Operation::delete_note(local_id, None),
            ],
        };

        let out = render(&mirror, &loaded);

        assert!(out.contains("Pending: 2 operations"));
        assert!(out.contains("[0] sync"));
        assert!(out.contains("from T1"));
        assert!(out.contains("note note-1 (waiting for remote id)"));
    }

    #[test]
    fn render_flags_old_schema() {
        let mirror = QueueMirror::new("/data/queue.json");
        let loaded = LoadedMirror {
            stored_version: 1,
            operations: vec![],
        };

        assert!(render(&mirror, &loaded).contains("notesync migrate"));
    }
}
