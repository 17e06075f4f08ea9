//! Rewrite a mirror at the current schema version.

use anyhow::{Context, Result};
use notesync_client::QueueMirror;
use notesync_core::CURRENT_SCHEMA_VERSION;

/// Run the migrate command.
pub async fn run(mirror: &QueueMirror, dry_run: bool) -> Result<()> {
    let path = mirror.path().display();
    anyhow::ensure!(mirror.path().exists(), "No queue mirror at {}", path);

    let loaded = mirror
        .load()
        .await
        .with_context(|| format!("Failed to read {}", path))?;

    if loaded.stored_version == CURRENT_SCHEMA_VERSION {
        println!("{} is already at schema v{}", path, CURRENT_SCHEMA_VERSION);
        return Ok(());
    }

    if dry_run {
        println!(
            "Would migrate {} from v{} to v{} ({} operations)",
            path,
            loaded.stored_version,
            CURRENT_SCHEMA_VERSION,
            loaded.operations.len()
        );
        return Ok(());
    }

    mirror
        .save(&loaded.operations)
        .await
        .with_context(|| format!("Failed to write {}", path))?;
    tracing::info!(
        path = %path,
        from = loaded.stored_version,
        to = CURRENT_SCHEMA_VERSION,
        "Queue mirror migrated"
    );
    println!(
        "Migrated {} from v{} to v{} ({} operations)",
        path,
        loaded.stored_version,
        CURRENT_SCHEMA_VERSION,
        loaded.operations.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_types::{Operation, ResourceKind};
    use tempfile::tempdir;

    const V1_MIRROR: &str = r#"{
        "schema_version": 1,
        "operations": [
            { "type": "full_sync", "data": { "kind": "note_references" } },
            { "type": "fetch_meeting_notes" }
        ]
    }"#;

    #[tokio::test]
    async fn migrate_rewrites_old_mirror() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");
        tokio::fs::write(&path, V1_MIRROR).await.unwrap();
        let mirror = QueueMirror::new(&path);

        run(&mirror, false).await.unwrap();

        let loaded = mirror.load().await.unwrap();
        assert_eq!(loaded.stored_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(
            loaded.operations,
            vec![
                Operation::sync(ResourceKind::NoteReferences, None),
                Operation::FetchMeetingNotes,
            ]
        );
    }

    #[tokio::test]
    async fn dry_run_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");
        tokio::fs::write(&path, V1_MIRROR).await.unwrap();

        run(&QueueMirror::new(&path), true).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, V1_MIRROR);
    }

    #[tokio::test]
    async fn missing_mirror_is_an_error() {
        let dir = tempdir().unwrap();
        let result = run(&QueueMirror::new(dir.path().join("none.json")), false).await;
        assert!(result.is_err());
    }
}
