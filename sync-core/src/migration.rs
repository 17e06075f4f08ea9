//! Schema migration for persisted operations.
//!
//! Queue mirrors carry a file-level schema version. Older mirrors are
//! upgraded one step at a time on the generic JSON form, before any typed
//! deserialization, so the typed [`Operation`](notesync_types::Operation)
//! only ever has to understand the current layout.
//!
//! Version history:
//! - v1: full syncs were a separate `full_sync` operation and `sync` had no
//!   resource kind (notes were implied)
//! - v2: a single `sync` operation with an explicit `kind` and optional token
//! - v3: note snapshots carry `local_revision` instead of `revision`

use serde_json::{Map, Value};
use thiserror::Error;

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Oldest schema version that can still be upgraded.
pub const OLDEST_SUPPORTED_VERSION: u32 = 1;

/// Errors from the migration chain.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MigrationError {
    /// The data was written by an unknown (probably newer) build.
    #[error("unsupported schema version {0}")]
    UnsupportedVersion(u32),

    /// Downgrades are not supported.
    #[error("cannot migrate backwards from v{from} to v{to}")]
    Backwards {
        /// Source version.
        from: u32,
        /// Target version.
        to: u32,
    },

    /// An operation did not have the `{type, data}` shape.
    #[error("malformed operation at index {index}: {reason}")]
    Malformed {
        /// Position in the operation list.
        index: usize,
        /// What was wrong.
        reason: String,
    },
}

/// Upgrade a list of serialized operations from schema `from` to `to`.
pub fn migrate(operations: Vec<Value>, from: u32, to: u32) -> Result<Vec<Value>, MigrationError> {
    for version in [from, to] {
        if !(OLDEST_SUPPORTED_VERSION..=CURRENT_SCHEMA_VERSION).contains(&version) {
            return Err(MigrationError::UnsupportedVersion(version));
        }
    }
    if from > to {
        return Err(MigrationError::Backwards { from, to });
    }

    let mut operations = operations;
    for version in from..to {
        operations = operations
            .into_iter()
            .enumerate()
            .map(|(index, op)| upgrade_step(version, index, op))
            .collect::<Result<_, _>>()?;
    }
    Ok(operations)
}

fn upgrade_step(version: u32, index: usize, op: Value) -> Result<Value, MigrationError> {
    let Value::Object(mut object) = op else {
        return Err(MigrationError::Malformed {
            index,
            reason: "not an object".into(),
        });
    };
    let op_type = object
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| MigrationError::Malformed {
            index,
            reason: "missing type".into(),
        })?;

    match version {
        1 => v1_to_v2(&op_type, &mut object),
        2 => v2_to_v3(&mut object),
        _ => {}
    }
    Ok(Value::Object(object))
}

fn v1_to_v2(op_type: &str, object: &mut Map<String, Value>) {
    match op_type {
        "full_sync" => {
            let kind = data_field(object, "kind").unwrap_or_else(|| Value::from("notes"));
            object.insert("type".into(), Value::from("sync"));
            object.insert(
                "data".into(),
                serde_json::json!({ "kind": kind, "delta_token": null }),
            );
        }
        "sync" => {
            let kind = data_field(object, "kind").unwrap_or_else(|| Value::from("notes"));
            let token = data_field(object, "delta_token").unwrap_or(Value::Null);
            object.insert(
                "data".into(),
                serde_json::json!({ "kind": kind, "delta_token": token }),
            );
        }
        _ => {}
    }
}

fn v2_to_v3(object: &mut Map<String, Value>) {
    let Some(Value::Object(data)) = object.get_mut("data") else {
        return;
    };
    let Some(Value::Object(note)) = data.get_mut("note") else {
        return;
    };
    if let Some(revision) = note.remove("revision") {
        note.entry("local_revision").or_insert(revision);
    }
}

fn data_field(object: &Map<String, Value>, field: &str) -> Option<Value> {
    object
        .get("data")
        .and_then(|d| d.get(field))
        .filter(|v| !v.is_null())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_types::{Operation, ResourceKind};
    use serde_json::json;

    #[test]
    fn same_version_is_identity() {
        let ops = vec![json!({"type": "fetch_meeting_notes"})];
        let migrated = migrate(ops.clone(), 3, 3).unwrap();
        assert_eq!(migrated, ops);
    }

    #[test]
    fn v1_full_sync_becomes_sync_without_token() {
        let ops = vec![json!({"type": "full_sync", "data": {"kind": "note_references"}})];

        let migrated = migrate(ops, 1, CURRENT_SCHEMA_VERSION).unwrap();
        let op: Operation = serde_json::from_value(migrated[0].clone()).unwrap();

        assert_eq!(
            op,
            Operation::Sync {
                kind: ResourceKind::NoteReferences,
                delta_token: None,
            }
        );
    }

    #[test]
    fn v1_sync_without_kind_defaults_to_notes() {
        let ops = vec![json!({"type": "sync", "data": {"delta_token": "T1"}})];

        let migrated = migrate(ops, 1, 2).unwrap();

        assert_eq!(
            migrated[0],
            json!({"type": "sync", "data": {"kind": "notes", "delta_token": "T1"}})
        );
    }

    #[test]
    fn v2_note_revision_is_renamed() {
        let ops = vec![json!({
            "type": "create_note",
            "data": {"note": {
                "local_id": "l1",
                "content": {"text": "hi"},
                "revision": 4
            }}
        })];

        let migrated = migrate(ops, 2, 3).unwrap();
        let op: Operation = serde_json::from_value(migrated[0].clone()).unwrap();

        match op {
            Operation::CreateNote { note } => assert_eq!(note.local_revision, 4),
            other => panic!("Expected CreateNote, got {:?}", other),
        }
    }

    #[test]
    fn future_version_is_rejected() {
        let result = migrate(vec![], 4, CURRENT_SCHEMA_VERSION);
        assert_eq!(result, Err(MigrationError::UnsupportedVersion(4)));
    }

    #[test]
    fn backwards_is_rejected() {
        let result = migrate(vec![], 3, 2);
        assert_eq!(result, Err(MigrationError::Backwards { from: 3, to: 2 }));
    }

    #[test]
    fn non_object_operation_is_malformed() {
        let result = migrate(vec![json!(42)], 2, 3);
        assert!(matches!(result, Err(MigrationError::Malformed { index: 0, .. })));
    }
}
