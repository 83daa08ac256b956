//! Sync ledger: persisted conflicts and the deletion outbox

use libsql::params::Params;
use libsql::{Connection, Row, Value};

use super::rows::{integer, text};
use crate::error::Result;
use crate::models::{ConflictId, EntityType, SyncConflict};

/// A local delete of a previously synced entity, waiting to be pushed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeletion {
    pub entity_type: EntityType,
    pub entity_id: String,
    /// Unix ms
    pub deleted_at: i64,
}

const CONFLICT_COLUMNS: &str =
    "id, entity_type, entity_id, local_version, remote_version, detected_at, resolved";

/// Store a conflict, replacing any unresolved one for the same entity
pub async fn record_conflict(conn: &Connection, conflict: &SyncConflict) -> Result<()> {
    conn.execute(
        "DELETE FROM sync_conflicts WHERE entity_type = ? AND entity_id = ? AND resolved = 0",
        [conflict.entity_type.as_str(), conflict.entity_id.as_str()],
    )
    .await?;

    conn.execute(
        &format!("INSERT INTO sync_conflicts ({CONFLICT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"),
        Params::Positional(vec![
            Value::Text(conflict.id.as_str()),
            Value::Text(conflict.entity_type.as_str().to_string()),
            Value::Text(conflict.entity_id.clone()),
            Value::Text(serde_json::to_string(&conflict.local_version)?),
            Value::Text(serde_json::to_string(&conflict.remote_version)?),
            Value::Integer(conflict.timestamp),
            Value::Integer(i64::from(conflict.resolved)),
        ]),
    )
    .await?;

    Ok(())
}

pub async fn get_conflict(conn: &Connection, id: &ConflictId) -> Result<Option<SyncConflict>> {
    let mut rows = conn
        .query(
            &format!("SELECT {CONFLICT_COLUMNS} FROM sync_conflicts WHERE id = ?"),
            [id.as_str()],
        )
        .await?;

    match rows.next().await? {
        Some(row) => Ok(Some(parse_conflict(&row)?)),
        None => Ok(None),
    }
}

/// Conflicts oldest first; unresolved only unless `include_resolved`
pub async fn list_conflicts(conn: &Connection, include_resolved: bool) -> Result<Vec<SyncConflict>> {
    let filter = if include_resolved {
        ""
    } else {
        "WHERE resolved = 0"
    };
    let mut rows = conn
        .query(
            &format!(
                "SELECT {CONFLICT_COLUMNS} FROM sync_conflicts {filter} ORDER BY detected_at, rowid"
            ),
            (),
        )
        .await?;

    let mut conflicts = Vec::new();
    while let Some(row) = rows.next().await? {
        conflicts.push(parse_conflict(&row)?);
    }
    Ok(conflicts)
}

pub async fn mark_conflict_resolved(conn: &Connection, id: &ConflictId) -> Result<bool> {
    let affected = conn
        .execute(
            "UPDATE sync_conflicts SET resolved = 1 WHERE id = ?",
            [id.as_str()],
        )
        .await?;
    Ok(affected > 0)
}

/// Close every open conflict on one entity; returns how many were closed
pub async fn resolve_open_conflicts(
    conn: &Connection,
    entity_type: EntityType,
    entity_id: &str,
) -> Result<u64> {
    Ok(conn
        .execute(
            "UPDATE sync_conflicts SET resolved = 1 \
             WHERE entity_type = ? AND entity_id = ? AND resolved = 0",
            [entity_type.as_str(), entity_id],
        )
        .await?)
}

pub async fn clear_resolved_conflicts(conn: &Connection) -> Result<u64> {
    Ok(conn
        .execute("DELETE FROM sync_conflicts WHERE resolved = 1", ())
        .await?)
}

fn parse_conflict(row: &Row) -> Result<SyncConflict> {
    let raw_id = text(row, 0)?;
    Ok(SyncConflict {
        id: raw_id.parse().map_err(|error| {
            crate::Error::Database(format!("invalid conflict id '{raw_id}': {error}"))
        })?,
        entity_type: text(row, 1)?.parse()?,
        entity_id: text(row, 2)?,
        local_version: serde_json::from_str(&text(row, 3)?)?,
        remote_version: serde_json::from_str(&text(row, 4)?)?,
        timestamp: integer(row, 5)?,
        resolved: integer(row, 6)? != 0,
    })
}

pub async fn record_deletion(
    conn: &Connection,
    entity_type: EntityType,
    entity_id: &str,
    deleted_at: i64,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO pending_deletions (entity_type, entity_id, deleted_at)
         VALUES (?, ?, ?)",
        Params::Positional(vec![
            Value::Text(entity_type.as_str().to_string()),
            Value::Text(entity_id.to_string()),
            Value::Integer(deleted_at),
        ]),
    )
    .await?;
    Ok(())
}

/// Tombstones of `entity_type`, oldest first
pub async fn pending_deletions(
    conn: &Connection,
    entity_type: EntityType,
) -> Result<Vec<PendingDeletion>> {
    let mut rows = conn
        .query(
            "SELECT entity_type, entity_id, deleted_at FROM pending_deletions
             WHERE entity_type = ? ORDER BY deleted_at, rowid",
            [entity_type.as_str()],
        )
        .await?;

    let mut deletions = Vec::new();
    while let Some(row) = rows.next().await? {
        deletions.push(PendingDeletion {
            entity_type: text(&row, 0)?.parse()?,
            entity_id: text(&row, 1)?,
            deleted_at: integer(&row, 2)?,
        });
    }
    Ok(deletions)
}

pub async fn remove_deletion(
    conn: &Connection,
    entity_type: EntityType,
    entity_id: &str,
) -> Result<()> {
    conn.execute(
        "DELETE FROM pending_deletions WHERE entity_type = ? AND entity_id = ?",
        [entity_type.as_str(), entity_id],
    )
    .await?;
    Ok(())
}
