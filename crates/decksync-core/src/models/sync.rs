//! Sync bookkeeping types: status, conflicts, errors and run results

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Card, ConflictId, Deck};
use crate::error::Error;
use crate::util::now_millis;

/// Reconciliation state of a locally stored entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Matches what the remote last accepted
    Synced,
    /// Local changes not yet pushed
    #[default]
    Pending,
    /// Remote moved ahead of the local copy
    Conflict,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(Self::Synced),
            "pending" => Ok(Self::Pending),
            "conflict" => Ok(Self::Conflict),
            other => Err(Error::Database(format!("unknown sync status '{other}'"))),
        }
    }
}

/// Which entity stream a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Deck,
    Card,
}

impl EntityType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deck => "deck",
            Self::Card => "card",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deck" => Ok(Self::Deck),
            "card" => Ok(Self::Card),
            other => Err(Error::Database(format!("unknown entity type '{other}'"))),
        }
    }
}

/// Full snapshot of either entity kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entityType", content = "data", rename_all = "lowercase")]
pub enum Entity {
    Deck(Deck),
    Card(Card),
}

impl Entity {
    pub const fn entity_type(&self) -> EntityType {
        match self {
            Self::Deck(_) => EntityType::Deck,
            Self::Card(_) => EntityType::Card,
        }
    }

    pub fn id(&self) -> String {
        match self {
            Self::Deck(deck) => deck.id.as_str(),
            Self::Card(card) => card.id.as_str(),
        }
    }

    pub const fn version(&self) -> u64 {
        match self {
            Self::Deck(deck) => deck.version,
            Self::Card(card) => card.version,
        }
    }

    pub const fn sync_status(&self) -> SyncStatus {
        match self {
            Self::Deck(deck) => deck.sync_status,
            Self::Card(card) => card.sync_status,
        }
    }
}

/// How a conflict should be settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    /// Keep the local snapshot and push it
    Local,
    /// Adopt the remote snapshot, no push
    Remote,
    /// Local-wins shallow merge, pushed with a version past both sides
    Merge,
}

impl FromStr for ConflictResolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            "merge" => Ok(Self::Merge),
            other => Err(Error::Validation(format!(
                "unknown resolution '{other}' (expected local, remote or merge)"
            ))),
        }
    }
}

/// Divergence detected during a push: remote version ahead of local
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    pub id: ConflictId,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub local_version: Entity,
    pub remote_version: Entity,
    /// Detection time (Unix ms)
    pub timestamp: i64,
    pub resolved: bool,
}

impl SyncConflict {
    /// Record a conflict between two snapshots of the same entity
    pub fn new(local: Entity, remote: Entity) -> Self {
        Self {
            id: ConflictId::new(),
            entity_type: local.entity_type(),
            entity_id: local.id(),
            local_version: local,
            remote_version: remote,
            timestamp: now_millis(),
            resolved: false,
        }
    }
}

/// A failure isolated to one entity (or to the run when `entity_id` is `None`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncError {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Option<String>,
    pub error: String,
    pub timestamp: i64,
}

impl SyncError {
    pub fn new(
        entity_type: EntityType,
        entity_id: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            entity_type,
            entity_id,
            error: error.into(),
            timestamp: now_millis(),
        }
    }

    /// Error scoped to a single entity
    pub fn for_entity(entity_type: EntityType, entity_id: impl ToString, error: &Error) -> Self {
        Self::new(entity_type, Some(entity_id.to_string()), error.to_string())
    }

    /// Error for the run as a whole
    pub fn run_level(entity_type: EntityType, error: impl Into<String>) -> Self {
        Self::new(entity_type, None, error)
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entity_id {
            Some(entity_id) => write!(f, "{} {entity_id}: {}", self.entity_type, self.error),
            None => f.write_str(&self.error),
        }
    }
}

/// Aggregate outcome of a sync run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    /// True when no errors were collected
    pub success: bool,
    /// Entities created, updated, deleted or pulled
    pub synced: usize,
    pub conflicts: Vec<SyncConflict>,
    pub errors: Vec<SyncError>,
}

impl SyncResult {
    /// A result carrying a single run-level error
    pub fn failed(error: SyncError) -> Self {
        Self {
            success: false,
            synced: 0,
            conflicts: Vec::new(),
            errors: vec![error],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewDeck;

    #[test]
    fn test_sync_status_roundtrip_str() {
        for status in [SyncStatus::Synced, SyncStatus::Pending, SyncStatus::Conflict] {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
        assert!("unknown".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn test_resolution_parse_is_case_insensitive() {
        assert_eq!(
            " Merge ".parse::<ConflictResolution>().unwrap(),
            ConflictResolution::Merge
        );
        assert!("both".parse::<ConflictResolution>().is_err());
    }

    #[test]
    fn test_conflict_takes_identity_from_local() {
        let deck = Deck::new(NewDeck::named("Deck"));
        let mut remote = deck.clone();
        remote.version = 3;
        let conflict = SyncConflict::new(Entity::Deck(deck.clone()), Entity::Deck(remote));

        assert_eq!(conflict.entity_type, EntityType::Deck);
        assert_eq!(conflict.entity_id, deck.id.as_str());
        assert!(!conflict.resolved);
    }

    #[test]
    fn test_entity_snapshot_json_is_tagged() {
        let deck = Deck::new(NewDeck::named("Deck"));
        let value = serde_json::to_value(Entity::Deck(deck)).unwrap();
        assert_eq!(value["entityType"], "deck");
        assert_eq!(value["data"]["name"], "Deck");
    }
}
