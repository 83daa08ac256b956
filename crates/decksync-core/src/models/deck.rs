//! Deck model

use serde::{Deserialize, Serialize};

use super::{DeckId, SyncStatus};
use crate::util::{normalize_tags, normalize_text_option, now_millis};

/// A named collection of cards, tracked by the sync engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    /// Unique identifier
    pub id: DeckId,
    /// Display name, never blank
    pub name: String,
    /// Optional free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tag set, kept in first-seen order without duplicates
    #[serde(default)]
    pub tags: Vec<String>,
    /// Number of cards owned by this deck in the local store
    #[serde(default)]
    pub card_count: u32,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Last successful reconciliation (Unix ms), unset until first push
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<i64>,
    /// Reconciliation state
    #[serde(default)]
    pub sync_status: SyncStatus,
    /// Local mutation counter, starts at 1
    pub version: u64,
}

/// User input for creating a deck
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDeck {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewDeck {
    /// Create input with just a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Attach a description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach tags
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Partial update for a deck; `None` leaves a field untouched.
///
/// `description` is doubly optional so it can be cleared with `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeckPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

impl DeckPatch {
    /// Whether applying this patch would change nothing
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.tags.is_none()
    }
}

impl Deck {
    /// Build a fresh, never-synced deck from validated input
    #[must_use]
    pub fn new(input: NewDeck) -> Self {
        let now = now_millis();
        Self {
            id: DeckId::new(),
            name: input.name.trim().to_string(),
            description: normalize_text_option(input.description),
            tags: normalize_tags(input.tags),
            card_count: 0,
            created_at: now,
            updated_at: now,
            last_synced_at: None,
            sync_status: SyncStatus::Pending,
            version: 1,
        }
    }

    /// Merge `patch` over the current field values.
    ///
    /// Does not touch version or sync bookkeeping.
    pub fn apply_patch(&mut self, patch: DeckPatch) {
        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(description) = patch.description {
            self.description = normalize_text_option(description);
        }
        if let Some(tags) = patch.tags {
            self.tags = normalize_tags(tags);
        }
    }

    /// Record a local mutation: bump version, mark pending.
    pub fn touch(&mut self, now: i64) {
        self.updated_at = now;
        self.sync_status = SyncStatus::Pending;
        self.version += 1;
    }

    /// Shallow merge where local values win.
    ///
    /// Optional fields fall back to the remote value when unset locally, and
    /// the version is bumped past both inputs. This is not a field-level
    /// three-way merge: concurrent edits to the same field keep the local one.
    #[must_use]
    pub fn merge(local: &Self, remote: &Self, now: i64) -> Self {
        Self {
            description: local.description.clone().or_else(|| remote.description.clone()),
            last_synced_at: local.last_synced_at.or(remote.last_synced_at),
            version: local.version.max(remote.version) + 1,
            updated_at: now,
            ..local.clone()
        }
    }

    /// Whether the deck carries every tag in `tags`
    pub fn has_all_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|tag| self.tags.contains(tag))
    }

    /// Case-insensitive substring match against name or description
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.name.to_lowercase().contains(&query)
            || self
                .description
                .as_deref()
                .is_some_and(|description| description.to_lowercase().contains(&query))
    }
}
