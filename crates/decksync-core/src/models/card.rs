//! Card model

use serde::{Deserialize, Serialize};

use super::{CardId, DeckId, SyncStatus};
use crate::util::{normalize_tags, normalize_text_option, now_millis};

/// A rectangular mask over a card image, produced by the occlusion editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occlusion {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A flashcard owned by a deck
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: CardId,
    /// Owning deck; the deck must exist locally
    pub deck_id: DeckId,
    pub front: String,
    pub back: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Masks in drawing order
    #[serde(default)]
    pub occlusions: Vec<Occlusion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<i64>,
    #[serde(default)]
    pub sync_status: SyncStatus,
    pub version: u64,
}

/// User input for creating a card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCard {
    pub deck_id: DeckId,
    pub front: String,
    pub back: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub occlusions: Vec<Occlusion>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewCard {
    /// Plain front/back card for `deck_id`
    pub fn new(deck_id: DeckId, front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            deck_id,
            front: front.into(),
            back: back.into(),
            image_url: None,
            occlusions: Vec::new(),
            notes: None,
            tags: Vec::new(),
        }
    }
}

/// Partial update for a card; clearable optionals are doubly wrapped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardPatch {
    pub front: Option<String>,
    pub back: Option<String>,
    pub image_url: Option<Option<String>>,
    pub occlusions: Option<Vec<Occlusion>>,
    pub notes: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

impl Card {
    /// Build a fresh, never-synced card from validated input
    #[must_use]
    pub fn new(input: NewCard) -> Self {
        let now = now_millis();
        Self {
            id: CardId::new(),
            deck_id: input.deck_id,
            front: input.front.trim().to_string(),
            back: input.back,
            image_url: normalize_text_option(input.image_url),
            occlusions: input.occlusions,
            notes: normalize_text_option(input.notes),
            tags: normalize_tags(input.tags),
            created_at: now,
            updated_at: now,
            last_synced_at: None,
            sync_status: SyncStatus::Pending,
            version: 1,
        }
    }

    pub fn apply_patch(&mut self, patch: CardPatch) {
        if let Some(front) = patch.front {
            self.front = front.trim().to_string();
        }
        if let Some(back) = patch.back {
            self.back = back;
        }
        if let Some(image_url) = patch.image_url {
            self.image_url = normalize_text_option(image_url);
        }
        if let Some(occlusions) = patch.occlusions {
            self.occlusions = occlusions;
        }
        if let Some(notes) = patch.notes {
            self.notes = normalize_text_option(notes);
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

    /// Shallow merge where local values win; see [`super::Deck::merge`].
    #[must_use]
    pub fn merge(local: &Self, remote: &Self, now: i64) -> Self {
        Self {
            image_url: local.image_url.clone().or_else(|| remote.image_url.clone()),
            notes: local.notes.clone().or_else(|| remote.notes.clone()),
            last_synced_at: local.last_synced_at.or(remote.last_synced_at),
            version: local.version.max(remote.version) + 1,
            updated_at: now,
            ..local.clone()
        }
    }
}

/// Reject masks with non-positive or non-finite geometry
pub(crate) fn validate_occlusions(occlusions: &[Occlusion]) -> Result<(), String> {
    for occlusion in occlusions {
        let finite = [occlusion.x, occlusion.y, occlusion.width, occlusion.height]
            .iter()
            .all(|value| value.is_finite());
        if !finite || occlusion.width <= 0.0 || occlusion.height <= 0.0 {
            return Err(format!(
                "occlusion '{}' must have finite coordinates and a positive size",
                occlusion.id
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(id: &str, width: f64) -> Occlusion {
        Occlusion {
            id: id.to_string(),
            x: 10.0,
            y: 20.0,
            width,
            height: 15.0,
            label: None,
        }
    }

    #[test]
    fn test_card_new_defaults() {
        let card = Card::new(NewCard::new(DeckId::new(), " Front ", "Back"));
        assert_eq!(card.front, "Front");
        assert_eq!(card.version, 1);
        assert_eq!(card.sync_status, SyncStatus::Pending);
        assert!(card.occlusions.is_empty());
    }

    #[test]
    fn test_patch_keeps_untouched_fields() {
        let mut card = Card::new(NewCard {
            notes: Some("keep me".to_string()),
            ..NewCard::new(DeckId::new(), "Q", "A")
        });
        card.apply_patch(CardPatch {
            back: Some("New answer".to_string()),
            ..CardPatch::default()
        });
        assert_eq!(card.back, "New answer");
        assert_eq!(card.notes.as_deref(), Some("keep me"));
    }

    #[test]
    fn test_merge_falls_back_to_remote_optionals() {
        let local = Card::new(NewCard::new(DeckId::new(), "Local", "A"));
        let mut remote = local.clone();
        remote.front = "Remote".to_string();
        remote.image_url = Some("https://img.example.com/1.png".to_string());
        remote.version = 5;

        let merged = Card::merge(&local, &remote, 7);
        assert_eq!(merged.front, "Local");
        assert_eq!(merged.image_url, remote.image_url);
        assert_eq!(merged.version, 6);
    }

    #[test]
    fn test_validate_occlusions() {
        assert!(validate_occlusions(&[mask("a", 5.0)]).is_ok());
        assert!(validate_occlusions(&[mask("b", 0.0)]).is_err());
        assert!(validate_occlusions(&[mask("c", f64::NAN)]).is_err());
    }
}
