//! Data models for decksync

mod card;
mod deck;
mod ids;
mod sync;

pub(crate) use card::validate_occlusions;
pub use card::{Card, CardPatch, NewCard, Occlusion};
pub use deck::{Deck, DeckPatch, NewDeck};
pub use ids::{CardId, ConflictId, DeckId};
pub use sync::{
    ConflictResolution, Entity, EntityType, SyncConflict, SyncError, SyncResult, SyncStatus,
};
