//! decksync-core - Core library for decksync
//!
//! Offline-first storage for decks and flashcards. Edits land in a local
//! libSQL store first; [`sync::SyncEngine`] later reconciles them with the
//! remote deck service and reports divergences as conflicts that
//! [`sync::ConflictResolver`] settles.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod sync;
pub mod util;

pub use config::SyncSettings;
pub use db::{DeckView, EntityRepository, LocalStore};
pub use error::{Error, Result};
pub use models::{Card, CardId, Deck, DeckId};
pub use remote::{HttpRemoteApi, RemoteApi};
pub use sync::{ConflictResolver, SyncEngine};
