//! Database layer for decksync

mod connection;
mod ledger;
mod migrations;
mod repository;
mod rows;
mod store;
mod view;

pub use connection::Database;
pub use ledger::PendingDeletion;
pub use repository::{deck_matches, filter_decks, EntityRepository};
pub(crate) use repository::refresh_card_count;
pub use rows::{Index, IndexValue, StoredEntity, Table};
pub use store::{LocalStore, StoreTransaction};
pub use view::DeckView;
