//! Remote deck service boundary.
//!
//! The sync engine and resolver only see [`RemoteApi`]; [`HttpRemoteApi`] is
//! the production implementation over the service's JSON routes.

mod http;
#[cfg(test)]
pub(crate) mod mock;

pub use http::HttpRemoteApi;

use crate::error::Result;
use crate::models::{Card, CardId, Deck, DeckId};

/// Operations the authoritative deck service exposes.
///
/// Implementations report a missing entity as [`crate::Error::NotFound`] and
/// every other failure as [`crate::Error::Remote`] or [`crate::Error::Timeout`].
#[allow(async_fn_in_trait)]
pub trait RemoteApi {
    async fn get_all_decks(&self) -> Result<Vec<Deck>>;

    async fn get_deck(&self, id: &DeckId) -> Result<Deck>;

    async fn create_deck(&self, deck: &Deck) -> Result<Deck>;

    async fn update_deck(&self, id: &DeckId, deck: &Deck) -> Result<Deck>;

    async fn delete_deck(&self, id: &DeckId) -> Result<()>;

    async fn get_card(&self, id: &CardId) -> Result<Card>;

    async fn create_card(&self, card: &Card) -> Result<Card>;

    async fn update_card(&self, id: &CardId, card: &Card) -> Result<Card>;

    async fn delete_card(&self, id: &CardId) -> Result<()>;
}
