//! Deck and card repository
//!
//! Every mutation goes through a store transaction so that version bumps,
//! deck card counts, cascades and deletion tombstones land together.

use super::rows::{Index, Table};
use super::store::{LocalStore, StoreTransaction};
use crate::error::{Error, Result};
use crate::models::{
    validate_occlusions, Card, CardId, CardPatch, Deck, DeckId, DeckPatch, EntityType, NewCard,
    NewDeck,
};
use crate::util::now_millis;

/// Mutation layer over the local store
#[derive(Clone)]
pub struct EntityRepository {
    store: LocalStore,
}

impl EntityRepository {
    pub const fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// The store this repository writes to
    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Create a deck with version 1, pending, and no cards
    pub async fn create_deck(&self, input: NewDeck) -> Result<Deck> {
        require_text("deck name", &input.name)?;

        let deck = Deck::new(input);
        self.store.put(&deck).await?;
        tracing::debug!("Created deck {}", deck.id);
        Ok(deck)
    }

    pub async fn get_deck(&self, id: &DeckId) -> Result<Option<Deck>> {
        self.store.get(id).await
    }

    /// All decks in creation order
    pub async fn list_decks(&self) -> Result<Vec<Deck>> {
        self.store.all().await
    }

    /// Merge `patch` into a deck and record the mutation
    pub async fn update_deck(&self, id: &DeckId, patch: DeckPatch) -> Result<Deck> {
        if let Some(name) = &patch.name {
            require_text("deck name", name)?;
        }

        let tx = self.store.transaction(&[Table::Decks]).await?;
        let result: Result<Deck> = async {
            let mut deck: Deck = tx.require(id).await?;
            deck.apply_patch(patch);
            deck.touch(now_millis());
            tx.put(&deck).await?;
            Ok(deck)
        }
        .await;
        tx.finish(result).await
    }

    /// Delete a deck together with every card it owns
    pub async fn delete_deck(&self, id: &DeckId) -> Result<()> {
        let tx = self
            .store
            .transaction(&[Table::Decks, Table::Cards, Table::Deletions])
            .await?;
        let result: Result<usize> = async {
            let deck: Deck = tx.require(id).await?;

            let cards: Vec<Card> = tx.query_by_index(Index::DeckId, *id).await?;
            for card in &cards {
                tx.delete::<Card>(&card.id).await?;
            }
            tx.delete::<Deck>(id).await?;

            if deck.last_synced_at.is_some() {
                tx.record_deletion(EntityType::Deck, &id.as_str(), now_millis())
                    .await?;
            }
            Ok(cards.len())
        }
        .await;

        let removed_cards = tx.finish(result).await?;
        tracing::debug!("Deleted deck {id} and {removed_cards} card(s)");
        Ok(())
    }

    /// Create a card and bump its deck's card count and version
    pub async fn create_card(&self, input: NewCard) -> Result<Card> {
        require_text("card front", &input.front)?;
        validate_occlusions(&input.occlusions).map_err(Error::Validation)?;

        let tx = self.store.transaction(&[Table::Decks, Table::Cards]).await?;
        let result: Result<Card> = async {
            let mut deck: Deck = tx.require(&input.deck_id).await?;
            let card = Card::new(input);
            tx.put(&card).await?;

            refresh_card_count(&tx, &mut deck).await?;
            Ok(card)
        }
        .await;
        tx.finish(result).await
    }

    pub async fn get_card(&self, id: &CardId) -> Result<Option<Card>> {
        self.store.get(id).await
    }

    /// All cards in creation order
    pub async fn list_cards(&self) -> Result<Vec<Card>> {
        self.store.all().await
    }

    /// Cards owned by `deck_id`, in creation order
    pub async fn cards_by_deck(&self, deck_id: &DeckId) -> Result<Vec<Card>> {
        self.store.query_by_index(Index::DeckId, *deck_id).await
    }

    pub async fn update_card(&self, id: &CardId, patch: CardPatch) -> Result<Card> {
        if let Some(front) = &patch.front {
            require_text("card front", front)?;
        }
        if let Some(occlusions) = &patch.occlusions {
            validate_occlusions(occlusions).map_err(Error::Validation)?;
        }

        let tx = self.store.transaction(&[Table::Cards]).await?;
        let result: Result<Card> = async {
            let mut card: Card = tx.require(id).await?;
            card.apply_patch(patch);
            card.touch(now_millis());
            tx.put(&card).await?;
            Ok(card)
        }
        .await;
        tx.finish(result).await
    }

    /// Delete a card and decrement its deck's card count
    pub async fn delete_card(&self, id: &CardId) -> Result<()> {
        let tx = self
            .store
            .transaction(&[Table::Decks, Table::Cards, Table::Deletions])
            .await?;
        let result: Result<()> = async {
            let card: Card = tx.require(id).await?;
            tx.delete::<Card>(id).await?;

            if card.last_synced_at.is_some() {
                tx.record_deletion(EntityType::Card, &id.as_str(), now_millis())
                    .await?;
            }

            if let Some(mut deck) = tx.get::<Deck>(&card.deck_id).await? {
                refresh_card_count(&tx, &mut deck).await?;
            }
            Ok(())
        }
        .await;
        tx.finish(result).await
    }

    /// Decks matching a search query and containing every tag in `tags`
    pub async fn get_filtered_decks(&self, query: &str, tags: &[String]) -> Result<Vec<Deck>> {
        let decks = self.list_decks().await?;
        Ok(decks
            .into_iter()
            .filter(|deck| deck_matches(deck, query, tags))
            .collect())
    }
}

/// Recount the deck's cards and record the change on the deck
pub(crate) async fn refresh_card_count(tx: &StoreTransaction<'_>, deck: &mut Deck) -> Result<()> {
    deck.card_count = tx.count_cards_in_deck(&deck.id).await?;
    deck.touch(now_millis());
    tx.put(&*deck).await
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Whether `deck` passes a search query and a tag filter.
///
/// An empty query matches everything; any other query, whitespace included,
/// is a plain substring. Tags use intersection semantics.
pub fn deck_matches(deck: &Deck, query: &str, tags: &[String]) -> bool {
    (query.is_empty() || deck.matches_query(query)) && deck.has_all_tags(tags)
}

/// Decks passing [`deck_matches`], in their original order
pub fn filter_decks<'a>(decks: &'a [Deck], query: &str, tags: &[String]) -> Vec<&'a Deck> {
    decks
        .iter()
        .filter(|deck| deck_matches(deck, query, tags))
        .collect()
}
