//! In-memory projection of decks and cards for front ends

use super::repository::{filter_decks, EntityRepository};
use crate::error::Result;
use crate::models::{Card, Deck, DeckId};

/// Loaded decks and cards plus the current selection and filters.
///
/// Owned by whichever front end drives it; the repository stays the source
/// of truth and the view is reloaded or patched after each mutation.
#[derive(Debug, Clone, Default)]
pub struct DeckView {
    pub decks: Vec<Deck>,
    pub cards: Vec<Card>,
    pub selected_deck_id: Option<DeckId>,
    pub search_query: String,
    pub tag_filter: Vec<String>,
}

impl DeckView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the loaded decks with the repository's current list
    pub async fn load_decks(&mut self, repo: &EntityRepository) -> Result<()> {
        self.decks = repo.list_decks().await?;
        if let Some(selected) = self.selected_deck_id {
            if self.deck_by_id(&selected).is_none() {
                self.selected_deck_id = None;
            }
        }
        Ok(())
    }

    /// Load the cards of one deck, or every card when `deck_id` is `None`
    pub async fn load_cards(
        &mut self,
        repo: &EntityRepository,
        deck_id: Option<&DeckId>,
    ) -> Result<()> {
        self.cards = match deck_id {
            Some(deck_id) => repo.cards_by_deck(deck_id).await?,
            None => repo.list_cards().await?,
        };
        Ok(())
    }

    pub fn select_deck(&mut self, deck_id: Option<DeckId>) {
        self.selected_deck_id = deck_id;
    }

    pub fn selected_deck(&self) -> Option<&Deck> {
        self.selected_deck_id
            .as_ref()
            .and_then(|deck_id| self.deck_by_id(deck_id))
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.search_query = query.into();
    }

    pub fn set_tag_filter<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag_filter = tags.into_iter().map(Into::into).collect();
    }

    /// Loaded decks passing the current search query and tag filter
    pub fn filtered_decks(&self) -> Vec<&Deck> {
        filter_decks(&self.decks, &self.search_query, &self.tag_filter)
    }

    pub fn deck_by_id(&self, deck_id: &DeckId) -> Option<&Deck> {
        self.decks.iter().find(|deck| &deck.id == deck_id)
    }

    pub fn cards_by_deck_id(&self, deck_id: &DeckId) -> Vec<&Card> {
        self.cards
            .iter()
            .filter(|card| &card.deck_id == deck_id)
            .collect()
    }

    /// Insert or replace a deck after a create or update
    pub fn apply_saved_deck(&mut self, deck: Deck) {
        match self.decks.iter_mut().find(|existing| existing.id == deck.id) {
            Some(existing) => *existing = deck,
            None => self.decks.push(deck),
        }
    }

    /// Drop a deleted deck and its cards, clearing the selection if it pointed there
    pub fn apply_deleted_deck(&mut self, deck_id: &DeckId) {
        self.decks.retain(|deck| &deck.id != deck_id);
        self.cards.retain(|card| &card.deck_id != deck_id);
        if self.selected_deck_id.as_ref() == Some(deck_id) {
            self.selected_deck_id = None;
        }
    }
}
