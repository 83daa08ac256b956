//! Scripted in-memory [`RemoteApi`] for engine and resolver tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use super::RemoteApi;
use crate::error::{Error, Result};
use crate::models::{Card, CardId, Deck, DeckId};

type Hook = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
pub(crate) struct MockRemote {
    decks: Mutex<HashMap<DeckId, Deck>>,
    cards: Mutex<HashMap<CardId, Card>>,
    log: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    hook: Mutex<Option<Hook>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_deck(&self, deck: Deck) {
        self.decks.lock().unwrap().insert(deck.id, deck);
    }

    pub fn remove_deck(&self, id: &DeckId) {
        self.decks.lock().unwrap().remove(id);
    }

    pub fn deck(&self, id: &DeckId) -> Option<Deck> {
        self.decks.lock().unwrap().get(id).cloned()
    }

    pub fn insert_card(&self, card: Card) {
        self.cards.lock().unwrap().insert(card.id, card);
    }

    /// Make every call to `op` fail with a 503
    pub fn fail(&self, op: &str) {
        self.failing.lock().unwrap().insert(op.to_string());
    }

    /// Let calls to `op` succeed again
    pub fn recover(&self, op: &str) {
        self.failing.lock().unwrap().remove(op);
    }

    /// Sleep before answering every call
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Run `hook` with the operation name at the start of every call
    pub fn on_call(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Number of calls made to `op`
    pub fn calls(&self, op: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|call| *call == op).count()
    }

    /// Operation names in call order
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    async fn enter(&self, op: &str) -> Result<()> {
        self.log.lock().unwrap().push(op.to_string());
        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook(op);
        }

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(op) {
            return Err(Error::Remote {
                status: Some(503),
                message: format!("{op} unavailable"),
            });
        }
        Ok(())
    }
}

fn missing(entity: &'static str, id: impl ToString) -> Error {
    Error::NotFound {
        entity,
        id: id.to_string(),
    }
}

impl RemoteApi for MockRemote {
    async fn get_all_decks(&self) -> Result<Vec<Deck>> {
        self.enter("get_all_decks").await?;
        let mut decks: Vec<Deck> = self.decks.lock().unwrap().values().cloned().collect();
        decks.sort_by_key(|deck| deck.created_at);
        Ok(decks)
    }

    async fn get_deck(&self, id: &DeckId) -> Result<Deck> {
        self.enter("get_deck").await?;
        self.deck(id).ok_or_else(|| missing("Deck", id))
    }

    async fn create_deck(&self, deck: &Deck) -> Result<Deck> {
        self.enter("create_deck").await?;
        self.insert_deck(deck.clone());
        Ok(deck.clone())
    }

    async fn update_deck(&self, id: &DeckId, deck: &Deck) -> Result<Deck> {
        self.enter("update_deck").await?;
        let mut decks = self.decks.lock().unwrap();
        let stored = decks.get_mut(id).ok_or_else(|| missing("Deck", id))?;
        *stored = deck.clone();
        Ok(deck.clone())
    }

    async fn delete_deck(&self, id: &DeckId) -> Result<()> {
        self.enter("delete_deck").await?;
        self.decks
            .lock()
            .unwrap()
            .remove(id)
            .ok_or_else(|| missing("Deck", id))?;
        self.cards.lock().unwrap().retain(|_, card| &card.deck_id != id);
        Ok(())
    }

    async fn get_card(&self, id: &CardId) -> Result<Card> {
        self.enter("get_card").await?;
        self.cards
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| missing("Card", id))
    }

    async fn create_card(&self, card: &Card) -> Result<Card> {
        self.enter("create_card").await?;
        self.insert_card(card.clone());
        Ok(card.clone())
    }

    async fn update_card(&self, id: &CardId, card: &Card) -> Result<Card> {
        self.enter("update_card").await?;
        let mut cards = self.cards.lock().unwrap();
        let stored = cards.get_mut(id).ok_or_else(|| missing("Card", id))?;
        *stored = card.clone();
        Ok(card.clone())
    }

    async fn delete_card(&self, id: &CardId) -> Result<()> {
        self.enter("delete_card").await?;
        self.cards
            .lock()
            .unwrap()
            .remove(id)
            .ok_or_else(|| missing("Card", id))?;
        Ok(())
    }
}
