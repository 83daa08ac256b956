//! Sync-side view of decks and cards

use crate::db::{refresh_card_count, StoreTransaction, StoredEntity};
use crate::error::{Error, Result};
use crate::models::{Card, Deck, Entity, EntityType, SyncStatus};
use crate::remote::RemoteApi;

/// An entity the engine can push, pull and resolve
#[allow(async_fn_in_trait)]
pub trait Tracked: StoredEntity + Clone {
    const ENTITY_TYPE: EntityType;

    fn entity_id(&self) -> &Self::Id;
    fn version(&self) -> u64;
    fn last_synced_at(&self) -> Option<i64>;

    /// Record an accepted push; only an unchanged copy becomes `synced`
    fn record_push(&mut self, now: i64, up_to_date: bool);

    /// Local-wins shallow merge with the version bumped past both sides
    fn merge(local: &Self, remote: &Self, now: i64) -> Self;

    /// Replace the stored `previous` row with `self`, keeping derived deck
    /// counts in step. The transaction must cover decks and cards.
    async fn write_over(&mut self, tx: &StoreTransaction<'_>, previous: &Self) -> Result<()>;

    fn into_entity(self) -> Entity;
    fn parse_id(raw: &str) -> Result<Self::Id>;

    async fn fetch_remote<R: RemoteApi>(remote: &R, id: &Self::Id) -> Result<Self>;
    async fn create_remote<R: RemoteApi>(remote: &R, entity: &Self) -> Result<Self>;
    async fn update_remote<R: RemoteApi>(remote: &R, entity: &Self) -> Result<Self>;
    async fn delete_remote<R: RemoteApi>(remote: &R, id: &Self::Id) -> Result<()>;
}

fn invalid_id(entity_type: EntityType, raw: &str, error: &uuid::Error) -> Error {
    Error::Database(format!("invalid {entity_type} id '{raw}': {error}"))
}

impl Tracked for Deck {
    const ENTITY_TYPE: EntityType = EntityType::Deck;

    fn entity_id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn last_synced_at(&self) -> Option<i64> {
        self.last_synced_at
    }

    fn record_push(&mut self, now: i64, up_to_date: bool) {
        self.last_synced_at = Some(now);
        if up_to_date {
            self.sync_status = SyncStatus::Synced;
        }
    }

    fn merge(local: &Self, remote: &Self, now: i64) -> Self {
        Self::merge(local, remote, now)
    }

    async fn write_over(&mut self, tx: &StoreTransaction<'_>, _previous: &Self) -> Result<()> {
        self.card_count = tx.count_cards_in_deck(&self.id).await?;
        tx.put(&*self).await
    }

    fn into_entity(self) -> Entity {
        Entity::Deck(self)
    }

    fn parse_id(raw: &str) -> Result<Self::Id> {
        raw.parse()
            .map_err(|error| invalid_id(Self::ENTITY_TYPE, raw, &error))
    }

    async fn fetch_remote<R: RemoteApi>(remote: &R, id: &Self::Id) -> Result<Self> {
        remote.get_deck(id).await
    }

    async fn create_remote<R: RemoteApi>(remote: &R, entity: &Self) -> Result<Self> {
        remote.create_deck(entity).await
    }

    async fn update_remote<R: RemoteApi>(remote: &R, entity: &Self) -> Result<Self> {
        remote.update_deck(&entity.id, entity).await
    }

    async fn delete_remote<R: RemoteApi>(remote: &R, id: &Self::Id) -> Result<()> {
        remote.delete_deck(id).await
    }
}

impl Tracked for Card {
    const ENTITY_TYPE: EntityType = EntityType::Card;

    fn entity_id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn last_synced_at(&self) -> Option<i64> {
        self.last_synced_at
    }

    fn record_push(&mut self, now: i64, up_to_date: bool) {
        self.last_synced_at = Some(now);
        if up_to_date {
            self.sync_status = SyncStatus::Synced;
        }
    }

    fn merge(local: &Self, remote: &Self, now: i64) -> Self {
        Self::merge(local, remote, now)
    }

    async fn write_over(&mut self, tx: &StoreTransaction<'_>, previous: &Self) -> Result<()> {
        if self.deck_id == previous.deck_id {
            return tx.put(&*self).await;
        }

        let mut target: Deck = tx.require(&self.deck_id).await?;
        tx.put(&*self).await?;
        refresh_card_count(tx, &mut target).await?;
        if let Some(mut source) = tx.get::<Deck>(&previous.deck_id).await? {
            refresh_card_count(tx, &mut source).await?;
        }
        Ok(())
    }

    fn into_entity(self) -> Entity {
        Entity::Card(self)
    }

    fn parse_id(raw: &str) -> Result<Self::Id> {
        raw.parse()
            .map_err(|error| invalid_id(Self::ENTITY_TYPE, raw, &error))
    }

    async fn fetch_remote<R: RemoteApi>(remote: &R, id: &Self::Id) -> Result<Self> {
        remote.get_card(id).await
    }

    async fn create_remote<R: RemoteApi>(remote: &R, entity: &Self) -> Result<Self> {
        remote.create_card(entity).await
    }

    async fn update_remote<R: RemoteApi>(remote: &R, entity: &Self) -> Result<Self> {
        remote.update_card(&entity.id, entity).await
    }

    async fn delete_remote<R: RemoteApi>(remote: &R, id: &Self::Id) -> Result<()> {
        remote.delete_card(id).await
    }
}
