//! Applying a chosen resolution to a detected conflict

use super::tracked::Tracked;
use super::SyncContext;
use crate::db::{LocalStore, Table};
use crate::error::{Error, Result};
use crate::models::{ConflictId, ConflictResolution, Entity, SyncConflict, SyncError};
use crate::remote::RemoteApi;
use crate::util::now_millis;

/// Settles conflicts produced by [`super::SyncEngine::sync_all`]
pub struct ConflictResolver<R> {
    ctx: SyncContext<R>,
}

impl<R> Clone for ConflictResolver<R> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<R: RemoteApi> ConflictResolver<R> {
    pub(super) const fn new(ctx: SyncContext<R>) -> Self {
        Self { ctx }
    }

    pub const fn store(&self) -> &LocalStore {
        &self.ctx.store
    }

    /// Write the chosen version locally as `synced` and push it if needed.
    ///
    /// * `Local` keeps the local snapshot and pushes it.
    /// * `Remote` adopts the remote snapshot without pushing.
    /// * `Merge` keeps local field values, falls back to remote for unset
    ///   optionals, bumps the version past both and pushes the result.
    ///
    /// Fails without touching the store if the entity was edited or deleted
    /// locally after the conflict was detected. A failed push puts the
    /// pre-resolution row back and leaves the conflict unresolved, so the
    /// same conflict can be resolved again later. A card moved to another
    /// deck refreshes the counts of both decks.
    pub async fn resolve_conflict(
        &self,
        conflict: &SyncConflict,
        resolution: ConflictResolution,
    ) -> std::result::Result<Entity, SyncError> {
        let resolved = match (&conflict.local_version, &conflict.remote_version) {
            (Entity::Deck(local), Entity::Deck(remote)) => self
                .resolve(conflict, local, remote, resolution)
                .await
                .map(Entity::Deck),
            (Entity::Card(local), Entity::Card(remote)) => self
                .resolve(conflict, local, remote, resolution)
                .await
                .map(Entity::Card),
            _ => Err(Error::Validation(
                "conflict snapshots hold different entity types".to_string(),
            )),
        };

        match resolved {
            Ok(entity) => {
                tracing::info!(
                    "Resolved conflict {} on {} {} ({resolution:?}), now v{}",
                    conflict.id,
                    conflict.entity_type,
                    conflict.entity_id,
                    entity.version()
                );
                Ok(entity)
            }
            Err(error) => {
                tracing::warn!(
                    "Failed to resolve conflict {} on {} {}: {error}",
                    conflict.id,
                    conflict.entity_type,
                    conflict.entity_id
                );
                Err(SyncError::for_entity(
                    conflict.entity_type,
                    &conflict.entity_id,
                    &error,
                ))
            }
        }
    }

    /// Resolve a persisted conflict by id
    pub async fn resolve_conflict_by_id(
        &self,
        id: &ConflictId,
        resolution: ConflictResolution,
    ) -> Result<Entity> {
        let conflict = self
            .ctx
            .store
            .get_conflict(id)
            .await?
            .ok_or_else(|| Error::NotFound {
                entity: "Conflict",
                id: id.to_string(),
            })?;
        if conflict.resolved {
            return Err(Error::Validation(format!(
                "conflict {id} is already resolved"
            )));
        }

        self.resolve_conflict(&conflict, resolution)
            .await
            .map_err(|error| Error::Resolution(Box::new(error)))
    }

    /// Persisted conflicts, oldest first
    pub async fn list_conflicts(&self, include_resolved: bool) -> Result<Vec<SyncConflict>> {
        self.ctx.store.list_conflicts(include_resolved).await
    }

    /// Forget resolved conflicts; returns how many were removed
    pub async fn clear_resolved_conflicts(&self) -> Result<u64> {
        self.ctx.store.clear_resolved_conflicts().await
    }

    async fn resolve<T: Tracked>(
        &self,
        conflict: &SyncConflict,
        local: &T,
        remote: &T,
        resolution: ConflictResolution,
    ) -> Result<T> {
        let key = local.entity_id().to_string();
        let _lock = self.ctx.locks.lock(T::ENTITY_TYPE, &key).await;

        let now = now_millis();
        let (mut chosen, push) = match resolution {
            ConflictResolution::Local => (local.clone(), true),
            ConflictResolution::Remote => (remote.clone(), false),
            ConflictResolution::Merge => (T::merge(local, remote, now), true),
        };
        chosen.record_push(now, true);

        let (previous, chosen) = self.write_resolved(local, chosen).await?;

        if push {
            let pushed = self
                .ctx
                .call(T::update_remote(&*self.ctx.remote, &chosen))
                .await;
            if let Err(error) = pushed {
                self.restore(previous, &chosen).await;
                return Err(error);
            }
        }

        self.mark_resolved(&conflict.id).await?;
        Ok(chosen)
    }

    /// Store `chosen` if the local row still matches the conflict snapshot.
    ///
    /// Returns the row it replaced along with the stored copy of `chosen`.
    async fn write_resolved<T: Tracked>(&self, local: &T, mut chosen: T) -> Result<(T, T)> {
        let tx = self
            .ctx
            .store
            .transaction(&[Table::Decks, Table::Cards])
            .await?;
        let result: Result<(T, T)> = async {
            let current: T = tx.require(local.entity_id()).await?;
            if current.version() != local.version() {
                return Err(Error::Validation(format!(
                    "{} {} changed locally (v{} -> v{}) since the conflict was detected",
                    T::ENTITY_TYPE,
                    local.entity_id(),
                    local.version(),
                    current.version()
                )));
            }

            chosen.write_over(&tx, &current).await?;
            Ok((current, chosen))
        }
        .await;
        tx.finish(result).await
    }

    /// Put back the pre-resolution row after a failed push so the conflict
    /// stays resolvable. A row edited since `written` is left alone.
    async fn restore<T: Tracked>(&self, mut previous: T, written: &T) {
        let restored: Result<()> = async {
            let tx = self
                .ctx
                .store
                .transaction(&[Table::Decks, Table::Cards])
                .await?;
            let result: Result<()> = async {
                let Some(current) = tx.get::<T>(written.entity_id()).await? else {
                    return Ok(());
                };
                if current.version() == written.version() {
                    previous.write_over(&tx, &current).await?;
                }
                Ok(())
            }
            .await;
            tx.finish(result).await
        }
        .await;

        if let Err(error) = restored {
            tracing::warn!(
                "Failed to restore {} {} after push failure: {error}",
                T::ENTITY_TYPE,
                written.entity_id()
            );
        }
    }

    async fn mark_resolved(&self, id: &ConflictId) -> Result<()> {
        match self.ctx.store.mark_conflict_resolved(id).await {
            Ok(()) | Err(Error::NotFound { .. }) => Ok(()),
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::EntityRepository;
    use crate::models::{
        Card, CardPatch, Deck, DeckId, DeckPatch, EntityType, NewCard, NewDeck, SyncStatus,
    };
    use crate::remote::mock::MockRemote;
    use crate::sync::SyncEngine;
    use pretty_assertions::assert_eq;

    struct Fixture {
        repo: EntityRepository,
        engine: SyncEngine<MockRemote>,
    }

    async fn setup() -> Fixture {
        let store = LocalStore::open_in_memory().await.unwrap();
        Fixture {
            repo: EntityRepository::new(store.clone()),
            engine: SyncEngine::new(store, MockRemote::new()),
        }
    }

    /// Local deck at v2, remote at v3 with a different name and description
    async fn deck_conflict(fixture: &Fixture) -> SyncConflict {
        let mut local = fixture
            .repo
            .create_deck(NewDeck::named("Local name").with_tags(["mine"]))
            .await
            .unwrap();
        local.version = 2;
        local.last_synced_at = Some(1);
        fixture.repo.store().put(&local).await.unwrap();

        let mut remote = local.clone();
        remote.version = 3;
        remote.name = "Remote name".to_string();
        remote.description = Some("from the server".to_string());
        remote.tags = vec!["theirs".to_string()];
        fixture.engine.remote().insert_deck(remote);

        let result = fixture.engine.sync_all().await;
        assert_eq!(result.conflicts.len(), 1);
        result.conflicts[0].clone()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_merge_bumps_version_past_both_sides() {
        let fixture = setup().await;
        let conflict = deck_conflict(&fixture).await;
        let resolver = fixture.engine.resolver();

        let resolved = resolver
            .resolve_conflict(&conflict, ConflictResolution::Merge)
            .await
            .unwrap();

        let Entity::Deck(merged) = resolved else {
            panic!("expected a deck");
        };
        assert_eq!(merged.version, 4);
        assert_eq!(merged.sync_status, SyncStatus::Synced);
        assert_eq!(merged.name, "Local name");
        assert_eq!(merged.tags, vec!["mine".to_string()]);
        assert_eq!(merged.description.as_deref(), Some("from the server"));

        let stored = fixture.repo.get_deck(&merged.id).await.unwrap().unwrap();
        assert_eq!(stored, merged);
        assert_eq!(fixture.engine.remote().calls("update_deck"), 1);
        assert_eq!(fixture.engine.remote().deck(&merged.id).unwrap().version, 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remote_resolution_never_pushes() {
        let fixture = setup().await;
        let conflict = deck_conflict(&fixture).await;
        let Entity::Deck(remote) = conflict.remote_version.clone() else {
            panic!("expected a deck");
        };

        fixture
            .engine
            .resolver()
            .resolve_conflict(&conflict, ConflictResolution::Remote)
            .await
            .unwrap();

        assert_eq!(fixture.engine.remote().calls("update_deck"), 0);
        let stored = fixture.repo.get_deck(&remote.id).await.unwrap().unwrap();
        assert_eq!(stored.name, remote.name);
        assert_eq!(stored.description, remote.description);
        assert_eq!(stored.tags, remote.tags);
        assert_eq!(stored.version, remote.version);
        assert_eq!(stored.card_count, remote.card_count);
        assert_eq!(stored.sync_status, SyncStatus::Synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_local_resolution_pushes_local_snapshot() {
        let fixture = setup().await;
        let conflict = deck_conflict(&fixture).await;

        let resolved = fixture
            .engine
            .resolver()
            .resolve_conflict(&conflict, ConflictResolution::Local)
            .await
            .unwrap();

        assert_eq!(resolved.version(), 2);
        assert_eq!(resolved.sync_status(), SyncStatus::Synced);
        assert_eq!(fixture.engine.remote().calls("update_deck"), 1);

        let remaining = fixture.engine.store().list_conflicts(false).await.unwrap();
        assert!(remaining.is_empty());
        let all = fixture.engine.store().list_conflicts(true).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].resolved);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_push_restores_row_and_conflict_can_be_retried() {
        let fixture = setup().await;
        let conflict = deck_conflict(&fixture).await;
        let deck_id = conflict.entity_id.parse().unwrap();
        let before = fixture.repo.get_deck(&deck_id).await.unwrap().unwrap();
        fixture.engine.remote().fail("update_deck");
        let resolver = fixture.engine.resolver();

        let error = resolver
            .resolve_conflict(&conflict, ConflictResolution::Merge)
            .await
            .unwrap_err();

        assert_eq!(error.entity_type, EntityType::Deck);
        assert_eq!(error.entity_id.as_deref(), Some(conflict.entity_id.as_str()));
        let unresolved = fixture.engine.store().list_conflicts(false).await.unwrap();
        assert_eq!(unresolved.len(), 1);
        let stored = fixture.repo.get_deck(&deck_id).await.unwrap().unwrap();
        assert_eq!(stored, before);
        assert_eq!(stored.version, 2);
        assert_eq!(stored.sync_status, SyncStatus::Pending);

        fixture.engine.remote().recover("update_deck");
        let retried = resolver
            .resolve_conflict(&conflict, ConflictResolution::Merge)
            .await
            .unwrap();

        assert_eq!(retried.version(), 4);
        assert_eq!(retried.sync_status(), SyncStatus::Synced);
        assert_eq!(fixture.engine.remote().deck(&deck_id).unwrap().version, 4);
        assert!(fixture
            .engine
            .store()
            .list_conflicts(false)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stale_conflict_is_rejected() {
        let fixture = setup().await;
        let conflict = deck_conflict(&fixture).await;
        let deck_id = conflict.entity_id.parse().unwrap();
        fixture
            .repo
            .update_deck(
                &deck_id,
                DeckPatch {
                    name: Some("Edited again".to_string()),
                    ..DeckPatch::default()
                },
            )
            .await
            .unwrap();

        let result = fixture
            .engine
            .resolver()
            .resolve_conflict(&conflict, ConflictResolution::Remote)
            .await;

        assert!(result.is_err());
        let stored = fixture.repo.get_deck(&deck_id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Edited again");
        assert_eq!(stored.version, 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resolved_deck_keeps_local_card_count() {
        let fixture = setup().await;
        let conflict = deck_conflict(&fixture).await;
        let deck_id = conflict.entity_id.parse().unwrap();

        // The remote snapshot claims cards the local store does not have
        let mut conflict = conflict;
        if let Entity::Deck(remote) = &mut conflict.remote_version {
            remote.card_count = 40;
        }

        fixture
            .engine
            .resolver()
            .resolve_conflict(&conflict, ConflictResolution::Remote)
            .await
            .unwrap();

        let stored = fixture.repo.get_deck(&deck_id).await.unwrap().unwrap();
        assert_eq!(stored.card_count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_card_conflict_merge() {
        let fixture = setup().await;
        let deck = fixture
            .repo
            .create_deck(NewDeck::named("Deck"))
            .await
            .unwrap();
        let card = fixture
            .repo
            .create_card(NewCard::new(deck.id, "front", "back"))
            .await
            .unwrap();
        fixture.engine.sync_all().await;

        let local = fixture
            .repo
            .update_card(
                &card.id,
                CardPatch {
                    back: Some("local back".to_string()),
                    ..CardPatch::default()
                },
            )
            .await
            .unwrap();
        let mut remote = local.clone();
        remote.version = 5;
        remote.back = "remote back".to_string();
        remote.notes = Some("remote notes".to_string());
        fixture.engine.remote().insert_card(remote);

        let result = fixture.engine.sync_all().await;
        assert_eq!(result.conflicts.len(), 1);

        let Entity::Card(merged) = fixture
            .engine
            .resolver()
            .resolve_conflict(&result.conflicts[0], ConflictResolution::Merge)
            .await
            .unwrap()
        else {
            panic!("expected a card");
        };
        assert_eq!(merged.version, 6);
        assert_eq!(merged.back, "local back");
        assert_eq!(merged.notes.as_deref(), Some("remote notes"));
        assert_eq!(merged.sync_status, SyncStatus::Synced);
    }

    /// Card in `home` conflicting with a remote copy filed under `target`
    async fn card_conflict_moving_to(
        fixture: &Fixture,
        home: &Deck,
        target: DeckId,
    ) -> (Card, SyncConflict) {
        let card = fixture
            .repo
            .create_card(NewCard::new(home.id, "front", "back"))
            .await
            .unwrap();
        fixture.engine.sync_all().await;

        let local = fixture
            .repo
            .update_card(
                &card.id,
                CardPatch {
                    front: Some("local front".to_string()),
                    ..CardPatch::default()
                },
            )
            .await
            .unwrap();
        let mut remote = local.clone();
        remote.version = 9;
        remote.deck_id = target;
        fixture.engine.remote().insert_card(remote);

        let result = fixture.engine.sync_all().await;
        assert_eq!(result.conflicts.len(), 1);
        (local, result.conflicts[0].clone())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_card_moved_by_resolution_recounts_both_decks() {
        let fixture = setup().await;
        let home = fixture
            .repo
            .create_deck(NewDeck::named("Home"))
            .await
            .unwrap();
        let target = fixture
            .repo
            .create_deck(NewDeck::named("Target"))
            .await
            .unwrap();
        let (card, conflict) = card_conflict_moving_to(&fixture, &home, target.id).await;

        fixture
            .engine
            .resolver()
            .resolve_conflict(&conflict, ConflictResolution::Remote)
            .await
            .unwrap();

        let stored = fixture.repo.get_card(&card.id).await.unwrap().unwrap();
        assert_eq!(stored.deck_id, target.id);
        assert_eq!(stored.version, 9);

        let home_after = fixture.repo.get_deck(&home.id).await.unwrap().unwrap();
        let target_after = fixture.repo.get_deck(&target.id).await.unwrap().unwrap();
        assert_eq!(home_after.card_count, 0);
        assert_eq!(target_after.card_count, 1);
        assert!(fixture.repo.cards_by_deck(&home.id).await.unwrap().is_empty());
        assert_eq!(fixture.repo.cards_by_deck(&target.id).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_card_resolution_into_unknown_deck_fails() {
        let fixture = setup().await;
        let home = fixture
            .repo
            .create_deck(NewDeck::named("Home"))
            .await
            .unwrap();
        let (card, conflict) = card_conflict_moving_to(&fixture, &home, DeckId::new()).await;

        let result = fixture
            .engine
            .resolver()
            .resolve_conflict(&conflict, ConflictResolution::Remote)
            .await;

        assert!(result.is_err());
        let stored = fixture.repo.get_card(&card.id).await.unwrap().unwrap();
        assert_eq!(stored, card);
        let home_after = fixture.repo.get_deck(&home.id).await.unwrap().unwrap();
        assert_eq!(home_after.card_count, 1);
        assert_eq!(fixture.engine.store().list_conflicts(false).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resolve_by_id_and_clear() {
        let fixture = setup().await;
        let conflict = deck_conflict(&fixture).await;
        let resolver = fixture.engine.resolver();

        resolver
            .resolve_conflict_by_id(&conflict.id, ConflictResolution::Remote)
            .await
            .unwrap();

        let again = resolver
            .resolve_conflict_by_id(&conflict.id, ConflictResolution::Remote)
            .await;
        assert!(matches!(again, Err(Error::Validation(_))));

        assert_eq!(resolver.clear_resolved_conflicts().await.unwrap(), 1);
        assert!(resolver.list_conflicts(true).await.unwrap().is_empty());

        let missing = resolver
            .resolve_conflict_by_id(&ConflictId::new(), ConflictResolution::Local)
            .await;
        assert!(missing.unwrap_err().is_not_found());
    }
}
