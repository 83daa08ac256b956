//! Keyed, indexed local store shared by the repository and the sync engine

use std::path::Path;
use std::sync::Arc;

use libsql::Connection;
use tokio::sync::{Mutex, MutexGuard};

use super::ledger::{self, PendingDeletion};
use super::rows::{self, Index, IndexValue, StoredEntity, Table};
use super::Database;
use crate::error::{Error, Result};
use crate::models::{ConflictId, EntityType, SyncConflict};

struct StoreState {
    db: Database,
    /// Set when a transaction guard was dropped without commit or rollback
    dirty: bool,
}

/// Handle to the local database.
///
/// Cloning is cheap; all clones share one connection and serialize on it.
#[derive(Clone)]
pub struct LocalStore {
    state: Arc<Mutex<StoreState>>,
}

impl LocalStore {
    /// Wrap an already opened database
    pub fn new(db: Database) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState { db, dirty: false })),
        }
    }

    /// Open (and migrate) a store file at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path).await?))
    }

    /// Open an in-memory store (primarily for tests)
    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory().await?))
    }

    async fn lock(&self) -> MutexGuard<'_, StoreState> {
        let mut state = self.state.lock().await;
        if state.dirty {
            tracing::warn!("Rolling back transaction abandoned without commit");
            state.db.connection().execute("ROLLBACK", ()).await.ok();
            state.dirty = false;
        }
        state
    }

    /// Fetch a row by primary key
    pub async fn get<E: StoredEntity>(&self, id: &E::Id) -> Result<Option<E>> {
        let state = self.lock().await;
        rows::get(state.db.connection(), &id.to_string()).await
    }

    /// Insert or replace a row (tags included) atomically
    pub async fn put<E: StoredEntity>(&self, entity: &E) -> Result<()> {
        let tx = self.transaction(&[E::TABLE]).await?;
        let result = tx.put(entity).await;
        tx.finish(result).await
    }

    /// Delete a row; fails with `NotFound` when absent
    pub async fn delete<E: StoredEntity>(&self, id: &E::Id) -> Result<()> {
        let tx = self.transaction(&[E::TABLE]).await?;
        let result = tx.delete::<E>(id).await;
        tx.finish(result).await
    }

    /// All rows matching `value` on `index`, in insertion order
    pub async fn query_by_index<E: StoredEntity>(
        &self,
        index: Index,
        value: impl Into<IndexValue>,
    ) -> Result<Vec<E>> {
        let state = self.lock().await;
        rows::query_by_index(state.db.connection(), index, value.into()).await
    }

    pub async fn all<E: StoredEntity>(&self) -> Result<Vec<E>> {
        let state = self.lock().await;
        rows::all(state.db.connection()).await
    }

    /// Rows whose sync status is not `synced`
    pub async fn unsynced<E: StoredEntity>(&self) -> Result<Vec<E>> {
        let state = self.lock().await;
        rows::unsynced(state.db.connection()).await
    }

    pub async fn count_cards_in_deck(&self, deck_id: &crate::models::DeckId) -> Result<u32> {
        let state = self.lock().await;
        rows::count_cards(state.db.connection(), &deck_id.as_str()).await
    }

    /// Begin a transaction scoped to `tables`.
    ///
    /// The guard holds the store for its whole lifetime. Writes commit together
    /// on [`StoreTransaction::commit`]; a guard dropped without commit is rolled
    /// back before the store is used again.
    pub async fn transaction(&self, tables: &[Table]) -> Result<StoreTransaction<'_>> {
        if tables.is_empty() {
            return Err(Error::Validation(
                "transaction must name at least one table".to_string(),
            ));
        }

        let state = self.lock().await;
        state
            .db
            .connection()
            .execute("BEGIN IMMEDIATE", ())
            .await?;

        Ok(StoreTransaction {
            state,
            tables: tables.to_vec(),
            finished: false,
        })
    }

    pub async fn record_conflict(&self, conflict: &SyncConflict) -> Result<()> {
        let tx = self.transaction(&[Table::Conflicts]).await?;
        let result = ledger::record_conflict(tx.conn(), conflict).await;
        tx.finish(result).await
    }

    pub async fn get_conflict(&self, id: &ConflictId) -> Result<Option<SyncConflict>> {
        let state = self.lock().await;
        ledger::get_conflict(state.db.connection(), id).await
    }

    pub async fn list_conflicts(&self, include_resolved: bool) -> Result<Vec<SyncConflict>> {
        let state = self.lock().await;
        ledger::list_conflicts(state.db.connection(), include_resolved).await
    }

    /// Mark a persisted conflict resolved; fails with `NotFound` when absent
    pub async fn mark_conflict_resolved(&self, id: &ConflictId) -> Result<()> {
        let state = self.lock().await;
        if ledger::mark_conflict_resolved(state.db.connection(), id).await? {
            Ok(())
        } else {
            Err(Error::NotFound {
                entity: "Conflict",
                id: id.to_string(),
            })
        }
    }

    /// Drop resolved conflicts; returns how many were removed
    pub async fn clear_resolved_conflicts(&self) -> Result<u64> {
        let state = self.lock().await;
        ledger::clear_resolved_conflicts(state.db.connection()).await
    }

    pub async fn pending_deletions(&self, entity_type: EntityType) -> Result<Vec<PendingDeletion>> {
        let state = self.lock().await;
        ledger::pending_deletions(state.db.connection(), entity_type).await
    }

    pub async fn remove_deletion(&self, entity_type: EntityType, entity_id: &str) -> Result<()> {
        let state = self.lock().await;
        ledger::remove_deletion(state.db.connection(), entity_type, entity_id).await
    }
}

/// Open transaction over a fixed set of tables
pub struct StoreTransaction<'a> {
    state: MutexGuard<'a, StoreState>,
    tables: Vec<Table>,
    finished: bool,
}

impl StoreTransaction<'_> {
    fn conn(&self) -> &Connection {
        self.state.db.connection()
    }

    fn check_scope(&self, table: Table) -> Result<()> {
        if self.tables.contains(&table) {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "table '{}' is not part of this transaction",
                table.name()
            )))
        }
    }

    pub async fn get<E: StoredEntity>(&self, id: &E::Id) -> Result<Option<E>> {
        self.check_scope(E::TABLE)?;
        rows::get(self.conn(), &id.to_string()).await
    }

    /// Like [`Self::get`] but a missing row is an error
    pub async fn require<E: StoredEntity>(&self, id: &E::Id) -> Result<E> {
        self.get(id).await?.ok_or_else(|| Error::NotFound {
            entity: E::KIND,
            id: id.to_string(),
        })
    }

    pub async fn put<E: StoredEntity>(&self, entity: &E) -> Result<()> {
        self.check_scope(E::TABLE)?;
        rows::upsert(self.conn(), entity).await
    }

    /// Delete a row; fails with `NotFound` when absent
    pub async fn delete<E: StoredEntity>(&self, id: &E::Id) -> Result<()> {
        self.check_scope(E::TABLE)?;
        if rows::delete::<E>(self.conn(), &id.to_string()).await? {
            Ok(())
        } else {
            Err(Error::NotFound {
                entity: E::KIND,
                id: id.to_string(),
            })
        }
    }

    pub async fn query_by_index<E: StoredEntity>(
        &self,
        index: Index,
        value: impl Into<IndexValue>,
    ) -> Result<Vec<E>> {
        self.check_scope(E::TABLE)?;
        rows::query_by_index(self.conn(), index, value.into()).await
    }

    pub async fn count_cards_in_deck(&self, deck_id: &crate::models::DeckId) -> Result<u32> {
        self.check_scope(Table::Cards)?;
        rows::count_cards(self.conn(), &deck_id.as_str()).await
    }

    pub async fn record_deletion(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        deleted_at: i64,
    ) -> Result<()> {
        self.check_scope(Table::Deletions)?;
        ledger::record_deletion(self.conn(), entity_type, entity_id, deleted_at).await
    }

    pub async fn has_pending_deletion(&self, entity_type: EntityType, entity_id: &str) -> Result<bool> {
        self.check_scope(Table::Deletions)?;
        let pending = ledger::pending_deletions(self.conn(), entity_type).await?;
        Ok(pending.iter().any(|deletion| deletion.entity_id == entity_id))
    }

    pub async fn remove_deletion(&self, entity_type: EntityType, entity_id: &str) -> Result<()> {
        self.check_scope(Table::Deletions)?;
        ledger::remove_deletion(self.conn(), entity_type, entity_id).await
    }

    /// Mark the entity's open conflicts resolved
    pub async fn settle_conflicts(&self, entity_type: EntityType, entity_id: &str) -> Result<u64> {
        self.check_scope(Table::Conflicts)?;
        ledger::resolve_open_conflicts(self.conn(), entity_type, entity_id).await
    }

    pub async fn commit(mut self) -> Result<()> {
        self.finished = true;
        if let Err(error) = self.conn().execute("COMMIT", ()).await {
            self.conn().execute("ROLLBACK", ()).await.ok();
            return Err(error.into());
        }
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn().execute("ROLLBACK", ()).await?;
        Ok(())
    }

    /// Commit on `Ok`, roll back on `Err`, and pass the result through
    pub async fn finish<T>(self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = self.rollback().await {
                    tracing::warn!("Rollback failed: {rollback_error}");
                }
                Err(error)
            }
        }
    }
}

impl Drop for StoreTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.state.dirty = true;
        }
    }
}
