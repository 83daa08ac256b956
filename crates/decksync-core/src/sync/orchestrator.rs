//! Two-phase sync run: push local changes, then pull remote additions

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::resolver::ConflictResolver;
use super::tracked::Tracked;
use super::{SyncContext, DEFAULT_REQUEST_TIMEOUT};
use crate::db::{LocalStore, PendingDeletion, Table};
use crate::error::{Error, Result};
use crate::models::{Card, Deck, EntityType, SyncConflict, SyncError, SyncResult, SyncStatus};
use crate::remote::RemoteApi;
use crate::util::now_millis;

/// What happened to one entity during a run
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// First push of a never-synced entity
    Created,
    /// Remote copy overwritten with the local one
    Updated,
    /// Tombstone delivered (or the remote copy was already gone)
    Deleted,
    /// Remote-only deck inserted locally
    Pulled,
    /// Remote moved ahead; local copy left untouched
    Conflict(Box<SyncConflict>),
}

type Outcome = std::result::Result<PushOutcome, SyncError>;

/// Fold per-entity outcomes into a run result
pub fn aggregate(outcomes: impl IntoIterator<Item = Outcome>) -> SyncResult {
    let mut result = SyncResult::default();
    for outcome in outcomes {
        match outcome {
            Ok(PushOutcome::Conflict(conflict)) => result.conflicts.push(*conflict),
            Ok(_) => result.synced += 1,
            Err(error) => result.errors.push(error),
        }
    }
    result.success = result.errors.is_empty();
    result
}

/// Requests cancellation of the engine's current run
#[derive(Debug, Clone)]
pub struct SyncHandle {
    cancelled: Arc<AtomicBool>,
}

impl SyncHandle {
    /// Stop the running sync after the entity currently being processed
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Clears the in-progress flag when a run ends, however it ends
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Reconciles the local store with a [`RemoteApi`]
pub struct SyncEngine<R> {
    ctx: SyncContext<R>,
    running: AtomicBool,
    cancelled: Arc<AtomicBool>,
    last_sync_at: AtomicI64,
}

impl<R: RemoteApi> SyncEngine<R> {
    pub fn new(store: LocalStore, remote: R) -> Self {
        Self {
            ctx: SyncContext {
                store,
                remote: Arc::new(remote),
                locks: super::EntityLocks::new(),
                request_timeout: DEFAULT_REQUEST_TIMEOUT,
            },
            running: AtomicBool::new(false),
            cancelled: Arc::new(AtomicBool::new(false)),
            last_sync_at: AtomicI64::new(0),
        }
    }

    /// Deadline applied to each remote call
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.ctx.request_timeout = timeout;
        self
    }

    pub fn remote(&self) -> &R {
        &self.ctx.remote
    }

    pub const fn store(&self) -> &LocalStore {
        &self.ctx.store
    }

    /// Handle for cancelling runs from elsewhere
    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// Resolver sharing this engine's store, remote and entity locks
    pub fn resolver(&self) -> ConflictResolver<R> {
        ConflictResolver::new(self.ctx.clone())
    }

    pub fn is_syncing(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Completion time (Unix ms) of the last finished run
    pub fn last_sync_at(&self) -> Option<i64> {
        match self.last_sync_at.load(Ordering::Acquire) {
            0 => None,
            at => Some(at),
        }
    }

    /// Push every unsynced deck and card, then pull remote-only decks.
    ///
    /// Never fails as a whole: per-entity failures land in `errors`, and a
    /// run-level failure (remote listing, cancellation, overlapping run) adds
    /// one error without an entity id next to whatever was already processed.
    pub async fn sync_all(&self) -> SyncResult {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            tracing::warn!("Sync requested while another run is in progress");
            return SyncResult::failed(SyncError::run_level(
                EntityType::Deck,
                Error::SyncInProgress.to_string(),
            ));
        };
        self.cancelled.store(false, Ordering::SeqCst);
        tracing::info!("Starting sync run");

        let mut outcomes = Vec::new();
        let aborted = self.run(&mut outcomes).await.err();

        let mut result = aggregate(outcomes);
        if let Some(error) = aborted {
            tracing::warn!("Sync run stopped early: {}", error.error);
            result.errors.push(error);
            result.success = false;
        }

        self.last_sync_at.store(now_millis(), Ordering::Release);
        tracing::info!(
            "Sync run finished: {} synced, {} conflict(s), {} error(s)",
            result.synced,
            result.conflicts.len(),
            result.errors.len()
        );
        result
    }

    async fn run(&self, outcomes: &mut Vec<Outcome>) -> std::result::Result<(), SyncError> {
        self.push_stream::<Deck>(outcomes).await?;
        self.push_stream::<Card>(outcomes).await?;
        self.pull_decks(outcomes).await
    }

    fn checkpoint(&self, entity_type: EntityType) -> std::result::Result<(), SyncError> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(SyncError::run_level(entity_type, Error::Cancelled.to_string()));
        }
        Ok(())
    }

    /// Phase A for one entity stream: tombstones first, then unsynced rows
    async fn push_stream<T: Tracked>(
        &self,
        outcomes: &mut Vec<Outcome>,
    ) -> std::result::Result<(), SyncError> {
        let run_error = |error: Error| SyncError::run_level(T::ENTITY_TYPE, error.to_string());

        let deletions = self
            .ctx
            .store
            .pending_deletions(T::ENTITY_TYPE)
            .await
            .map_err(run_error)?;
        for deletion in deletions {
            self.checkpoint(T::ENTITY_TYPE)?;
            outcomes.push(self.push_deletion::<T>(deletion).await);
        }

        let pending = self.ctx.store.unsynced::<T>().await.map_err(run_error)?;
        for entity in pending {
            self.checkpoint(T::ENTITY_TYPE)?;
            outcomes.push(self.push_entity(entity).await);
        }
        Ok(())
    }

    async fn push_entity<T: Tracked>(&self, local: T) -> Outcome {
        let key = local.entity_id().to_string();
        let _lock = self.ctx.locks.lock(T::ENTITY_TYPE, &key).await;

        self.push_locked(local).await.map_err(|error| {
            tracing::warn!("Failed to push {} {key}: {error}", T::ENTITY_TYPE);
            SyncError::for_entity(T::ENTITY_TYPE, &key, &error)
        })
    }

    async fn push_locked<T: Tracked>(&self, local: T) -> Result<PushOutcome> {
        let remote = &*self.ctx.remote;

        if local.last_synced_at().is_none() {
            tracing::debug!("Creating {} {} remotely", T::ENTITY_TYPE, local.entity_id());
            self.ctx.call(T::create_remote(remote, &local)).await?;
            self.mark_pushed(&local).await?;
            return Ok(PushOutcome::Created);
        }

        let remote_copy = self.ctx.call(T::fetch_remote(remote, local.entity_id())).await?;
        if remote_copy.version() > local.version() {
            tracing::warn!(
                "Conflict on {} {}: remote v{} is ahead of local v{}",
                T::ENTITY_TYPE,
                local.entity_id(),
                remote_copy.version(),
                local.version()
            );
            let conflict = SyncConflict::new(local.into_entity(), remote_copy.into_entity());
            self.ctx.store.record_conflict(&conflict).await?;
            return Ok(PushOutcome::Conflict(Box::new(conflict)));
        }

        tracing::debug!(
            "Updating {} {} remotely (local v{}, remote v{})",
            T::ENTITY_TYPE,
            local.entity_id(),
            local.version(),
            remote_copy.version()
        );
        self.ctx.call(T::update_remote(remote, &local)).await?;
        self.mark_pushed(&local).await?;
        Ok(PushOutcome::Updated)
    }

    /// Stamp the stored row after the remote accepted `pushed`.
    ///
    /// A row edited during the push keeps `pending`; a row deleted during the
    /// push gets a tombstone since the remote now holds a copy. Conflicts
    /// still open on the entity are settled by the accepted push.
    async fn mark_pushed<T: Tracked>(&self, pushed: &T) -> Result<()> {
        let tx = self
            .ctx
            .store
            .transaction(&[T::TABLE, Table::Deletions, Table::Conflicts])
            .await?;
        let result: Result<()> = async {
            let now = now_millis();
            let key = pushed.entity_id().to_string();
            match tx.get::<T>(pushed.entity_id()).await? {
                Some(mut current) => {
                    let up_to_date = current.version() == pushed.version();
                    current.record_push(now, up_to_date);
                    tx.put(&current).await?;
                }
                None => tx.record_deletion(T::ENTITY_TYPE, &key, now).await?,
            }

            let settled = tx.settle_conflicts(T::ENTITY_TYPE, &key).await?;
            if settled > 0 {
                tracing::debug!("Push of {} {key} settled {settled} conflict(s)", T::ENTITY_TYPE);
            }
            Ok(())
        }
        .await;
        tx.finish(result).await
    }

    async fn push_deletion<T: Tracked>(&self, deletion: PendingDeletion) -> Outcome {
        let key = deletion.entity_id;
        let _lock = self.ctx.locks.lock(T::ENTITY_TYPE, &key).await;

        let pushed: Result<()> = async {
            let id = T::parse_id(&key)?;
            match self.ctx.call(T::delete_remote(&*self.ctx.remote, &id)).await {
                Ok(()) => {}
                Err(error) if error.is_not_found() => {
                    tracing::debug!("{} {key} already absent remotely", T::ENTITY_TYPE);
                }
                Err(error) => return Err(error),
            }
            self.ctx.store.remove_deletion(T::ENTITY_TYPE, &key).await
        }
        .await;

        pushed.map(|()| PushOutcome::Deleted).map_err(|error| {
            tracing::warn!("Failed to delete {} {key} remotely: {error}", T::ENTITY_TYPE);
            SyncError::for_entity(T::ENTITY_TYPE, &key, &error)
        })
    }

    /// Phase B: insert remote decks the local store has never seen
    async fn pull_decks(&self, outcomes: &mut Vec<Outcome>) -> std::result::Result<(), SyncError> {
        let remote_decks = self
            .ctx
            .call(self.ctx.remote.get_all_decks())
            .await
            .map_err(|error| SyncError::run_level(EntityType::Deck, error.to_string()))?;

        for deck in remote_decks {
            self.checkpoint(EntityType::Deck)?;
            let key = deck.id.as_str();
            match self.pull_deck(deck).await {
                Ok(true) => outcomes.push(Ok(PushOutcome::Pulled)),
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!("Failed to pull deck {key}: {error}");
                    outcomes.push(Err(SyncError::for_entity(EntityType::Deck, &key, &error)));
                }
            }
        }
        Ok(())
    }

    /// Insert `remote` unless a local row or a pending tombstone exists
    async fn pull_deck(&self, mut remote: Deck) -> Result<bool> {
        let key = remote.id.as_str();
        let _lock = self.ctx.locks.lock(EntityType::Deck, &key).await;

        let tx = self
            .ctx
            .store
            .transaction(&[Table::Decks, Table::Cards, Table::Deletions])
            .await?;
        let result: Result<bool> = async {
            if tx.get::<Deck>(&remote.id).await?.is_some()
                || tx.has_pending_deletion(EntityType::Deck, &key).await?
            {
                return Ok(false);
            }

            remote.sync_status = SyncStatus::Synced;
            remote.last_synced_at = Some(now_millis());
            remote.card_count = tx.count_cards_in_deck(&remote.id).await?;
            tx.put(&remote).await?;
            tracing::debug!("Pulled deck {key}");
            Ok(true)
        }
        .await;
        tx.finish(result).await
    }
}
