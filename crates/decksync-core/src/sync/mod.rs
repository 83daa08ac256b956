//! Push/pull reconciliation with the remote deck service.
//!
//! [`SyncEngine`] runs the two-phase sync loop; [`ConflictResolver`] applies
//! a chosen resolution to a detected [`crate::models::SyncConflict`]. Both
//! share one [`LocalStore`], one remote gateway and one [`EntityLocks`] table
//! so that no two sync steps ever touch the same entity at once.

mod locks;
mod orchestrator;
mod resolver;
mod tracked;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use locks::EntityLocks;
pub use orchestrator::{aggregate, PushOutcome, SyncEngine, SyncHandle};
pub use resolver::ConflictResolver;
pub use tracked::Tracked;

use crate::db::LocalStore;
use crate::error::{Error, Result};

/// Default deadline for a single remote call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Collaborators shared by the engine and the resolver
struct SyncContext<R> {
    store: LocalStore,
    remote: Arc<R>,
    locks: EntityLocks,
    request_timeout: Duration,
}

impl<R> Clone for SyncContext<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            remote: Arc::clone(&self.remote),
            locks: self.locks.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

impl<R> SyncContext<R> {
    /// Await a remote call, failing with `Timeout` past the deadline
    async fn call<T>(&self, request: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.request_timeout, request)
            .await
            .unwrap_or_else(|_| {
                Err(Error::Timeout(format!(
                    "remote call did not finish within {} ms",
                    self.request_timeout.as_millis()
                )))
            })
    }
}
