//! Per-entity serialization for push, pull and resolve

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::EntityType;

type LockKey = (EntityType, String);

/// Table of async mutexes keyed by entity.
///
/// Holding the guard from [`EntityLocks::lock`] keeps every other sync step
/// for that entity waiting. Idle entries are pruned on the next acquisition.
#[derive(Clone, Default)]
pub struct EntityLocks {
    table: Arc<Mutex<HashMap<LockKey, Arc<Mutex<()>>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, entity_type: EntityType, entity_id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut table = self.table.lock().await;
            table.retain(|_, entry| Arc::strong_count(entry) > 1);
            Arc::clone(
                table
                    .entry((entity_type, entity_id.to_string()))
                    .or_default(),
            )
        };
        entry.lock_owned().await
    }

    /// Number of entities currently tracked
    pub async fn tracked(&self) -> usize {
        self.table.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_same_entity_is_serialized() {
        let locks = EntityLocks::new();
        let guard = locks.lock(EntityType::Deck, "a").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(EntityType::Deck, "a").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_distinct_entities_do_not_block() {
        let locks = EntityLocks::new();
        let _deck = locks.lock(EntityType::Deck, "a").await;
        let _card = tokio::time::timeout(
            Duration::from_millis(100),
            locks.lock(EntityType::Card, "a"),
        )
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_released_entries_are_pruned() {
        let locks = EntityLocks::new();
        drop(locks.lock(EntityType::Deck, "a").await);
        drop(locks.lock(EntityType::Deck, "b").await);
        assert_eq!(locks.tracked().await, 1);
    }
}
