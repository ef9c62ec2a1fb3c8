//! Merging loaded snapshots into a live [`EntityIndex`].
//!
//! Handles that already exist keep their identity: only the record inside
//! is swapped, so sessions and handlers holding the `Arc` see the loaded
//! data instead of being detached from the index.

use std::sync::Arc;

use tracing::debug;

use crate::index::{Entity, EntityIndex, Maps, Record};

/// Outcome of one [`EntityIndex::reconcile`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Existing entities whose record was replaced in place.
    pub replaced: usize,
    /// Entities created for keys that were not in the index.
    pub inserted: usize,
}

impl<R: Record> EntityIndex<R> {
    /// Merge `records` into the index. The index lock is held for the whole
    /// merge, so readers see either none or all of it.
    pub async fn reconcile(&self, records: Vec<R>) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        let mut maps = self.maps.write().await;

        for record in records {
            let (_, created) = merge(&mut *maps, record).await;
            if created {
                stats.inserted += 1;
            } else {
                stats.replaced += 1;
            }
        }

        debug!(
            collection = R::COLLECTION,
            replaced = stats.replaced,
            inserted = stats.inserted,
            "Reconciled collection"
        );
        stats
    }

    /// Merge a single record, returning the handle that now holds it.
    pub async fn upsert(&self, record: R) -> Arc<Entity<R>> {
        let mut maps = self.maps.write().await;
        merge(&mut *maps, record).await.0
    }
}

async fn merge<R: Record>(maps: &mut Maps<R>, record: R) -> (Arc<Entity<R>>, bool) {
    let key = record.key();
    let secondary = record.secondary_key();

    match maps.get(&key).cloned() {
        Some(entity) => {
            entity.replace(record).await;
            maps.link(key, secondary, Arc::clone(&entity));
            (entity, false)
        }
        None => {
            let entity = Entity::new(record);
            maps.link(key, secondary, Arc::clone(&entity));
            (entity, true)
        }
    }
}
