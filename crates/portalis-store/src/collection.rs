//! A persisted entity collection: index, dirty flag and snapshot path.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::dirty::DirtyFlag;
use crate::error::Result;
use crate::index::{Entity, EntityIndex, Record};
use crate::reconcile::ReconcileStats;
use crate::snapshot;

pub struct Collection<R: Record> {
    index: EntityIndex<R>,
    dirty: DirtyFlag,
    path: PathBuf,
}

impl<R: Record> Collection<R> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            index: EntityIndex::new(),
            dirty: DirtyFlag::new(),
            path,
        }
    }

    // -- Accessors ----------------------------------------------------------

    pub async fn get(&self, key: &R::Key) -> Option<Arc<Entity<R>>> {
        self.index.get(key).await
    }

    pub async fn get_by_secondary(&self, key: &R::SecondaryKey) -> Option<Arc<Entity<R>>> {
        self.index.get_by_secondary(key).await
    }

    /// Look up `key`, creating and registering a fresh record if absent.
    pub async fn get_or_create<F>(&self, key: &R::Key, make: F) -> Arc<Entity<R>>
    where
        F: FnOnce() -> R,
    {
        let (entity, created) = self.index.get_or_insert_with(key, make).await;
        if created {
            debug!(collection = R::COLLECTION, key = ?key, "Created entity");
            self.mark_dirty();
        }
        entity
    }

    /// Register an entity (or re-index it after its secondary key changed).
    pub async fn put(&self, entity: Arc<Entity<R>>) {
        self.index.put(entity).await;
        self.mark_dirty();
    }

    /// Store `record`, reusing the existing handle for its key if any.
    pub async fn upsert(&self, record: R) -> Arc<Entity<R>> {
        let entity = self.index.upsert(record).await;
        self.mark_dirty();
        entity
    }

    /// Mutate the record stored under `key` and re-index it. `Ok(None)`
    /// when nothing is stored under `key`.
    pub async fn update<T, F>(&self, key: &R::Key, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut R) -> T,
    {
        let out = self.index.modify(key, f).await?;
        if out.is_some() {
            self.mark_dirty();
        }
        Ok(out)
    }

    pub async fn remove(&self, key: &R::Key) -> Option<Arc<Entity<R>>> {
        let removed = self.index.remove(key).await;
        if removed.is_some() {
            self.mark_dirty();
        }
        removed
    }

    pub async fn range(&self) -> Vec<Arc<Entity<R>>> {
        self.index.range().await
    }

    pub async fn len(&self) -> usize {
        self.index.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.index.is_empty().await
    }

    // -- Dirty tracking -----------------------------------------------------

    /// Flag unsaved changes. Callers mutating an entity through
    /// [`Entity::write`] directly must call this themselves.
    pub fn mark_dirty(&self) {
        self.dirty.mark();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_set()
    }

    pub(crate) fn take_dirty(&self) -> bool {
        self.dirty.take()
    }

    // -- Persistence --------------------------------------------------------

    /// Read the snapshot from disk and merge it into the index.
    pub async fn load(&self) -> Result<ReconcileStats> {
        let path = self.path.clone();
        let records = tokio::task::spawn_blocking(move || snapshot::load::<R>(&path)).await??;
        let count = records.len();
        let stats = self.index.reconcile(records).await;

        info!(
            collection = R::COLLECTION,
            path = %self.path.display(),
            records = count,
            "Loaded collection"
        );
        Ok(stats)
    }

    /// Copy the records, then write the snapshot on the blocking pool.
    /// Returns the number of records written.
    pub async fn save(&self) -> Result<usize> {
        debug!(collection = R::COLLECTION, "Saving collection");
        let records = self.index.records().await;
        let count = records.len();

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || snapshot::save(&path, &records)).await??;

        debug!(collection = R::COLLECTION, records = count, "Collection saved");
        Ok(count)
    }
}
