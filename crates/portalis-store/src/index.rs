//! In-memory keyed storage for one entity type.
//!
//! Each [`EntityIndex`] owns a primary map and a secondary map behind a
//! single lock. Records are wrapped in [`Entity`] handles which the rest of
//! the bridge holds on to, so the index only ever swaps the record *inside*
//! a handle, never the handle itself.
//!
//! Lock order is index first, entity second. Never call into the index
//! while holding a guard returned by [`Entity::read`] or [`Entity::write`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Result, StoreError};

/// A record type that can live in an [`EntityIndex`].
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;
    type SecondaryKey: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// Collection name, used in logs.
    const COLLECTION: &'static str;

    fn key(&self) -> Self::Key;

    /// Secondary lookup key, present only when the underlying optional
    /// field is set.
    fn secondary_key(&self) -> Option<Self::SecondaryKey>;
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// Long-lived handle around a record.
#[derive(Debug)]
pub struct Entity<R> {
    record: RwLock<R>,
}

impl<R: Record> Entity<R> {
    pub fn new(record: R) -> Arc<Self> {
        Arc::new(Self {
            record: RwLock::new(record),
        })
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, R> {
        self.record.read().await
    }

    /// Mutable access to the record. If the secondary key changes, the
    /// entity must be passed to [`EntityIndex::put`] again afterwards.
    pub async fn write(&self) -> RwLockWriteGuard<'_, R> {
        self.record.write().await
    }

    /// Clone of the current record.
    pub async fn snapshot(&self) -> R {
        self.record.read().await.clone()
    }

    /// Swap in a new record, returning the old one.
    pub(crate) async fn replace(&self, record: R) -> R {
        std::mem::replace(&mut *self.record.write().await, record)
    }
}

// ---------------------------------------------------------------------------
// Maps
// ---------------------------------------------------------------------------

pub(crate) struct Maps<R: Record> {
    primary: HashMap<R::Key, Arc<Entity<R>>>,
    secondary: HashMap<R::SecondaryKey, Arc<Entity<R>>>,
    /// Secondary key each primary key is currently registered under.
    linked: HashMap<R::Key, R::SecondaryKey>,
}

impl<R: Record> Maps<R> {
    fn new() -> Self {
        Self {
            primary: HashMap::new(),
            secondary: HashMap::new(),
            linked: HashMap::new(),
        }
    }

    pub(crate) fn get(&self, key: &R::Key) -> Option<&Arc<Entity<R>>> {
        self.primary.get(key)
    }

    /// Register `entity` under `key`, and under `secondary` if present,
    /// dropping whatever secondary entry the key had before.
    pub(crate) fn link(
        &mut self,
        key: R::Key,
        secondary: Option<R::SecondaryKey>,
        entity: Arc<Entity<R>>,
    ) {
        let replaced = self.primary.insert(key.clone(), Arc::clone(&entity));

        if let Some(previous) = self.linked.remove(&key) {
            let owned = self.secondary.get(&previous).is_some_and(|e| {
                Arc::ptr_eq(e, &entity) || replaced.as_ref().is_some_and(|r| Arc::ptr_eq(e, r))
            });
            if owned {
                self.secondary.remove(&previous);
            }
        }

        if let Some(secondary) = secondary {
            self.secondary.insert(secondary.clone(), entity);
            self.linked.insert(key, secondary);
        }
    }

    fn unlink(&mut self, key: &R::Key) -> Option<Arc<Entity<R>>> {
        let entity = self.primary.remove(key)?;
        if let Some(previous) = self.linked.remove(key) {
            if self
                .secondary
                .get(&previous)
                .is_some_and(|e| Arc::ptr_eq(e, &entity))
            {
                self.secondary.remove(&previous);
            }
        }
        Some(entity)
    }
}

// ---------------------------------------------------------------------------
// EntityIndex
// ---------------------------------------------------------------------------

/// Primary and secondary lookup for one entity type.
pub struct EntityIndex<R: Record> {
    pub(crate) maps: RwLock<Maps<R>>,
}

impl<R: Record> EntityIndex<R> {
    pub fn new() -> Self {
        Self {
            maps: RwLock::new(Maps::new()),
        }
    }

    pub async fn get(&self, key: &R::Key) -> Option<Arc<Entity<R>>> {
        self.maps.read().await.primary.get(key).cloned()
    }

    pub async fn get_by_secondary(&self, key: &R::SecondaryKey) -> Option<Arc<Entity<R>>> {
        self.maps.read().await.secondary.get(key).cloned()
    }

    /// Return the entity for `key`, creating it from `make` if absent.
    /// The boolean is `true` when a new entity was created.
    pub async fn get_or_insert_with<F>(&self, key: &R::Key, make: F) -> (Arc<Entity<R>>, bool)
    where
        F: FnOnce() -> R,
    {
        let mut maps = self.maps.write().await;
        if let Some(existing) = maps.primary.get(key) {
            return (Arc::clone(existing), false);
        }
        let record = make();
        let secondary = record.secondary_key();
        let entity = Entity::new(record);
        maps.link(key.clone(), secondary, Arc::clone(&entity));
        (entity, true)
    }

    /// Insert or re-index an entity under its record's current keys.
    pub async fn put(&self, entity: Arc<Entity<R>>) {
        let (key, secondary) = {
            let record = entity.read().await;
            (record.key(), record.secondary_key())
        };
        self.maps.write().await.link(key, secondary, entity);
    }

    /// Apply `f` to the record stored under `key` and re-index the entity
    /// under its new keys, all under one index write lock.
    ///
    /// Moving the record onto a primary key held by another entity fails
    /// with [`StoreError::KeyConflict`] and leaves the record untouched.
    pub async fn modify<T, F>(&self, key: &R::Key, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut R) -> T,
    {
        let mut maps = self.maps.write().await;
        let Some(entity) = maps.primary.get(key).cloned() else {
            return Ok(None);
        };

        let mut record = entity.write().await;
        let mut next = record.clone();
        let out = f(&mut next);
        let new_key = next.key();

        if &new_key != key {
            if maps.primary.contains_key(&new_key) {
                return Err(StoreError::KeyConflict {
                    collection: R::COLLECTION,
                    key: format!("{new_key:?}"),
                });
            }
            maps.unlink(key);
        }

        let secondary = next.secondary_key();
        *record = next;
        drop(record);
        maps.link(new_key, secondary, entity);
        Ok(Some(out))
    }

    pub async fn remove(&self, key: &R::Key) -> Option<Arc<Entity<R>>> {
        self.maps.write().await.unlink(key)
    }

    /// Handles to every entity at the time of the call.
    pub async fn range(&self) -> Vec<Arc<Entity<R>>> {
        self.maps.read().await.primary.values().cloned().collect()
    }

    /// Copy of every record. Only the handles are collected under the index
    /// lock; each record is then cloned under its own lock, so a long-held
    /// entity guard delays the copy without stalling the collection.
    pub async fn records(&self) -> Vec<R> {
        let entities = self.range().await;
        let mut records = Vec::with_capacity(entities.len());
        for entity in entities {
            records.push(entity.snapshot().await);
        }
        records
    }

    pub async fn len(&self) -> usize {
        self.maps.read().await.primary.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.maps.read().await.primary.is_empty()
    }
}

impl<R: Record> Default for EntityIndex<R> {
    fn default() -> Self {
        Self::new()
    }
}
