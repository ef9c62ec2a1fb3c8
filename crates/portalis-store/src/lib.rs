//! # portalis-store
//!
//! Durable state for the portalis bridge.
//!
//! Users, portals, puppets and bridged messages live in memory in one
//! [`Collection`] each, with their own lock. A background [`SaveLoop`] writes
//! every collection that changed since the previous tick to a compressed
//! snapshot file, replacing the old file atomically. At startup the
//! snapshots are merged back into the collections without replacing entity
//! handles that other parts of the bridge may already hold.

pub mod collection;
pub mod cursor;
pub mod dirty;
pub mod index;
pub mod models;
pub mod reconcile;
pub mod save_loop;
pub mod snapshot;
pub mod store;

mod error;

pub use collection::Collection;
pub use cursor::SyncToken;
pub use error::{Result, StoreError};
pub use index::{Entity, EntityIndex, Record};
pub use models::*;
pub use reconcile::ReconcileStats;
pub use save_loop::{FlushReport, SaveLoop};
pub use store::{BridgeStore, LoadSummary, StorePaths};
