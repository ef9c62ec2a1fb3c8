//! Background task that periodically flushes dirty collections.
//!
//! Every tick, each collection whose dirty flag is set is copied under its
//! lock and written out with the lock released. The flag is cleared before
//! the write and stays cleared if the write fails: changes made since the
//! last good save are then only retried once something marks the
//! collection dirty again. The sync token is written whenever it differs
//! from the value seen on the previous tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::collection::Collection;
use crate::cursor::SyncToken;
use crate::index::Record;
use crate::store::BridgeStore;

/// Name reported for the sync token in a [`FlushReport`].
pub const NEXT_BATCH: &str = "next_batch";

/// What a single tick wrote.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub saved: Vec<&'static str>,
    pub failed: Vec<&'static str>,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty() && self.failed.is_empty()
    }

    /// Number of save attempts made for `name` during the tick.
    pub fn attempts(&self, name: &str) -> usize {
        self.saved
            .iter()
            .chain(self.failed.iter())
            .filter(|n| **n == name)
            .count()
    }
}

pub struct SaveLoop {
    store: Arc<BridgeStore>,
    period: Duration,
    prev_next_batch: SyncToken,
}

impl SaveLoop {
    /// The token current at construction counts as already saved.
    pub fn new(store: Arc<BridgeStore>, period: Duration) -> Self {
        let prev_next_batch = store.next_batch();
        Self {
            store,
            period,
            prev_next_batch,
        }
    }

    /// Run the loop on the runtime until `stop` turns `true` or its sender
    /// is dropped.
    pub fn spawn(self, stop: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(stop))
    }

    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!(interval_secs = self.period.as_secs_f64(), "Starting save loop");

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*stop.borrow_and_update() {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        // Last chance for changes made since the previous tick.
        let report = self.tick().await;
        info!(saved = ?report.saved, failed = ?report.failed, "Save loop stopped");
    }

    /// Flush everything that changed since the previous tick.
    pub async fn tick(&mut self) -> FlushReport {
        let mut report = FlushReport::default();

        flush(self.store.users(), &mut report).await;
        flush(self.store.portals(), &mut report).await;
        flush(self.store.puppets(), &mut report).await;
        flush(self.store.messages(), &mut report).await;

        let current = self.store.next_batch();
        if current != self.prev_next_batch {
            match self.store.save_next_batch().await {
                Ok(_) => report.saved.push(NEXT_BATCH),
                Err(e) => {
                    warn!(error = %e, "Failed to write next batch token");
                    report.failed.push(NEXT_BATCH);
                }
            }
            self.prev_next_batch = current;
        }

        if !report.is_empty() {
            debug!(saved = ?report.saved, failed = ?report.failed, "Save loop tick");
        }
        report
    }
}

async fn flush<R: Record>(collection: &Collection<R>, report: &mut FlushReport) {
    if !collection.take_dirty() {
        return;
    }
    match collection.save().await {
        Ok(_) => report.saved.push(R::COLLECTION),
        Err(e) => {
            warn!(collection = R::COLLECTION, error = %e, "Failed to save collection");
            report.failed.push(R::COLLECTION);
        }
    }
}
