use std::sync::atomic::{AtomicBool, Ordering};

/// Set when a collection has unsaved changes.
///
/// Any number of [`mark`](Self::mark) calls between two
/// [`take`](Self::take) calls collapse into a single pending save.
#[derive(Debug, Default)]
pub struct DirtyFlag(AtomicBool);

impl DirtyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}
