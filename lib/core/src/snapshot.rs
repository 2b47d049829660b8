use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use crate::{Error, Result};

/// Holder for an immutable index snapshot.
///
/// Readers take the shared lock only long enough to clone the `Arc`; the query
/// itself runs against that snapshot with no lock held. Writers build the
/// replacement off to the side and swap it in with a single pointer store, so
/// a query in flight always sees one complete version of the data.
pub struct SnapshotCell<T> {
    current: RwLock<Option<Arc<T>>>,
    writer: Mutex<()>,
    generation: AtomicU64,
}

impl<T> SnapshotCell<T> {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            writer: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Current snapshot, or `EmptyIndex` if nothing was ever published
    #[inline]
    pub fn load(&self) -> Result<Arc<T>> {
        self.current.read().clone().ok_or(Error::EmptyIndex)
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    /// Publish a new snapshot. Returns the new generation number.
    pub fn publish(&self, snapshot: T) -> u64 {
        let _writer = self.writer.lock();
        self.swap_in(snapshot)
    }

    /// Build a replacement from the current snapshot and publish it.
    ///
    /// Writers are serialized by a separate mutex, so `f` runs without
    /// holding the reader lock; readers only wait for the final pointer store.
    pub fn update<F>(&self, f: F) -> Result<u64>
    where
        F: FnOnce(Option<&T>) -> Result<T>,
    {
        let _writer = self.writer.lock();
        let base = self.current.read().clone();
        let next = f(base.as_deref())?;
        Ok(self.swap_in(next))
    }

    fn swap_in(&self, snapshot: T) -> u64 {
        let snapshot = Arc::new(snapshot);
        *self.current.write() = Some(snapshot);
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Number of snapshots published so far
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl<T> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new()
    }
}
