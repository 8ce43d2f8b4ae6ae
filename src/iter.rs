use crate::entry::CacheEntry;
use crate::error::ReserveError;
use crate::priority::{Counters, PriorityLock};
use crate::queue::EntryKind;

use generational_arena::Index;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct IterInner {
  entry: Arc<CacheEntry>,
  index: Index,
  counters: Arc<Counters>,
  invalidated: AtomicBool,
}

/// A stable handle to an entry inside the priority structure.
///
/// Handles are weak in the sense that the underlying entry may be removed
/// underneath them; queue operations through a stale handle are no-ops.
/// Clones share one tombstone flag.
#[derive(Clone)]
pub struct PriorityIter {
  inner: Arc<IterInner>,
}

impl PriorityIter {
  pub(crate) fn new(entry: Arc<CacheEntry>, index: Index, counters: Arc<Counters>) -> Self {
    Self {
      inner: Arc::new(IterInner {
        entry,
        index,
        counters,
        invalidated: AtomicBool::new(false),
      }),
    }
  }

  /// A shared handle to the entry. Still readable after invalidation.
  #[inline]
  pub fn entry(&self) -> &Arc<CacheEntry> {
    &self.inner.entry
  }

  #[inline]
  pub fn kind(&self) -> EntryKind {
    self.inner.entry.kind()
  }

  #[inline]
  pub fn is_invalidated(&self) -> bool {
    self.inner.invalidated.load(Ordering::Acquire)
  }

  pub(crate) fn index(&self) -> Index {
    self.inner.index
  }

  /// Marks the handle dead without touching the queue. Used when the owning
  /// key is destroyed from the per-key side; the queue entry is reclaimed by
  /// a later eviction pass.
  pub fn invalidate(&self) {
    self.inner.invalidated.store(true, Ordering::Release);
  }

  /// Promotes the entry under the owning queue's policy and returns its new
  /// hit count. No-op while the entry is marked evicting or the handle is
  /// stale.
  pub fn increase_priority(&self, lock: &mut PriorityLock<'_>) -> u64 {
    lock.increase_priority(self)
  }

  /// Grows the entry. Requires the cache lock because growth can push the
  /// queue into eviction pressure.
  pub fn increment_size(&self, delta: u64, lock: &mut PriorityLock<'_>) -> Result<(), ReserveError> {
    lock.increment_size(self, delta)
  }

  /// Shrinks the entry without the cache lock. Downward motion never
  /// violates the limits.
  ///
  /// Callers own the entry's lifecycle: a decrement must not race removal of
  /// the same entry.
  pub fn decrement_size(&self, delta: u64) {
    if delta == 0 || self.is_invalidated() {
      return;
    }
    let entry = &self.inner.entry;
    let kind = entry.kind();
    entry.sub_size(delta);
    self.inner.counters.kind(kind).sub_size(delta);
  }

  /// Unlinks the entry from the queue and turns this handle into a
  /// tombstone.
  pub fn remove(&self, lock: &mut PriorityLock<'_>) {
    lock.remove(self);
  }

  pub(crate) fn mark_removed(&self) {
    self.inner.invalidated.store(true, Ordering::Release);
  }
}

impl fmt::Debug for PriorityIter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PriorityIter")
      .field("entry", &self.inner.entry)
      .field("invalidated", &self.is_invalidated())
      .finish()
  }
}
