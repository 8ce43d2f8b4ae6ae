pub(crate) mod list;
pub(crate) mod lru;
pub(crate) mod slru;

use std::fmt;
use std::sync::Arc;

use crate::entry::CacheEntry;
use crate::queue::lru::LruPriority;
use crate::queue::slru::SlruPriority;

use generational_arena::Index;

/// Tag identifying which sub-queue an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntryKind {
  /// The single queue of the plain LRU variant.
  Lru,
  /// The probationary segment of the SLRU variant. New entries start here.
  Probationary,
  /// The protected segment of the SLRU variant.
  Protected,
}

impl EntryKind {
  pub(crate) const COUNT: usize = 3;

  #[inline]
  pub(crate) fn index(self) -> usize {
    match self {
      EntryKind::Lru => 0,
      EntryKind::Probationary => 1,
      EntryKind::Protected => 2,
    }
  }

  #[inline]
  pub(crate) fn from_index(index: u8) -> EntryKind {
    match index {
      0 => EntryKind::Lru,
      1 => EntryKind::Probationary,
      _ => EntryKind::Protected,
    }
  }
}

impl fmt::Display for EntryKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EntryKind::Lru => write!(f, "lru"),
      EntryKind::Probationary => write!(f, "probationary"),
      EntryKind::Protected => write!(f, "protected"),
    }
  }
}

/// Decision returned by the callback of an eviction-order walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IterationDecision {
  Continue,
  Break,
}

/// The ordered collection of entries. Variants differ in promotion policy
/// and in the order eviction candidates are drawn.
pub(crate) enum PriorityQueue {
  Lru(LruPriority),
  Slru(SlruPriority),
}

impl PriorityQueue {
  /// The kind newly added entries are tagged with.
  pub(crate) fn default_kind(&self) -> EntryKind {
    match self {
      PriorityQueue::Lru(_) => EntryKind::Lru,
      PriorityQueue::Slru(_) => EntryKind::Probationary,
    }
  }

  /// Inserts an entry at the most-recently-used end of its starting queue
  /// and returns a stable handle to the node.
  pub(crate) fn insert(&mut self, entry: Arc<CacheEntry>) -> Index {
    match self {
      PriorityQueue::Lru(queue) => queue.insert(entry),
      PriorityQueue::Slru(queue) => queue.insert(entry),
    }
  }

  /// Removes a node, returning its entry. Stale indices return `None`.
  pub(crate) fn remove(&mut self, index: Index) -> Option<Arc<CacheEntry>> {
    match self {
      PriorityQueue::Lru(queue) => queue.remove(index),
      PriorityQueue::Slru(queue) => queue.remove(index),
    }
  }

  /// Moves the node to the MRU end of the segment it is already in.
  pub(crate) fn refresh(&mut self, index: Index) -> bool {
    match self {
      PriorityQueue::Lru(queue) => queue.refresh(index),
      PriorityQueue::Slru(queue) => queue.refresh(index),
    }
  }

  /// Moves a probationary node to the protected MRU end. Returns the moved
  /// entry, or `None` if the node is stale or already protected (in which
  /// case the plain LRU variant and protected entries get a `refresh`).
  pub(crate) fn promote(&mut self, index: Index) -> Option<Arc<CacheEntry>> {
    match self {
      PriorityQueue::Lru(_) => None,
      PriorityQueue::Slru(queue) => queue.promote(index),
    }
  }

  /// Demotes the protected LRU tail to the probationary MRU end.
  pub(crate) fn demote_lru(&mut self) -> Option<Arc<CacheEntry>> {
    match self {
      PriorityQueue::Lru(_) => None,
      PriorityQueue::Slru(queue) => queue.demote_lru(),
    }
  }

  /// Walks entries in eviction order (victims first) until the callback
  /// breaks or the queues are exhausted.
  pub(crate) fn for_each_in_eviction_order(
    &self,
    f: &mut dyn FnMut(Index, &Arc<CacheEntry>) -> IterationDecision,
  ) {
    match self {
      PriorityQueue::Lru(queue) => queue.for_each_in_eviction_order(f),
      PriorityQueue::Slru(queue) => queue.for_each_in_eviction_order(f),
    }
  }

  /// Randomizes queue order. Used for testing.
  pub(crate) fn shuffle(&mut self, rng: &mut dyn rand::RngCore) {
    match self {
      PriorityQueue::Lru(queue) => queue.shuffle(rng),
      PriorityQueue::Slru(queue) => queue.shuffle(rng),
    }
  }

  pub(crate) fn len(&self) -> usize {
    match self {
      PriorityQueue::Lru(queue) => queue.len(),
      PriorityQueue::Slru(queue) => queue.len(),
    }
  }
}
