use crate::error::ReserveError;
use crate::iter::PriorityIter;
use crate::metadata::LockedKey;
use crate::priority::PriorityLock;

use std::fmt;
use std::sync::atomic::Ordering;

struct Candidate {
  iter: PriorityIter,
  locked_key: LockedKey,
}

/// A staged set of entries chosen for eviction.
///
/// Every candidate carries its per-key lock for the whole selection window.
/// The set ends in exactly one of three ways: `finalize` commits the
/// removals, `rollback` abandons them, or the drop backstop clears the
/// `evicting` flags of anything left so an abandoned pass never wedges
/// entries in the restricted state.
pub struct EvictionCandidates {
  candidates: Vec<Candidate>,
}

impl EvictionCandidates {
  pub fn new() -> Self {
    Self {
      candidates: Vec::new(),
    }
  }

  pub(crate) fn push(&mut self, iter: PriorityIter, locked_key: LockedKey) {
    self.candidates.push(Candidate { iter, locked_key });
  }

  pub fn len(&self) -> usize {
    self.candidates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.candidates.is_empty()
  }

  /// The selected segments as `(key, offset, size)`, for the caller's
  /// unlocked per-entry cleanup.
  pub fn segments(&self) -> impl Iterator<Item = (crate::key::Key, u64, u64)> + '_ {
    self.candidates.iter().map(|candidate| {
      let entry = candidate.iter.entry();
      (entry.key(), entry.offset(), entry.size())
    })
  }

  /// Commits the eviction: removes every candidate from the queue and from
  /// its key's segment index, then clears the `evicting` flags.
  pub fn finalize(&mut self, lock: &mut PriorityLock<'_>) -> Result<(), ReserveError> {
    // Consume front to back; anything left on an error path is still
    // covered by the drop backstop.
    while !self.candidates.is_empty() {
      let mut candidate = self.candidates.remove(0);
      let entry = candidate.iter.entry().clone();
      if !entry.is_evicting() {
        return Err(ReserveError::LogicalError(
          "finalizing a candidate that lost its evicting mark",
        ));
      }

      let size = entry.size();
      candidate.iter.remove(lock);
      candidate.locked_key.remove_segment(entry.offset());
      entry.set_evicting(false, Some(&candidate.locked_key), Some(lock))?;

      lock.metrics().evicted_entries.fetch_add(1, Ordering::Relaxed);
      lock.metrics().evicted_bytes.fetch_add(size, Ordering::Relaxed);
      tracing::debug!(entry = %entry, "evicted entry");
    }
    Ok(())
  }

  /// Abandons the eviction: clears every `evicting` flag and releases the
  /// key locks. The entries stay where they were.
  pub fn rollback(&mut self, lock: &PriorityLock<'_>) {
    if self.candidates.is_empty() {
      return;
    }
    for candidate in self.candidates.drain(..) {
      let entry = candidate.iter.entry();
      if entry.is_evicting() {
        // Both locks are in hand, though either alone would do here.
        let _ = entry.set_evicting(false, Some(&candidate.locked_key), Some(lock));
      }
    }
    lock
      .metrics()
      .eviction_rollbacks
      .fetch_add(1, Ordering::Relaxed);
    tracing::debug!("rolled back eviction candidates");
  }
}

impl Drop for EvictionCandidates {
  fn drop(&mut self) {
    // Backstop for abandoned passes: the key lock alone is enough to clear
    // the flag.
    for candidate in self.candidates.drain(..) {
      let entry = candidate.iter.entry();
      if entry.is_evicting() {
        let _ = entry.set_evicting(false, Some(&candidate.locked_key), None);
      }
    }
  }
}

impl Default for EvictionCandidates {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for EvictionCandidates {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EvictionCandidates")
      .field("candidates", &self.candidates.len())
      .finish()
  }
}
