use crate::priority::CachePriority;
use crate::queue::EntryKind;

use std::fmt;
use std::sync::atomic::Ordering;

/// A scoped reservation of `(size, elements)` against the queue's limits.
///
/// Taken between candidate selection and finalization so no other thread
/// can claim the bytes that are about to be committed to an incoming entry.
/// Release is idempotent, and dropping an unreleased hold releases it --
/// including on unwind, which is what keeps capacity accounting correct on
/// cancelled and failing callers.
pub struct HoldSpace<'a> {
  priority: &'a CachePriority,
  size: u64,
  elements: u64,
  kind: EntryKind,
  released: bool,
}

impl<'a> HoldSpace<'a> {
  pub(crate) fn new(priority: &'a CachePriority, size: u64, elements: u64, kind: EntryKind) -> Self {
    priority.counters.kind(kind).add_held(size, elements);
    priority.metrics.holds_taken.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(size, elements, kind = %kind, "took capacity hold");
    Self {
      priority,
      size,
      elements,
      kind,
      released: false,
    }
  }

  #[inline]
  pub fn size(&self) -> u64 {
    self.size
  }

  #[inline]
  pub fn elements(&self) -> u64 {
    self.elements
  }

  #[inline]
  pub fn kind(&self) -> EntryKind {
    self.kind
  }

  /// Returns the held capacity. Calling it again is a no-op.
  pub fn release(&mut self) {
    if self.released {
      return;
    }
    self.released = true;
    self
      .priority
      .counters
      .kind(self.kind)
      .sub_held(self.size, self.elements);
    self
      .priority
      .metrics
      .holds_released
      .fetch_add(1, Ordering::Relaxed);
    tracing::trace!(size = self.size, elements = self.elements, "released capacity hold");
  }
}

impl Drop for HoldSpace<'_> {
  fn drop(&mut self) {
    self.release();
  }
}

impl fmt::Debug for HoldSpace<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("HoldSpace")
      .field("size", &self.size)
      .field("elements", &self.elements)
      .field("kind", &self.kind)
      .field("released", &self.released)
      .finish()
  }
}
