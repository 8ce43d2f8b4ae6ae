use crate::error::ReserveError;
use crate::key::Key;
use crate::metadata::{KeyMetadata, LockedKey};
use crate::priority::PriorityLock;
use crate::queue::EntryKind;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// A single tracked file segment.
///
/// Identity (`key`, `offset`) is immutable. `size` may grow while more of
/// the segment is downloaded and may shrink lock-free. `hits` is only ever
/// touched while the cache lock is held.
pub struct CacheEntry {
  key: Key,
  offset: u64,
  key_metadata: Arc<KeyMetadata>,
  size: AtomicU64,
  hits: AtomicU64,
  // Which sub-queue currently owns the entry. Routes lock-free size
  // decrements to the right per-kind counter.
  kind: AtomicU8,
  evicting: AtomicBool,
}

impl CacheEntry {
  pub(crate) fn new(
    key: Key,
    offset: u64,
    size: u64,
    key_metadata: Arc<KeyMetadata>,
    kind: EntryKind,
  ) -> Self {
    Self {
      key,
      offset,
      key_metadata,
      size: AtomicU64::new(size),
      hits: AtomicU64::new(0),
      kind: AtomicU8::new(kind.index() as u8),
      evicting: AtomicBool::new(false),
    }
  }

  #[inline]
  pub fn key(&self) -> Key {
    self.key
  }

  #[inline]
  pub fn offset(&self) -> u64 {
    self.offset
  }

  #[inline]
  pub fn key_metadata(&self) -> &Arc<KeyMetadata> {
    &self.key_metadata
  }

  #[inline]
  pub fn size(&self) -> u64 {
    self.size.load(Ordering::Acquire)
  }

  /// Hit count. Monotone; bumped under the cache lock on promotion.
  #[inline]
  pub fn hits(&self) -> u64 {
    self.hits.load(Ordering::Relaxed)
  }

  #[inline]
  pub fn kind(&self) -> EntryKind {
    EntryKind::from_index(self.kind.load(Ordering::Relaxed))
  }

  /// The load is atomic, so possession of either lock is enough here.
  #[inline]
  pub fn is_evicting(&self) -> bool {
    self.evicting.load(Ordering::Acquire)
  }

  pub(crate) fn set_kind(&self, kind: EntryKind) {
    self.kind.store(kind.index() as u8, Ordering::Relaxed);
  }

  pub(crate) fn add_size(&self, delta: u64) {
    self.size.fetch_add(delta, Ordering::AcqRel);
  }

  pub(crate) fn sub_size(&self, delta: u64) {
    let previous = self.size.fetch_sub(delta, Ordering::AcqRel);
    debug_assert!(previous >= delta, "segment size underflow");
  }

  pub(crate) fn add_hit(&self) -> u64 {
    self.hits.fetch_add(1, Ordering::Relaxed) + 1
  }

  /// Flips the `evicting` flag.
  ///
  /// Setting it to `true` requires both the cache lock and the entry's key
  /// lock; clearing it requires only one of the two. The asymmetry is part
  /// of the eviction protocol: a cleared flag can only widen what concurrent
  /// passes are allowed to select, never narrow it.
  pub(crate) fn set_evicting(
    &self,
    value: bool,
    locked_key: Option<&LockedKey>,
    cache_lock: Option<&PriorityLock<'_>>,
  ) -> Result<(), ReserveError> {
    if value && (locked_key.is_none() || cache_lock.is_none()) {
      return Err(ReserveError::LogicalError(
        "marking an entry as evicting requires both the cache lock and the key lock",
      ));
    }
    if !value && locked_key.is_none() && cache_lock.is_none() {
      return Err(ReserveError::LogicalError(
        "clearing the evicting flag requires the cache lock or the key lock",
      ));
    }
    debug_assert_ne!(self.evicting.load(Ordering::Acquire), value);
    self.evicting.store(value, Ordering::Release);
    Ok(())
  }
}

impl fmt::Display for CacheEntry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}:{}", self.key, self.offset, self.size())
  }
}

impl fmt::Debug for CacheEntry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheEntry")
      .field("key", &self.key)
      .field("offset", &self.offset)
      .field("size", &self.size())
      .field("hits", &self.hits())
      .field("kind", &self.kind())
      .field("evicting", &self.is_evicting())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::metadata::KeyMetadata;

  fn entry() -> CacheEntry {
    let key = Key::new(42);
    CacheEntry::new(key, 128, 1024, KeyMetadata::new(key), EntryKind::Probationary)
  }

  #[test]
  fn size_moves_both_ways() {
    let entry = entry();
    entry.add_size(512);
    assert_eq!(entry.size(), 1536);
    entry.sub_size(1000);
    assert_eq!(entry.size(), 536);
  }

  #[test]
  fn set_evicting_true_demands_both_locks() {
    let entry = entry();
    let err = entry.set_evicting(true, None, None).unwrap_err();
    assert!(matches!(err, ReserveError::LogicalError(_)));
    assert!(!entry.is_evicting());
  }

  #[test]
  fn display_is_key_offset_size() {
    let entry = entry();
    let text = entry.to_string();
    assert!(text.ends_with(":128:1024"), "got {text}");
  }
}
