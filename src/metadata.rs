use crate::iter::PriorityIter;
use crate::key::Key;

use ahash::HashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::fmt;
use std::io;
use std::sync::Arc;

/// The external collaborator that physically releases a segment's storage.
///
/// Invoked without the cache lock held, after candidates have been selected
/// and marked. A failure aborts the reservation; bookkeeping is rolled back
/// by the caller.
pub trait SegmentCleaner: Send + Sync {
  fn remove_segment(&self, key: Key, offset: u64, size: u64) -> io::Result<()>;
}

/// A cleaner that releases nothing. Useful for tests and for callers that
/// drive physical cleanup out of band.
#[derive(Debug, Default)]
pub struct NullCleaner;

impl SegmentCleaner for NullCleaner {
  fn remove_segment(&self, _key: Key, _offset: u64, _size: u64) -> io::Result<()> {
    Ok(())
  }
}

impl<T: SegmentCleaner + ?Sized> SegmentCleaner for Arc<T> {
  fn remove_segment(&self, key: Key, offset: u64, size: u64) -> io::Result<()> {
    self.as_ref().remove_segment(key, offset, size)
  }
}

/// Per-key mutable state: the offset-indexed segment handles.
#[derive(Default)]
pub(crate) struct KeyState {
  pub(crate) segments: HashMap<u64, PriorityIter>,
}

/// Per-key metadata owning the key's mutable segment index.
///
/// The engine stores a shared handle to this in every entry and demands its
/// lock token for restricted transitions.
pub struct KeyMetadata {
  key: Key,
  state: Arc<Mutex<KeyState>>,
}

impl KeyMetadata {
  pub fn new(key: Key) -> Arc<Self> {
    Arc::new(Self {
      key,
      state: Arc::new(Mutex::new(KeyState::default())),
    })
  }

  #[inline]
  pub fn key(&self) -> Key {
    self.key
  }

  /// Blocks until the per-key lock is held.
  pub fn lock(&self) -> LockedKey {
    LockedKey {
      key: self.key,
      guard: Mutex::lock_arc(&self.state),
    }
  }

  /// Non-blocking acquisition.
  ///
  /// Candidate selection runs while the cache lock is held, and key locks
  /// are ordered before the cache lock everywhere else; taking one here must
  /// therefore never wait.
  pub fn try_lock(&self) -> Option<LockedKey> {
    Mutex::try_lock_arc(&self.state).map(|guard| LockedKey {
      key: self.key,
      guard,
    })
  }
}

impl fmt::Debug for KeyMetadata {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("KeyMetadata").field("key", &self.key).finish()
  }
}

/// An owned per-key lock token.
///
/// Possession proves the holder may perform per-key transitions; the engine
/// never acquires this itself on restricted paths, it only demands it.
pub struct LockedKey {
  key: Key,
  guard: ArcMutexGuard<RawMutex, KeyState>,
}

impl LockedKey {
  #[inline]
  pub fn key(&self) -> Key {
    self.key
  }

  /// The handle registered for a segment offset, if any.
  pub fn segment(&self, offset: u64) -> Option<PriorityIter> {
    self.guard.segments.get(&offset).cloned()
  }

  pub fn segment_count(&self) -> usize {
    self.guard.segments.len()
  }

  pub(crate) fn insert_segment(&mut self, offset: u64, iter: PriorityIter) {
    let previous = self.guard.segments.insert(offset, iter);
    debug_assert!(previous.is_none(), "segment registered twice");
  }

  pub(crate) fn remove_segment(&mut self, offset: u64) -> Option<PriorityIter> {
    self.guard.segments.remove(&offset)
  }

  /// Tears down every handle of this key without touching the queue.
  /// Used when the key is destroyed from the metadata side; queue entries
  /// are reclaimed by later eviction passes.
  pub fn invalidate_all(&mut self) {
    for iter in self.guard.segments.values() {
      iter.invalidate();
    }
    self.guard.segments.clear();
  }
}

impl fmt::Debug for LockedKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LockedKey")
      .field("key", &self.key)
      .field("segments", &self.guard.segments.len())
      .finish()
  }
}

/// The key-indexed directory of per-key metadata.
pub struct KeyRegistry {
  keys: Mutex<HashMap<Key, Arc<KeyMetadata>>>,
}

impl KeyRegistry {
  pub(crate) fn new() -> Self {
    Self {
      keys: Mutex::new(HashMap::default()),
    }
  }

  pub fn get_or_create(&self, key: Key) -> Arc<KeyMetadata> {
    self
      .keys
      .lock()
      .entry(key)
      .or_insert_with(|| KeyMetadata::new(key))
      .clone()
  }

  pub fn get(&self, key: Key) -> Option<Arc<KeyMetadata>> {
    self.keys.lock().get(&key).cloned()
  }

  /// Drops the key from the directory. Live entries keep their metadata
  /// handle through the back-reference; the directory simply forgets it.
  pub fn remove(&self, key: Key) -> Option<Arc<KeyMetadata>> {
    self.keys.lock().remove(&key)
  }

  pub fn len(&self) -> usize {
    self.keys.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.keys.lock().is_empty()
  }
}

impl fmt::Debug for KeyRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("KeyRegistry")
      .field("keys", &self.len())
      .finish()
  }
}
