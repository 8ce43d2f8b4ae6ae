use crate::cache::Cache;
use crate::error::BuildError;
use crate::metadata::{NullCleaner, SegmentCleaner};
use crate::priority::{CachePriority, Limits};
use crate::queue::lru::LruPriority;
use crate::queue::slru::SlruPriority;
use crate::queue::PriorityQueue;

use std::fmt;
use std::sync::Arc;

const DEFAULT_MAX_ELEMENTS: u64 = 10_000_000;

/// Which queue variant the cache runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PolicyKind {
  Lru,
  Slru { size_ratio: f64 },
}

/// A builder for creating [`Cache`] instances.
pub struct CacheBuilder {
  max_size: u64,
  max_elements: u64,
  policy: PolicyKind,
  cleaner: Option<Arc<dyn SegmentCleaner>>,
}

impl CacheBuilder {
  pub fn new() -> Self {
    Self {
      max_size: 0,
      max_elements: DEFAULT_MAX_ELEMENTS,
      policy: PolicyKind::Lru,
      cleaner: None,
    }
  }

  /// Sets the maximum total size of all cached segments, in bytes.
  pub fn max_size(mut self, max_size: u64) -> Self {
    self.max_size = max_size;
    self
  }

  /// Sets the maximum number of cached segments.
  pub fn max_elements(mut self, max_elements: u64) -> Self {
    self.max_elements = max_elements;
    self
  }

  /// Uses the plain LRU queue. This is the default.
  pub fn lru(mut self) -> Self {
    self.policy = PolicyKind::Lru;
    self
  }

  /// Uses the segmented LRU queue. `size_ratio` is the fraction of
  /// `max_size` reserved for the protected segment; must be in `(0, 1)`.
  pub fn slru(mut self, size_ratio: f64) -> Self {
    self.policy = PolicyKind::Slru { size_ratio };
    self
  }

  /// Sets the collaborator invoked to physically release evicted segments.
  /// Defaults to [`NullCleaner`].
  pub fn segment_cleaner<C>(mut self, cleaner: C) -> Self
  where
    C: SegmentCleaner + 'static,
  {
    self.cleaner = Some(Arc::new(cleaner));
    self
  }

  pub fn build(self) -> Result<Cache, BuildError> {
    self.validate()?;

    let (queue, size_ratio) = match self.policy {
      PolicyKind::Lru => (PriorityQueue::Lru(LruPriority::new()), 0.0),
      PolicyKind::Slru { size_ratio } => {
        (PriorityQueue::Slru(SlruPriority::new()), size_ratio)
      }
    };
    let limits = Limits {
      max_size: self.max_size,
      max_elements: self.max_elements,
      size_ratio,
    };
    let cleaner = self
      .cleaner
      .unwrap_or_else(|| Arc::new(NullCleaner));

    Ok(Cache::new(CachePriority::new(queue, limits), cleaner))
  }

  fn validate(&self) -> Result<(), BuildError> {
    if self.max_size == 0 {
      return Err(BuildError::ZeroCapacity);
    }
    if self.max_elements == 0 {
      return Err(BuildError::ZeroElements);
    }
    if let PolicyKind::Slru { size_ratio } = self.policy {
      if !(size_ratio > 0.0 && size_ratio < 1.0) {
        return Err(BuildError::InvalidSizeRatio(size_ratio));
      }
    }
    Ok(())
  }
}

impl Default for CacheBuilder {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for CacheBuilder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("max_size", &self.max_size)
      .field("max_elements", &self.max_elements)
      .field("policy", &self.policy)
      .field("has_cleaner", &self.cleaner.is_some())
      .finish()
  }
}
