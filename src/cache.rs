use crate::candidates::EvictionCandidates;
use crate::dump::PriorityDump;
use crate::error::ReserveError;
use crate::iter::PriorityIter;
use crate::key::{Key, UserInfo};
use crate::metadata::{KeyMetadata, KeyRegistry, LockedKey, SegmentCleaner};
use crate::metrics::MetricsSnapshot;
use crate::priority::{CachePriority, PriorityLock};
use crate::stat::ReserveStat;

use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Outcome of a successful reservation.
#[derive(Debug)]
pub enum Reservation {
  /// An entry for `(key, offset)` already existed. It was promoted, and
  /// grown if the requested size exceeded its current size.
  Existing(PriorityIter),
  /// A new entry was admitted.
  Added(PriorityIter),
}

impl Reservation {
  pub fn iter(&self) -> &PriorityIter {
    match self {
      Reservation::Existing(iter) | Reservation::Added(iter) => iter,
    }
  }
}

/// The file-segment cache engine: bookkeeping, priority, and eviction
/// selection for a bounded set of on-disk segments.
///
/// Physical storage stays with the caller; the engine calls back through
/// its [`SegmentCleaner`] when eviction frees a segment.
pub struct Cache {
  priority: CachePriority,
  registry: KeyRegistry,
  cleaner: Arc<dyn SegmentCleaner>,
}

impl Cache {
  pub(crate) fn new(priority: CachePriority, cleaner: Arc<dyn SegmentCleaner>) -> Self {
    Self {
      priority,
      registry: KeyRegistry::new(),
      cleaner,
    }
  }

  /// The priority structure. Lock it for direct queue-level operations.
  pub fn priority(&self) -> &CachePriority {
    &self.priority
  }

  /// The per-key metadata directory.
  pub fn registry(&self) -> &KeyRegistry {
    &self.registry
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.priority.metrics()
  }

  /// Snapshot of the queue for a cache-inspection endpoint.
  pub fn dump(&self) -> PriorityDump {
    self.priority.lock().dump()
  }

  /// Replaces the limits at runtime. Returns whether the queue already
  /// satisfies them.
  pub fn modify_size_limits(&self, max_size: u64, max_elements: u64, size_ratio: f64) -> bool {
    self
      .priority
      .lock()
      .modify_size_limits(max_size, max_elements, size_ratio)
  }

  /// Reserves `size` bytes for the segment `(key, offset)`.
  ///
  /// `size` is the full target size of the segment. If an entry already
  /// exists at an equal or larger size it is promoted and returned;
  /// otherwise the engine makes room -- evicting other entries if needed --
  /// and either grows the existing entry or admits a new one.
  pub fn reserve(
    &self,
    key: Key,
    offset: u64,
    size: u64,
    user: &UserInfo,
  ) -> Result<Reservation, ReserveError> {
    let result = self.try_reserve(key, offset, size, user);
    match result {
      Ok(_) => {
        self
          .priority
          .metrics
          .reservations
          .fetch_add(1, Ordering::Relaxed);
      }
      Err(_) => {
        self
          .priority
          .metrics
          .reservation_failures
          .fetch_add(1, Ordering::Relaxed);
      }
    }
    result
  }

  fn try_reserve(
    &self,
    key: Key,
    offset: u64,
    size: u64,
    user: &UserInfo,
  ) -> Result<Reservation, ReserveError> {
    if size == 0 {
      return Err(ReserveError::InvalidArgument("reservation size is zero"));
    }

    let metadata = self.registry.get_or_create(key);
    let mut locked_key = metadata.lock();

    if let Some(existing) = locked_key.segment(offset) {
      let current = existing.entry().size();
      if current >= size {
        let mut lock = self.priority.lock();
        existing.increase_priority(&mut lock);
        return Ok(Reservation::Existing(existing));
      }
      self.reserve_space(&mut locked_key, &metadata, offset, size, Some(&existing), user)?;
      return Ok(Reservation::Existing(existing));
    }

    let iter = self
      .reserve_space(&mut locked_key, &metadata, offset, size, None, user)?
      .ok_or(ReserveError::LogicalError(
        "reservation of a new segment produced no entry",
      ))?;
    Ok(Reservation::Added(iter))
  }

  /// Steps 2-8 of the reservation protocol: fit check, candidate
  /// collection, hold, unlocked cleanup, finalize, commit.
  fn reserve_space(
    &self,
    locked_key: &mut LockedKey,
    metadata: &Arc<KeyMetadata>,
    offset: u64,
    size: u64,
    reservee: Option<&PriorityIter>,
    user: &UserInfo,
  ) -> Result<Option<PriorityIter>, ReserveError> {
    let mut lock = self.priority.lock();

    if size > lock.size_limit() {
      return Err(ReserveError::NotEnoughSpaceEven);
    }
    if lock.can_fit(size, 1, reservee, false) {
      return self.commit(&mut lock, locked_key, metadata, offset, size, reservee, user);
    }

    let mut stat = ReserveStat::for_user(user.user_id.clone());
    let mut candidates = EvictionCandidates::new();
    let outcome = lock.collect_candidates_for_eviction(
      size,
      &mut stat,
      &mut candidates,
      reservee,
      &user.user_id,
    )?;
    if !outcome.satisfied {
      tracing::debug!(
        key = %metadata.key(),
        offset,
        size,
        user = %user.user_id,
        releasable = stat.total.releasable_size,
        pinned = stat.total.non_releasable_size,
        "reservation failed: {}",
        lock.state_info_for_log()
      );
      return Err(ReserveError::NotEnoughSpaceEven);
    }

    let mut hold = self.priority.take_hold(size, 1, lock.default_kind(), &lock);
    drop(lock);

    // Slow per-segment cleanup happens without the cache lock.
    let cleaned: io::Result<()> = candidates
      .segments()
      .try_for_each(|(victim_key, victim_offset, victim_size)| {
        self
          .cleaner
          .remove_segment(victim_key, victim_offset, victim_size)
      });

    let mut lock = self.priority.lock();
    if let Err(err) = cleaned {
      candidates.rollback(&lock);
      hold.release();
      return Err(ReserveError::Cleanup(err));
    }

    candidates.finalize(&mut lock)?;
    // The hold has done its job once the freed capacity is committed; the
    // entry admitted below takes over the accounting.
    hold.release();
    self.commit(&mut lock, locked_key, metadata, offset, size, reservee, user)
  }

  fn commit(
    &self,
    lock: &mut PriorityLock<'_>,
    locked_key: &mut LockedKey,
    metadata: &Arc<KeyMetadata>,
    offset: u64,
    size: u64,
    reservee: Option<&PriorityIter>,
    user: &UserInfo,
  ) -> Result<Option<PriorityIter>, ReserveError> {
    match reservee {
      Some(iter) => {
        let delta = size.saturating_sub(iter.entry().size());
        if delta > 0 {
          iter.increment_size(delta, lock)?;
        }
        Ok(None)
      }
      None => {
        let iter = lock.add(metadata.clone(), offset, size, user, false)?;
        locked_key.insert_segment(offset, iter.clone());
        Ok(Some(iter))
      }
    }
  }

  /// Re-admits a segment while rebuilding state from on-disk metadata.
  /// Tolerates a soft-limit overshoot; the first regular reservations will
  /// trigger eviction back under the limits.
  pub fn restore(
    &self,
    key: Key,
    offset: u64,
    size: u64,
    user: &UserInfo,
  ) -> Result<PriorityIter, ReserveError> {
    if size == 0 {
      return Err(ReserveError::InvalidArgument("restored size is zero"));
    }
    let metadata = self.registry.get_or_create(key);
    let mut locked_key = metadata.lock();
    if locked_key.segment(offset).is_some() {
      return Err(ReserveError::InvalidArgument("segment restored twice"));
    }
    let mut lock = self.priority.lock();
    let iter = lock.add(metadata.clone(), offset, size, user, true)?;
    locked_key.insert_segment(offset, iter.clone());
    Ok(iter)
  }

  /// Forgets a key: its handles become tombstones and the key leaves the
  /// directory. Queue entries are reclaimed by later eviction passes.
  /// Returns the number of segments invalidated.
  pub fn invalidate_key(&self, key: Key) -> usize {
    let Some(metadata) = self.registry.remove(key) else {
      return 0;
    };
    let mut locked_key = metadata.lock();
    let segments = locked_key.segment_count();
    locked_key.invalidate_all();
    tracing::debug!(key = %key, segments, "invalidated key");
    segments
  }
}

impl std::fmt::Debug for Cache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Cache")
      .field("priority", &self.priority)
      .field("keys", &self.registry.len())
      .finish_non_exhaustive()
  }
}
