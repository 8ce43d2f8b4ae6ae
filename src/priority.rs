use crate::candidates::EvictionCandidates;
use crate::dump::{EntryDump, PriorityDump};
use crate::entry::CacheEntry;
use crate::error::ReserveError;
use crate::hold::HoldSpace;
use crate::iter::PriorityIter;
use crate::key::UserInfo;
use crate::metadata::KeyMetadata;
use crate::metrics::{Metrics, MetricsSnapshot, Occupancy};
use crate::queue::{EntryKind, IterationDecision, PriorityQueue};
use crate::stat::ReserveStat;

use crossbeam_utils::CachePadded;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Capacity accounting for one queue entry kind.
///
/// Entry totals move under the cache lock except for size decrements, which
/// are lock-free. The size counter is signed: a lock-free shrink racing a
/// segment transfer can briefly land on the segment the entry just left,
/// driving one counter negative and the peer high by the same amount. The
/// sum is conserved in every interleaving and each counter is exact once
/// quiescent; reads clamp at zero. Held amounts are charged by
/// [`HoldSpace`] and released without any lock.
pub(crate) struct KindCounters {
  size: CachePadded<AtomicI64>,
  elements: CachePadded<AtomicU64>,
  held_size: CachePadded<AtomicU64>,
  held_elements: CachePadded<AtomicU64>,
}

impl KindCounters {
  fn new() -> Self {
    Self {
      size: CachePadded::new(AtomicI64::new(0)),
      elements: CachePadded::new(AtomicU64::new(0)),
      held_size: CachePadded::new(AtomicU64::new(0)),
      held_elements: CachePadded::new(AtomicU64::new(0)),
    }
  }

  #[inline]
  pub(crate) fn size(&self) -> u64 {
    self.size.load(Ordering::Acquire).max(0) as u64
  }

  #[inline]
  pub(crate) fn elements(&self) -> u64 {
    self.elements.load(Ordering::Acquire)
  }

  pub(crate) fn add_size(&self, delta: u64) {
    self.size.fetch_add(delta as i64, Ordering::AcqRel);
  }

  pub(crate) fn sub_size(&self, delta: u64) {
    self.size.fetch_sub(delta as i64, Ordering::AcqRel);
  }

  fn add_element(&self) {
    self.elements.fetch_add(1, Ordering::AcqRel);
  }

  fn sub_element(&self) {
    let previous = self.elements.fetch_sub(1, Ordering::AcqRel);
    debug_assert!(previous >= 1, "kind element counter underflow");
  }

  pub(crate) fn add_held(&self, size: u64, elements: u64) {
    self.held_size.fetch_add(size, Ordering::AcqRel);
    self.held_elements.fetch_add(elements, Ordering::AcqRel);
  }

  pub(crate) fn sub_held(&self, size: u64, elements: u64) {
    let previous_size = self.held_size.fetch_sub(size, Ordering::AcqRel);
    let previous_elements = self.held_elements.fetch_sub(elements, Ordering::AcqRel);
    debug_assert!(previous_size >= size && previous_elements >= elements, "hold underflow");
  }
}

/// Per-kind counters plus the derived global totals.
pub(crate) struct Counters {
  kinds: [KindCounters; EntryKind::COUNT],
}

impl Counters {
  fn new() -> Self {
    Self {
      kinds: [KindCounters::new(), KindCounters::new(), KindCounters::new()],
    }
  }

  #[inline]
  pub(crate) fn kind(&self, kind: EntryKind) -> &KindCounters {
    &self.kinds[kind.index()]
  }

  pub(crate) fn total_size(&self) -> u64 {
    self.kinds.iter().map(|c| c.size()).sum()
  }

  pub(crate) fn total_elements(&self) -> u64 {
    self.kinds.iter().map(|c| c.elements()).sum()
  }

  pub(crate) fn held_size(&self) -> u64 {
    self
      .kinds
      .iter()
      .map(|c| c.held_size.load(Ordering::Acquire))
      .sum()
  }

  pub(crate) fn held_elements(&self) -> u64 {
    self
      .kinds
      .iter()
      .map(|c| c.held_elements.load(Ordering::Acquire))
      .sum()
  }
}

/// The configured limits. `size_ratio` is only meaningful for SLRU.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
  pub(crate) max_size: u64,
  pub(crate) max_elements: u64,
  pub(crate) size_ratio: f64,
}

impl Limits {
  pub(crate) fn max_protected_size(&self) -> u64 {
    (self.max_size as f64 * self.size_ratio).floor() as u64
  }
}

struct PriorityState {
  queue: PriorityQueue,
  limits: Limits,
}

struct FitCheck {
  ok: bool,
  fits_size: bool,
  fits_elements: bool,
}

/// The capacity check everything funnels through.
///
/// Holds count as used capacity. `slack_*` is the reservee's current
/// footprint (already accounted in the totals, hence available to a request
/// replacing it). `freed_*` is what selected eviction candidates would give
/// back.
fn fits(
  counters: &Counters,
  limits: &Limits,
  size: u64,
  elements: u64,
  slack_size: u64,
  slack_elements: u64,
  freed_size: u64,
  freed_elements: u64,
  best_effort: bool,
) -> FitCheck {
  let used_size = (counters.total_size() as u128 + counters.held_size() as u128)
    .saturating_sub(freed_size as u128);
  let used_elements = (counters.total_elements() as u128 + counters.held_elements() as u128)
    .saturating_sub(freed_elements as u128);

  let fits_size = used_size + size as u128 <= limits.max_size as u128 + slack_size as u128;
  let fits_elements =
    used_elements + elements as u128 <= limits.max_elements as u128 + slack_elements as u128;

  let ok = if best_effort {
    fits_size || fits_elements
  } else {
    fits_size && fits_elements
  };
  FitCheck {
    ok,
    fits_size,
    fits_elements,
  }
}

/// Result of a candidate-collection pass.
#[derive(Debug, Clone, Copy)]
pub struct EvictionOutcome {
  /// Whether the selected candidates would satisfy the request.
  pub satisfied: bool,
  /// The byte limit was binding when selection started.
  pub reached_size_limit: bool,
  /// The element limit was binding when selection started.
  pub reached_elements_limit: bool,
}

/// The priority structure and its single global lock.
///
/// All structural operations go through [`CachePriority::lock`]; the
/// returned [`PriorityLock`] is the capability token the rest of the API
/// demands. Approximate getters read the atomic counters without the lock.
pub struct CachePriority {
  state: Mutex<PriorityState>,
  pub(crate) counters: Arc<Counters>,
  pub(crate) metrics: Metrics,
}

impl CachePriority {
  pub(crate) fn new(queue: PriorityQueue, limits: Limits) -> Self {
    Self {
      state: Mutex::new(PriorityState { queue, limits }),
      counters: Arc::new(Counters::new()),
      metrics: Metrics::new(),
    }
  }

  /// Acquires the global cache lock, returning the locked operation surface.
  pub fn lock(&self) -> PriorityLock<'_> {
    PriorityLock {
      state: self.state.lock(),
      priority: self,
    }
  }

  /// Bytes in use, readable without the lock. Pessimistic: includes
  /// outstanding holds and may briefly overstate, never understate.
  pub fn size_approx(&self) -> u64 {
    self.counters.total_size().saturating_add(self.counters.held_size())
  }

  /// Element count without the lock; pessimistic, like [`Self::size_approx`].
  pub fn elements_count_approx(&self) -> u64 {
    self
      .counters
      .total_elements()
      .saturating_add(self.counters.held_elements())
  }

  /// Charges `(size, elements)` against the limits as if entries of `kind`
  /// existed, without creating any. Constructed under the lock; released on
  /// drop on every exit path.
  pub fn take_hold(
    &self,
    size: u64,
    elements: u64,
    kind: EntryKind,
    _lock: &PriorityLock<'_>,
  ) -> HoldSpace<'_> {
    HoldSpace::new(self, size, elements, kind)
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.metrics.snapshot(Occupancy {
      size: self.counters.total_size(),
      elements: self.counters.total_elements(),
      held_size: self.counters.held_size(),
      held_elements: self.counters.held_elements(),
    })
  }
}

impl std::fmt::Debug for CachePriority {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CachePriority")
      .field("size", &self.counters.total_size())
      .field("elements", &self.counters.total_elements())
      .finish_non_exhaustive()
  }
}

/// The locked view of the priority structure.
///
/// Operations taking `&mut PriorityLock` are exactly the ones the design
/// requires the global lock for; possession of this value is the proof.
pub struct PriorityLock<'a> {
  state: MutexGuard<'a, PriorityState>,
  priority: &'a CachePriority,
}

impl<'a> PriorityLock<'a> {
  pub fn size(&self) -> u64 {
    self.priority.counters.total_size()
  }

  pub fn elements_count(&self) -> u64 {
    self.priority.counters.total_elements()
  }

  pub fn size_limit(&self) -> u64 {
    self.state.limits.max_size
  }

  pub fn elements_limit(&self) -> u64 {
    self.state.limits.max_elements
  }

  /// The kind new entries are tagged with (`Lru`, or `Probationary` for
  /// SLRU).
  pub fn default_kind(&self) -> EntryKind {
    self.state.queue.default_kind()
  }

  pub(crate) fn metrics(&self) -> &Metrics {
    &self.priority.metrics
  }

  /// Whether `(size, elements)` fits under the limits right now.
  ///
  /// With a `reservee`, the capacity its entry already occupies counts as
  /// available: the request is re-reserving that entry at a new size. In
  /// `best_effort` mode one of the two limits may be violated; callers use
  /// it only on paths that go on to evict.
  pub fn can_fit(
    &self,
    size: u64,
    elements: u64,
    reservee: Option<&PriorityIter>,
    best_effort: bool,
  ) -> bool {
    let (slack_size, slack_elements) = reservee_slack(reservee);
    fits(
      &self.priority.counters,
      &self.state.limits,
      size,
      elements,
      slack_size,
      slack_elements,
      0,
      0,
      best_effort,
    )
    .ok
  }

  /// Adds a new entry at the default priority position.
  ///
  /// With `best_effort` the insert succeeds even over the soft limit; used
  /// while rebuilding state from on-disk metadata during recovery.
  pub fn add(
    &mut self,
    key_metadata: Arc<KeyMetadata>,
    offset: u64,
    size: u64,
    user: &UserInfo,
    best_effort: bool,
  ) -> Result<PriorityIter, ReserveError> {
    if size == 0 {
      return Err(ReserveError::InvalidArgument("cannot add a zero-sized entry"));
    }
    if !self.can_fit(size, 1, None, false) {
      if best_effort {
        tracing::warn!(
          key = %key_metadata.key(),
          offset,
          size,
          "admitting entry over the configured limits during recovery"
        );
      } else {
        return Err(ReserveError::NotEnoughSpace);
      }
    }

    let kind = self.state.queue.default_kind();
    let entry = Arc::new(CacheEntry::new(
      key_metadata.key(),
      offset,
      size,
      key_metadata,
      kind,
    ));
    let index = self.state.queue.insert(entry.clone());

    let counters = &self.priority.counters;
    counters.kind(kind).add_size(size);
    counters.kind(kind).add_element();
    self
      .priority
      .metrics
      .entries_added
      .fetch_add(1, Ordering::Relaxed);
    tracing::trace!(entry = %entry, user = %user.user_id, kind = %kind, "added entry");

    Ok(PriorityIter::new(entry, index, counters.clone()))
  }

  /// Promotes an entry under the queue's policy and returns its new hit
  /// count. No-op for stale handles and for entries marked evicting.
  pub(crate) fn increase_priority(&mut self, iter: &PriorityIter) -> u64 {
    let entry = iter.entry().clone();
    if iter.is_invalidated() || entry.is_evicting() {
      return entry.hits();
    }

    let index = iter.index();
    let max_protected = self.state.limits.max_protected_size();
    let moved = match entry.kind() {
      // An entry larger than the whole protected budget stays probationary;
      // promoting it would only demote it straight back.
      EntryKind::Probationary if entry.size() <= max_protected => {
        match self.state.queue.promote(index) {
          Some(promoted) => {
            let size = promoted.size();
            let counters = &self.priority.counters;
            // Credit the destination before debiting the source so unlocked
            // approximate readers never observe a dip.
            counters.kind(EntryKind::Protected).add_size(size);
            counters.kind(EntryKind::Protected).add_element();
            counters.kind(EntryKind::Probationary).sub_size(size);
            counters.kind(EntryKind::Probationary).sub_element();
            self
              .priority
              .metrics
              .promotions
              .fetch_add(1, Ordering::Relaxed);
            self.rebalance_protected(max_protected);
            true
          }
          None => self.state.queue.refresh(index),
        }
      }
      _ => self.state.queue.refresh(index),
    };

    if !moved {
      return entry.hits();
    }
    entry.add_hit()
  }

  /// Demotes protected tails until the protected segment fits its budget.
  fn rebalance_protected(&mut self, max_protected: u64) {
    while self.priority.counters.kind(EntryKind::Protected).size() > max_protected {
      let Some(demoted) = self.state.queue.demote_lru() else {
        break;
      };
      let size = demoted.size();
      let counters = &self.priority.counters;
      counters.kind(EntryKind::Probationary).add_size(size);
      counters.kind(EntryKind::Probationary).add_element();
      counters.kind(EntryKind::Protected).sub_size(size);
      counters.kind(EntryKind::Protected).sub_element();
      self
        .priority
        .metrics
        .demotions
        .fetch_add(1, Ordering::Relaxed);
      tracing::trace!(entry = %demoted, "demoted protected tail");
    }
  }

  pub(crate) fn increment_size(
    &mut self,
    iter: &PriorityIter,
    delta: u64,
  ) -> Result<(), ReserveError> {
    if delta == 0 || iter.is_invalidated() {
      return Ok(());
    }
    let entry = iter.entry();
    if entry.is_evicting() {
      return Err(ReserveError::LogicalError(
        "cannot grow an entry selected for eviction",
      ));
    }
    if !self.can_fit(delta, 0, Some(iter), false) {
      return Err(ReserveError::NotEnoughSpace);
    }
    entry.add_size(delta);
    self.priority.counters.kind(entry.kind()).add_size(delta);
    Ok(())
  }

  /// Unlinks the entry and tombstones the handle. Totals drop by the
  /// entry's current footprint.
  pub(crate) fn remove(&mut self, iter: &PriorityIter) {
    iter.mark_removed();
    if let Some(entry) = self.state.queue.remove(iter.index()) {
      let size = entry.size();
      let counters = &self.priority.counters;
      counters.kind(entry.kind()).sub_size(size);
      counters.kind(entry.kind()).sub_element();
      self
        .priority
        .metrics
        .entries_removed
        .fetch_add(1, Ordering::Relaxed);
      tracing::trace!(entry = %entry, "removed entry");
    }
  }

  /// Walks the queue in eviction order selecting enough victims to make
  /// `size` bytes (and one slot) fit.
  ///
  /// Skipped and never selected: entries already marked evicting, entries
  /// of the reservee's key, and entries whose key lock cannot be taken
  /// without blocking. On success every selected entry is flagged evicting
  /// under both this lock and its key lock, and `out` carries the handles
  /// plus the key locks until finalize or rollback.
  pub fn collect_candidates_for_eviction(
    &mut self,
    size: u64,
    stat: &mut ReserveStat,
    out: &mut EvictionCandidates,
    reservee: Option<&PriorityIter>,
    user_id: &str,
  ) -> Result<EvictionOutcome, ReserveError> {
    let limits = self.state.limits;
    let counters = self.priority.counters.clone();
    let reservee_key = reservee.map(|iter| iter.entry().key());
    let (slack_size, slack_elements) = reservee_slack(reservee);

    let initial = fits(&counters, &limits, size, 1, slack_size, slack_elements, 0, 0, false);
    let reached_size_limit = !initial.fits_size;
    let reached_elements_limit = !initial.fits_elements;
    let mut satisfied = initial.ok;

    let mut selected = Vec::new();
    if !satisfied {
      let mut freed_size = 0u64;
      let mut freed_elements = 0u64;
      self.state.queue.for_each_in_eviction_order(&mut |index, entry| {
        if entry.is_evicting() {
          stat.record(entry.kind(), entry.size(), false);
          return IterationDecision::Continue;
        }
        if reservee_key == Some(entry.key()) {
          stat.record(entry.kind(), entry.size(), false);
          return IterationDecision::Continue;
        }
        let Some(locked_key) = entry.key_metadata().try_lock() else {
          stat.record(entry.kind(), entry.size(), false);
          return IterationDecision::Continue;
        };

        let entry_size = entry.size();
        stat.record(entry.kind(), entry_size, true);
        freed_size += entry_size;
        freed_elements += 1;
        selected.push((index, entry.clone(), locked_key));

        satisfied = fits(
          &counters,
          &limits,
          size,
          1,
          slack_size,
          slack_elements,
          freed_size,
          freed_elements,
          false,
        )
        .ok;
        if satisfied {
          IterationDecision::Break
        } else {
          IterationDecision::Continue
        }
      });
    }

    if satisfied {
      let candidate_count = selected.len();
      for (index, entry, locked_key) in selected {
        entry.set_evicting(true, Some(&locked_key), Some(&*self))?;
        out.push(PriorityIter::new(entry, index, counters.clone()), locked_key);
      }
      tracing::debug!(
        size,
        user_id,
        candidates = candidate_count,
        reached_size_limit,
        reached_elements_limit,
        "collected eviction candidates"
      );
    } else {
      tracing::debug!(
        size,
        user_id,
        walked = stat.total.releasable_count + stat.total.non_releasable_count,
        "cannot free enough space"
      );
    }

    Ok(EvictionOutcome {
      satisfied,
      reached_size_limit,
      reached_elements_limit,
    })
  }

  /// Atomically replaces the limits. Returns whether the queue already
  /// satisfies them; if not, the limits are applied anyway and the caller
  /// is expected to trigger eviction.
  pub fn modify_size_limits(&mut self, max_size: u64, max_elements: u64, size_ratio: f64) -> bool {
    self.state.limits = Limits {
      max_size,
      max_elements,
      size_ratio,
    };
    let max_protected = self.state.limits.max_protected_size();
    self.rebalance_protected(max_protected);

    let counters = &self.priority.counters;
    let satisfied =
      counters.total_size() <= max_size && counters.total_elements() <= max_elements;
    if !satisfied {
      tracing::debug!(
        max_size,
        max_elements,
        current_size = counters.total_size(),
        current_elements = counters.total_elements(),
        "new limits not yet satisfied"
      );
    }
    satisfied
  }

  /// Randomizes queue order. Used for testing.
  pub fn shuffle(&mut self) {
    let mut rng = rand::thread_rng();
    self.state.queue.shuffle(&mut rng);
  }

  /// Snapshot of the queue for introspection, victims first.
  pub fn dump(&self) -> PriorityDump {
    let mut entries = Vec::with_capacity(self.state.queue.len());
    self.state.queue.for_each_in_eviction_order(&mut |_, entry| {
      entries.push(EntryDump {
        key: entry.key(),
        offset: entry.offset(),
        size: entry.size(),
        hits: entry.hits(),
        kind: entry.kind(),
        evicting: entry.is_evicting(),
      });
      IterationDecision::Continue
    });
    PriorityDump {
      entries,
      max_size: self.state.limits.max_size,
      max_elements: self.state.limits.max_elements,
    }
  }

  /// Verifies that the queue contents and the counters agree. Intended for
  /// tests and debug sweeps.
  pub fn check(&self) -> Result<(), ReserveError> {
    let mut sizes = [0u64; EntryKind::COUNT];
    let mut elements = [0u64; EntryKind::COUNT];
    let mut zero_sized_live = false;
    self.state.queue.for_each_in_eviction_order(&mut |_, entry| {
      let size = entry.size();
      if size == 0 && !entry.is_evicting() {
        zero_sized_live = true;
        return IterationDecision::Break;
      }
      sizes[entry.kind().index()] += size;
      elements[entry.kind().index()] += 1;
      IterationDecision::Continue
    });

    if zero_sized_live {
      tracing::error!("queue holds a zero-sized entry that is not being evicted");
      return Err(ReserveError::LogicalError("zero-sized live entry"));
    }
    for kind in [EntryKind::Lru, EntryKind::Probationary, EntryKind::Protected] {
      let counter = self.priority.counters.kind(kind);
      if counter.size() != sizes[kind.index()] || counter.elements() != elements[kind.index()] {
        tracing::error!(
          kind = %kind,
          counter_size = counter.size(),
          queue_size = sizes[kind.index()],
          counter_elements = counter.elements(),
          queue_elements = elements[kind.index()],
          "priority counters diverge from queue contents"
        );
        return Err(ReserveError::LogicalError(
          "priority counters diverge from queue contents",
        ));
      }
    }
    Ok(())
  }

  /// One-line state summary for diagnostics.
  pub fn state_info_for_log(&self) -> String {
    let counters = &self.priority.counters;
    let mut info = format!(
      "size: {}/{}, elements: {}/{}, held: {} bytes / {} slots",
      counters.total_size(),
      self.state.limits.max_size,
      counters.total_elements(),
      self.state.limits.max_elements,
      counters.held_size(),
      counters.held_elements(),
    );
    if matches!(self.state.queue, PriorityQueue::Slru(_)) {
      let probationary = counters.kind(EntryKind::Probationary);
      let protected = counters.kind(EntryKind::Protected);
      info.push_str(&format!(
        ", probationary: {} bytes / {} entries, protected: {} bytes / {} entries (budget {})",
        probationary.size(),
        probationary.elements(),
        protected.size(),
        protected.elements(),
        self.state.limits.max_protected_size(),
      ));
    }
    info
  }
}

fn reservee_slack(reservee: Option<&PriorityIter>) -> (u64, u64) {
  match reservee {
    Some(iter) => (iter.entry().size(), 1),
    None => (0, 0),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::key::Key;
  use crate::metadata::KeyMetadata;
  use crate::queue::lru::LruPriority;
  use crate::queue::slru::SlruPriority;

  fn lru_priority(max_size: u64, max_elements: u64) -> CachePriority {
    CachePriority::new(
      PriorityQueue::Lru(LruPriority::new()),
      Limits {
        max_size,
        max_elements,
        size_ratio: 0.0,
      },
    )
  }

  fn slru_priority(max_size: u64, max_elements: u64, size_ratio: f64) -> CachePriority {
    CachePriority::new(
      PriorityQueue::Slru(SlruPriority::new()),
      Limits {
        max_size,
        max_elements,
        size_ratio,
      },
    )
  }

  fn user() -> UserInfo {
    UserInfo::new("test")
  }

  fn add(
    lock: &mut PriorityLock<'_>,
    key: u128,
    offset: u64,
    size: u64,
  ) -> PriorityIter {
    let metadata = KeyMetadata::new(Key::new(key));
    lock
      .add(metadata, offset, size, &user(), false)
      .expect("entry fits")
  }

  #[test]
  fn can_fit_respects_both_limits() {
    let priority = lru_priority(100, 2);
    let mut lock = priority.lock();

    add(&mut lock, 1, 0, 30);
    add(&mut lock, 2, 0, 30);
    assert!(lock.can_fit(40, 0, None, false), "bytes fit");
    assert!(
      !lock.can_fit(40, 1, None, false),
      "element limit is binding at 2/2"
    );
    assert!(
      lock.can_fit(40, 1, None, true),
      "best effort tolerates one violated limit"
    );
    assert!(
      !lock.can_fit(80, 1, None, true),
      "best effort still fails when both limits are violated"
    );
  }

  #[test]
  fn add_and_remove_round_trip_totals() {
    let priority = lru_priority(100, 10);
    let mut lock = priority.lock();

    let iter = add(&mut lock, 1, 0, 40);
    assert_eq!(lock.size(), 40);
    assert_eq!(lock.elements_count(), 1);

    iter.remove(&mut lock);
    assert_eq!(lock.size(), 0);
    assert_eq!(lock.elements_count(), 0);
    assert!(iter.is_invalidated());

    // A second remove through the stale handle changes nothing.
    iter.remove(&mut lock);
    assert_eq!(lock.size(), 0);
    lock.check().expect("counters consistent");
  }

  #[test]
  fn add_rejects_zero_and_overflow() {
    let priority = lru_priority(100, 10);
    let mut lock = priority.lock();

    let metadata = KeyMetadata::new(Key::new(1));
    let err = lock.add(metadata.clone(), 0, 0, &user(), false).unwrap_err();
    assert!(matches!(err, ReserveError::InvalidArgument(_)));

    let err = lock.add(metadata, 0, 101, &user(), false).unwrap_err();
    assert!(matches!(err, ReserveError::NotEnoughSpace));
    assert_eq!(lock.size(), 0);
  }

  #[test]
  fn best_effort_add_overshoots_for_recovery() {
    let priority = lru_priority(100, 10);
    let mut lock = priority.lock();

    let metadata = KeyMetadata::new(Key::new(1));
    lock
      .add(metadata, 0, 150, &user(), true)
      .expect("recovery add succeeds over the limit");
    assert_eq!(lock.size(), 150);
    assert!(!lock.can_fit(1, 0, None, false));
    lock.check().expect("counters consistent even over the limit");
  }

  #[test]
  fn increment_size_requires_room() {
    let priority = lru_priority(100, 10);
    let mut lock = priority.lock();

    let iter = add(&mut lock, 1, 0, 40);
    add(&mut lock, 2, 0, 40);

    iter.increment_size(20, &mut lock).expect("20 more fits");
    assert_eq!(iter.entry().size(), 60);
    assert_eq!(lock.size(), 100);

    let err = iter.increment_size(1, &mut lock).unwrap_err();
    assert!(matches!(err, ReserveError::NotEnoughSpace));
    assert_eq!(iter.entry().size(), 60, "failed growth leaves size alone");
  }

  #[test]
  fn decrement_size_needs_no_lock() {
    let priority = lru_priority(100, 10);
    let iter = {
      let mut lock = priority.lock();
      add(&mut lock, 1, 0, 40)
    };

    iter.decrement_size(15);
    assert_eq!(iter.entry().size(), 25);
    assert_eq!(priority.size_approx(), 25);
    priority.lock().check().expect("counters consistent");
  }

  #[test]
  fn hold_charges_capacity_and_release_is_idempotent() {
    let priority = lru_priority(100, 10);
    let lock = priority.lock();
    assert!(lock.can_fit(100, 1, None, false));

    let mut hold = priority.take_hold(60, 1, EntryKind::Lru, &lock);
    assert!(!lock.can_fit(50, 1, None, false), "hold counts as used");
    assert!(lock.can_fit(40, 1, None, false));

    hold.release();
    hold.release();
    hold.release();
    assert!(lock.can_fit(100, 1, None, false));
    drop(hold);

    let snapshot = priority.metrics();
    assert_eq!(snapshot.holds_taken, 1);
    assert_eq!(snapshot.holds_released, 1, "multiple releases count once");
  }

  #[test]
  fn dropped_hold_returns_capacity() {
    let priority = lru_priority(100, 10);
    let lock = priority.lock();
    {
      let _hold = priority.take_hold(100, 1, EntryKind::Lru, &lock);
      assert!(!lock.can_fit(1, 0, None, false));
    }
    assert!(lock.can_fit(100, 1, None, false));
  }

  #[test]
  fn collect_marks_candidates_under_both_locks() {
    let priority = lru_priority(100, 10);
    let mut lock = priority.lock();
    let a = add(&mut lock, 1, 0, 40);
    let b = add(&mut lock, 2, 0, 40);
    let c = add(&mut lock, 3, 0, 20);

    let mut stat = ReserveStat::new();
    let mut out = EvictionCandidates::new();
    let outcome = lock
      .collect_candidates_for_eviction(50, &mut stat, &mut out, None, "test")
      .expect("no logical error");

    assert!(outcome.satisfied);
    assert!(outcome.reached_size_limit);
    assert!(!outcome.reached_elements_limit);
    assert_eq!(out.len(), 2, "a alone frees 40, needs b as well");
    assert!(a.entry().is_evicting());
    assert!(b.entry().is_evicting());
    assert!(!c.entry().is_evicting());
    assert_eq!(stat.total.releasable_size, 80);
    assert_eq!(stat.total.releasable_count, 2);
  }

  #[test]
  fn collect_skips_reservee_key() {
    let priority = lru_priority(100, 10);
    let mut lock = priority.lock();
    let a = add(&mut lock, 1, 0, 60);
    add(&mut lock, 2, 0, 40);

    // Growing `a` to 90 must never evict `a` itself.
    let mut stat = ReserveStat::new();
    let mut out = EvictionCandidates::new();
    let outcome = lock
      .collect_candidates_for_eviction(90, &mut stat, &mut out, Some(&a), "test")
      .expect("no logical error");

    assert!(outcome.satisfied);
    assert!(!a.entry().is_evicting(), "reservee is pinned");
    assert_eq!(stat.kind(EntryKind::Lru).non_releasable_size, 60);
    assert_eq!(stat.kind(EntryKind::Lru).releasable_size, 40);
  }

  #[test]
  fn modify_size_limits_reports_pressure() {
    let priority = lru_priority(100, 10);
    let mut lock = priority.lock();
    add(&mut lock, 1, 0, 80);

    assert!(lock.modify_size_limits(90, 10, 0.0));
    assert!(!lock.modify_size_limits(50, 10, 0.0), "80 bytes exceed 50");
    assert_eq!(lock.size_limit(), 50, "limits apply even when exceeded");
  }

  #[test]
  fn slru_promotion_respects_protected_budget() {
    let priority = slru_priority(100, 10, 0.5);
    let mut lock = priority.lock();
    let a = add(&mut lock, 1, 0, 20);
    let b = add(&mut lock, 2, 0, 20);
    let c = add(&mut lock, 3, 0, 20);

    assert_eq!(a.increase_priority(&mut lock), 1);
    b.increase_priority(&mut lock);
    c.increase_priority(&mut lock);
    // Protected holds a, b, c = 60 > 50, so the oldest (a) was demoted.
    assert_eq!(a.kind(), EntryKind::Probationary);
    assert_eq!(b.kind(), EntryKind::Protected);
    assert_eq!(c.kind(), EntryKind::Protected);

    a.increase_priority(&mut lock);
    // a re-promotes; b is now the protected LRU and gets demoted.
    assert_eq!(a.kind(), EntryKind::Protected);
    assert_eq!(b.kind(), EntryKind::Probationary);
    lock.check().expect("counters consistent after demotions");
  }

  #[test]
  fn oversized_entry_stays_probationary() {
    let priority = slru_priority(100, 10, 0.3);
    let mut lock = priority.lock();
    let big = add(&mut lock, 1, 0, 40);

    // 40 > floor(100 * 0.3): promotion would demote it right back.
    big.increase_priority(&mut lock);
    assert_eq!(big.kind(), EntryKind::Probationary);
    assert_eq!(big.entry().hits(), 1, "refresh still counts the hit");
  }

  #[test]
  fn shuffle_and_dump_agree_on_contents() {
    let priority = lru_priority(1000, 100);
    let mut lock = priority.lock();
    for key in 0..20u128 {
      add(&mut lock, key, 0, 10);
    }

    lock.shuffle();
    let dump = lock.dump();
    assert_eq!(dump.len(), 20);
    assert_eq!(dump.total_size(), 200);
    assert_eq!(dump.max_size, 1000);
    lock.check().expect("shuffle must not corrupt accounting");
  }

  #[test]
  fn state_info_mentions_slru_segments() {
    let priority = slru_priority(100, 10, 0.5);
    let mut lock = priority.lock();
    add(&mut lock, 1, 0, 10);

    let info = lock.state_info_for_log();
    assert!(info.contains("size: 10/100"), "got: {info}");
    assert!(info.contains("probationary"), "got: {info}");
  }
}
