use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the engine.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub(crate) struct Metrics {
  // --- Reservations ---
  pub(crate) reservations: CachePadded<AtomicU64>,
  pub(crate) reservation_failures: CachePadded<AtomicU64>,

  // --- Entry churn ---
  pub(crate) entries_added: CachePadded<AtomicU64>,
  pub(crate) entries_removed: CachePadded<AtomicU64>,

  // --- Eviction ---
  pub(crate) evicted_entries: CachePadded<AtomicU64>,
  pub(crate) evicted_bytes: CachePadded<AtomicU64>,
  pub(crate) eviction_rollbacks: CachePadded<AtomicU64>,

  // --- Promotion policy ---
  pub(crate) promotions: CachePadded<AtomicU64>,
  pub(crate) demotions: CachePadded<AtomicU64>,

  // --- Holds ---
  pub(crate) holds_taken: CachePadded<AtomicU64>,
  pub(crate) holds_released: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      reservations: CachePadded::new(AtomicU64::new(0)),
      reservation_failures: CachePadded::new(AtomicU64::new(0)),
      entries_added: CachePadded::new(AtomicU64::new(0)),
      entries_removed: CachePadded::new(AtomicU64::new(0)),
      evicted_entries: CachePadded::new(AtomicU64::new(0)),
      evicted_bytes: CachePadded::new(AtomicU64::new(0)),
      eviction_rollbacks: CachePadded::new(AtomicU64::new(0)),
      promotions: CachePadded::new(AtomicU64::new(0)),
      demotions: CachePadded::new(AtomicU64::new(0)),
      holds_taken: CachePadded::new(AtomicU64::new(0)),
      holds_released: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Creates a point-in-time snapshot. Occupancy is read by the caller,
  /// which owns the capacity counters.
  pub(crate) fn snapshot(&self, occupancy: Occupancy) -> MetricsSnapshot {
    MetricsSnapshot {
      reservations: self.reservations.load(Ordering::Relaxed),
      reservation_failures: self.reservation_failures.load(Ordering::Relaxed),
      entries_added: self.entries_added.load(Ordering::Relaxed),
      entries_removed: self.entries_removed.load(Ordering::Relaxed),
      evicted_entries: self.evicted_entries.load(Ordering::Relaxed),
      evicted_bytes: self.evicted_bytes.load(Ordering::Relaxed),
      eviction_rollbacks: self.eviction_rollbacks.load(Ordering::Relaxed),
      promotions: self.promotions.load(Ordering::Relaxed),
      demotions: self.demotions.load(Ordering::Relaxed),
      holds_taken: self.holds_taken.load(Ordering::Relaxed),
      holds_released: self.holds_released.load(Ordering::Relaxed),
      current_size: occupancy.size,
      current_elements: occupancy.elements,
      held_size: occupancy.held_size,
      held_elements: occupancy.held_elements,
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// Current capacity usage, read from the priority counters.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Occupancy {
  pub(crate) size: u64,
  pub(crate) elements: u64,
  pub(crate) held_size: u64,
  pub(crate) held_elements: u64,
}

/// A point-in-time, public-facing snapshot of the engine's metrics.
#[derive(Clone)]
pub struct MetricsSnapshot {
  /// Successful reservations (existing, grown, or newly added).
  pub reservations: u64,
  /// Reservations that failed with any error.
  pub reservation_failures: u64,
  /// Entries ever added to the queue.
  pub entries_added: u64,
  /// Entries ever removed from the queue (eviction included).
  pub entries_removed: u64,
  /// Entries removed by finalized evictions.
  pub evicted_entries: u64,
  /// Bytes freed by finalized evictions.
  pub evicted_bytes: u64,
  /// Eviction passes that were rolled back.
  pub eviction_rollbacks: u64,
  /// Probationary-to-protected promotions.
  pub promotions: u64,
  /// Protected-to-probationary demotions.
  pub demotions: u64,
  /// Capacity holds taken.
  pub holds_taken: u64,
  /// Capacity holds released.
  pub holds_released: u64,
  /// Bytes currently committed to live entries.
  pub current_size: u64,
  /// Live entry count.
  pub current_elements: u64,
  /// Bytes currently charged to outstanding holds.
  pub held_size: u64,
  /// Elements currently charged to outstanding holds.
  pub held_elements: u64,
  /// Seconds since the engine was built.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("reservations", &self.reservations)
      .field("reservation_failures", &self.reservation_failures)
      .field("entries_added", &self.entries_added)
      .field("entries_removed", &self.entries_removed)
      .field("evicted_entries", &self.evicted_entries)
      .field("evicted_bytes", &self.evicted_bytes)
      .field("eviction_rollbacks", &self.eviction_rollbacks)
      .field("promotions", &self.promotions)
      .field("demotions", &self.demotions)
      .field("holds_taken", &self.holds_taken)
      .field("holds_released", &self.holds_released)
      .field("current_size", &self.current_size)
      .field("current_elements", &self.current_elements)
      .field("held_size", &self.held_size)
      .field("held_elements", &self.held_elements)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
