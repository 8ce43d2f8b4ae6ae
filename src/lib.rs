//! Priority and eviction engine for a bounded on-disk file-segment cache.
//!
//! The engine tracks fixed-identity `(key, offset)` segments under two
//! simultaneous limits -- total bytes and element count -- and answers,
//! concurrently across many threads: does a reservation fit, which entries
//! should be evicted to make it fit, and how priority evolves as segments
//! are accessed. Physical storage is the caller's business; eviction here
//! is selection and bookkeeping, finalized through a [`SegmentCleaner`]
//! callback.
//!
//! Two queue variants are provided: plain LRU and segmented LRU with
//! probationary/protected segments. Lock discipline is capability-style:
//! operations that need the global lock take a [`PriorityLock`], obtained
//! from [`CachePriority::lock`]; restricted per-entry transitions
//! additionally demand the entry's [`LockedKey`].

mod builder;
mod cache;
mod candidates;
mod dump;
mod entry;
mod error;
mod hold;
mod iter;
mod key;
mod metadata;
mod metrics;
mod priority;
mod queue;
mod stat;

pub use builder::{CacheBuilder, PolicyKind};
pub use cache::{Cache, Reservation};
pub use candidates::EvictionCandidates;
pub use dump::{EntryDump, PriorityDump};
pub use entry::CacheEntry;
pub use error::{BuildError, ReserveError};
pub use hold::HoldSpace;
pub use iter::PriorityIter;
pub use key::{Key, UserInfo};
pub use metadata::{KeyMetadata, KeyRegistry, LockedKey, NullCleaner, SegmentCleaner};
pub use metrics::MetricsSnapshot;
pub use priority::{CachePriority, EvictionOutcome, PriorityLock};
pub use queue::EntryKind;
pub use stat::{ReserveStat, StatSlice};
