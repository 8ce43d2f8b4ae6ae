use std::fmt;
use std::io;

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
  /// The cache was configured with a byte capacity of zero.
  ZeroCapacity,
  /// The cache was configured with an element limit of zero.
  ZeroElements,
  /// An SLRU cache was configured with a size ratio outside of `(0, 1)`.
  InvalidSizeRatio(f64),
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildError::ZeroCapacity => write!(f, "cache capacity cannot be zero"),
      BuildError::ZeroElements => write!(f, "cache element limit cannot be zero"),
      BuildError::InvalidSizeRatio(ratio) => {
        write!(f, "slru size ratio must be in (0, 1), got {ratio}")
      }
    }
  }
}

impl std::error::Error for BuildError {}

/// Errors returned by reservation and queue operations.
#[derive(Debug)]
pub enum ReserveError {
  /// There is no room for the request, but eviction has not been attempted.
  /// Transient; the caller may retry with eviction.
  NotEnoughSpace,
  /// Eviction was considered and cannot free enough space. Surfaced to the
  /// user of the cache.
  NotEnoughSpaceEven,
  /// The request itself is malformed (zero size, size above the hard limit).
  InvalidArgument(&'static str),
  /// An internal invariant was violated. Never recovered; indicates a bug.
  LogicalError(&'static str),
  /// The external per-segment cleanup failed while eviction candidates were
  /// being processed. The reservation has been rolled back.
  Cleanup(io::Error),
}

impl ReserveError {
  /// True for errors the caller may retry after triggering eviction.
  pub fn is_transient(&self) -> bool {
    matches!(self, ReserveError::NotEnoughSpace)
  }
}

impl fmt::Display for ReserveError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ReserveError::NotEnoughSpace => write!(f, "not enough space in cache"),
      ReserveError::NotEnoughSpaceEven => {
        write!(f, "not enough space in cache even after eviction")
      }
      ReserveError::InvalidArgument(reason) => write!(f, "invalid argument: {reason}"),
      ReserveError::LogicalError(reason) => write!(f, "logical error: {reason}"),
      ReserveError::Cleanup(err) => write!(f, "eviction cleanup failed: {err}"),
    }
  }
}

impl std::error::Error for ReserveError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      ReserveError::Cleanup(err) => Some(err),
      _ => None,
    }
  }
}

impl From<io::Error> for ReserveError {
  fn from(err: io::Error) -> Self {
    ReserveError::Cleanup(err)
  }
}
