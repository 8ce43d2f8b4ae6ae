use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};

/// An opaque, hashable identifier for a cached file.
///
/// Typically a content-addressed 128-bit hash. Equality is bytewise.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Key(u128);

impl Key {
  pub const fn new(raw: u128) -> Self {
    Key(raw)
  }

  /// Derives a key by hashing arbitrary bytes (e.g. a remote object path).
  pub fn from_bytes(bytes: &[u8]) -> Self {
    // Two independently seeded passes widen the digest to 128 bits.
    let hasher = ahash::RandomState::with_seeds(7, 11, 13, 17);
    let lo = {
      let mut state = hasher.build_hasher();
      bytes.hash(&mut state);
      state.finish()
    };
    let hi = {
      let mut state = hasher.build_hasher();
      lo.hash(&mut state);
      bytes.hash(&mut state);
      state.finish()
    };
    Key(((hi as u128) << 64) | lo as u128)
  }

  pub const fn raw(&self) -> u128 {
    self.0
  }
}

impl fmt::Display for Key {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:032x}", self.0)
  }
}

impl fmt::Debug for Key {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Key({:032x})", self.0)
  }
}

/// The identity a reservation is performed on behalf of.
///
/// Ownership attribution only; the engine does not enforce per-user
/// fairness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
  pub user_id: String,
  pub quota_id: Option<String>,
}

impl UserInfo {
  pub fn new(user_id: impl Into<String>) -> Self {
    Self {
      user_id: user_id.into(),
      quota_id: None,
    }
  }

  pub fn with_quota(user_id: impl Into<String>, quota_id: impl Into<String>) -> Self {
    Self {
      user_id: user_id.into(),
      quota_id: Some(quota_id.into()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn from_bytes_is_deterministic() {
    let a = Key::from_bytes(b"s3://bucket/part-0001.parquet");
    let b = Key::from_bytes(b"s3://bucket/part-0001.parquet");
    let c = Key::from_bytes(b"s3://bucket/part-0002.parquet");
    assert_eq!(a, b);
    assert_ne!(a, c);
  }

  #[test]
  fn display_is_fixed_width_hex() {
    let key = Key::new(0xdead_beef);
    let text = key.to_string();
    assert_eq!(text.len(), 32);
    assert!(text.ends_with("deadbeef"));
  }
}
