use crate::queue::EntryKind;

/// Accounting for one slice of the queue walked during candidate selection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatSlice {
  /// Bytes held by entries that were selected as eviction candidates.
  pub releasable_size: u64,
  /// Number of entries selected as eviction candidates.
  pub releasable_count: u64,
  /// Bytes held by entries that were walked but could not be released
  /// (already evicting, pinned by the reservee's key, or key-locked).
  pub non_releasable_size: u64,
  /// Number of entries walked but not releasable.
  pub non_releasable_count: u64,
}

impl StatSlice {
  fn record(&mut self, size: u64, releasable: bool) {
    if releasable {
      self.releasable_size += size;
      self.releasable_count += 1;
    } else {
      self.non_releasable_size += size;
      self.non_releasable_count += 1;
    }
  }
}

/// Per-attempt accounting of a reservation: what the candidate walk saw,
/// broken down by queue entry type.
#[derive(Debug, Default, Clone)]
pub struct ReserveStat {
  /// The user the reservation was attempted on behalf of.
  pub user_id: Option<String>,
  pub total: StatSlice,
  by_kind: [StatSlice; EntryKind::COUNT],
}

impl ReserveStat {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn for_user(user_id: impl Into<String>) -> Self {
    Self {
      user_id: Some(user_id.into()),
      ..Self::default()
    }
  }

  pub(crate) fn record(&mut self, kind: EntryKind, size: u64, releasable: bool) {
    self.total.record(size, releasable);
    self.by_kind[kind.index()].record(size, releasable);
  }

  pub fn kind(&self, kind: EntryKind) -> &StatSlice {
    &self.by_kind[kind.index()]
  }
}
