use crate::key::Key;
use crate::queue::EntryKind;

/// One entry of an introspection snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntryDump {
  pub key: Key,
  pub offset: u64,
  pub size: u64,
  pub hits: u64,
  pub kind: EntryKind,
  pub evicting: bool,
}

/// A point-in-time snapshot of the priority queue, victims first.
///
/// Serializable (with the `serde` feature) for cache-inspection endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PriorityDump {
  pub entries: Vec<EntryDump>,
  pub max_size: u64,
  pub max_elements: u64,
}

impl PriorityDump {
  pub fn total_size(&self) -> u64 {
    self.entries.iter().map(|entry| entry.size).sum()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
