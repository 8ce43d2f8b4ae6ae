use crate::entry::CacheEntry;
use crate::queue::list::{Node, SegmentList};
use crate::queue::{EntryKind, IterationDecision};

use generational_arena::{Arena, Index};
use rand::seq::SliceRandom;
use std::sync::Arc;

/// The Segmented LRU variant: a probationary and a protected queue.
///
/// New entries start probationary; promotion moves them to protected, and
/// protected overflow is demoted back to the probationary MRU end by the
/// caller (which owns the size accounting). Eviction candidates are drawn
/// from the probationary LRU end first, then from protected.
///
/// Both segments share one node arena, so a handle's index survives
/// promotion and demotion.
pub(crate) struct SlruPriority {
  nodes: Arena<Node>,
  probationary: SegmentList,
  protected: SegmentList,
}

impl SlruPriority {
  pub(crate) fn new() -> Self {
    Self {
      nodes: Arena::new(),
      probationary: SegmentList::new(),
      protected: SegmentList::new(),
    }
  }

  pub(crate) fn insert(&mut self, entry: Arc<CacheEntry>) -> Index {
    debug_assert_eq!(entry.kind(), EntryKind::Probationary);
    let index = self.nodes.insert(Node {
      entry,
      next: None,
      prev: None,
    });
    self.probationary.push_front(&mut self.nodes, index);
    index
  }

  pub(crate) fn remove(&mut self, index: Index) -> Option<Arc<CacheEntry>> {
    let kind = self.nodes.get(index)?.entry.kind();
    let nodes = &mut self.nodes;
    match kind {
      EntryKind::Protected => self.protected.unlink(nodes, index),
      _ => self.probationary.unlink(nodes, index),
    }
    self.nodes.remove(index).map(|node| node.entry)
  }

  pub(crate) fn refresh(&mut self, index: Index) -> bool {
    let Some(node) = self.nodes.get(index) else {
      return false;
    };
    let kind = node.entry.kind();
    let nodes = &mut self.nodes;
    match kind {
      EntryKind::Protected => self.protected.move_to_front(nodes, index),
      _ => self.probationary.move_to_front(nodes, index),
    }
    true
  }

  /// Probationary → protected MRU. Returns the moved entry; `None` for a
  /// stale handle or an entry that is already protected.
  pub(crate) fn promote(&mut self, index: Index) -> Option<Arc<CacheEntry>> {
    let node = self.nodes.get(index)?;
    if node.entry.kind() == EntryKind::Protected {
      return None;
    }
    let entry = node.entry.clone();
    self.probationary.unlink(&mut self.nodes, index);
    self.protected.push_front(&mut self.nodes, index);
    entry.set_kind(EntryKind::Protected);
    Some(entry)
  }

  /// Protected LRU tail → probationary MRU. Returns the demoted entry.
  pub(crate) fn demote_lru(&mut self) -> Option<Arc<CacheEntry>> {
    let tail = self.protected.tail?;
    let entry = self.nodes[tail].entry.clone();
    self.protected.unlink(&mut self.nodes, tail);
    self.probationary.push_front(&mut self.nodes, tail);
    entry.set_kind(EntryKind::Probationary);
    Some(entry)
  }

  pub(crate) fn for_each_in_eviction_order(
    &self,
    f: &mut dyn FnMut(Index, &Arc<CacheEntry>) -> IterationDecision,
  ) {
    for index in self.probationary.iter_from_tail(&self.nodes) {
      if f(index, &self.nodes[index].entry) == IterationDecision::Break {
        return;
      }
    }
    for index in self.protected.iter_from_tail(&self.nodes) {
      if f(index, &self.nodes[index].entry) == IterationDecision::Break {
        return;
      }
    }
  }

  pub(crate) fn shuffle(&mut self, rng: &mut dyn rand::RngCore) {
    let mut order: Vec<Index> = self.probationary.iter_from_tail(&self.nodes).collect();
    order.shuffle(rng);
    self.probationary.relink(&mut self.nodes, &order);

    let mut order: Vec<Index> = self.protected.iter_from_tail(&self.nodes).collect();
    order.shuffle(rng);
    self.protected.relink(&mut self.nodes, &order);
  }

  pub(crate) fn len(&self) -> usize {
    self.probationary.len() + self.protected.len()
  }

  #[cfg(test)]
  pub(crate) fn segment_len(&self, kind: EntryKind) -> usize {
    match kind {
      EntryKind::Protected => self.protected.len(),
      _ => self.probationary.len(),
    }
  }
}
