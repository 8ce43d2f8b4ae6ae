use crate::entry::CacheEntry;
use crate::queue::list::{Node, SegmentList};
use crate::queue::IterationDecision;

use generational_arena::{Arena, Index};
use rand::seq::SliceRandom;
use std::sync::Arc;

/// A single doubly-linked queue ordered by recency.
///
/// `insert` places entries at the MRU end, candidate selection walks from
/// the LRU end.
pub(crate) struct LruPriority {
  nodes: Arena<Node>,
  list: SegmentList,
}

impl LruPriority {
  pub(crate) fn new() -> Self {
    Self {
      nodes: Arena::new(),
      list: SegmentList::new(),
    }
  }

  pub(crate) fn insert(&mut self, entry: Arc<CacheEntry>) -> Index {
    let index = self.nodes.insert(Node {
      entry,
      next: None,
      prev: None,
    });
    self.list.push_front(&mut self.nodes, index);
    index
  }

  pub(crate) fn remove(&mut self, index: Index) -> Option<Arc<CacheEntry>> {
    self.nodes.get(index)?;
    self.list.unlink(&mut self.nodes, index);
    self.nodes.remove(index).map(|node| node.entry)
  }

  pub(crate) fn refresh(&mut self, index: Index) -> bool {
    if self.nodes.get(index).is_none() {
      return false;
    }
    self.list.move_to_front(&mut self.nodes, index);
    true
  }

  pub(crate) fn for_each_in_eviction_order(
    &self,
    f: &mut dyn FnMut(Index, &Arc<CacheEntry>) -> IterationDecision,
  ) {
    for index in self.list.iter_from_tail(&self.nodes) {
      if f(index, &self.nodes[index].entry) == IterationDecision::Break {
        return;
      }
    }
  }

  pub(crate) fn shuffle(&mut self, rng: &mut dyn rand::RngCore) {
    let mut order: Vec<Index> = self.list.iter_from_tail(&self.nodes).collect();
    order.shuffle(rng);
    self.list.relink(&mut self.nodes, &order);
  }

  pub(crate) fn len(&self) -> usize {
    self.list.len()
  }
}
