use crate::entry::CacheEntry;

use generational_arena::{Arena, Index};
use std::sync::Arc;

#[derive(Debug)]
pub(crate) struct Node {
  pub(crate) entry: Arc<CacheEntry>,
  pub(crate) next: Option<Index>,
  pub(crate) prev: Option<Index>,
}

/// One intrusive list over a node arena shared between segments.
///
/// Keeping every segment's nodes in a single arena is what makes handle
/// indices stable across SLRU promotion and demotion: moving an entry
/// between segments only relinks pointers, it never reallocates the node.
///
/// Head is the most-recently-used end; tail is the eviction end.
#[derive(Debug, Default)]
pub(crate) struct SegmentList {
  pub(crate) head: Option<Index>,
  pub(crate) tail: Option<Index>,
  len: usize,
}

impl SegmentList {
  pub(crate) fn new() -> Self {
    Self {
      head: None,
      tail: None,
      len: 0,
    }
  }

  pub(crate) fn len(&self) -> usize {
    self.len
  }

  /// Unlinks a node from this segment. The node stays in the arena.
  pub(crate) fn unlink(&mut self, nodes: &mut Arena<Node>, index: Index) {
    let (prev, next) = {
      let node = &nodes[index];
      (node.prev, node.next)
    };

    match prev {
      Some(prev_idx) => nodes[prev_idx].next = next,
      None => self.head = next,
    }
    match next {
      Some(next_idx) => nodes[next_idx].prev = prev,
      None => self.tail = prev,
    }

    let node = &mut nodes[index];
    node.prev = None;
    node.next = None;
    self.len -= 1;
  }

  /// Links an already-allocated node in at the MRU end.
  pub(crate) fn push_front(&mut self, nodes: &mut Arena<Node>, index: Index) {
    let old_head = self.head;
    {
      let node = &mut nodes[index];
      node.next = old_head;
      node.prev = None;
    }
    if let Some(old_head_idx) = old_head {
      nodes[old_head_idx].prev = Some(index);
    }
    self.head = Some(index);
    if self.tail.is_none() {
      self.tail = Some(index);
    }
    self.len += 1;
  }

  pub(crate) fn move_to_front(&mut self, nodes: &mut Arena<Node>, index: Index) {
    if self.head == Some(index) {
      return;
    }
    self.unlink(nodes, index);
    self.push_front(nodes, index);
  }

  /// Walks tail to head (eviction order), yielding node indices.
  pub(crate) fn iter_from_tail<'a>(
    &self,
    nodes: &'a Arena<Node>,
  ) -> impl Iterator<Item = Index> + 'a {
    let mut current = self.tail;
    std::iter::from_fn(move || {
      let index = current?;
      current = nodes[index].prev;
      Some(index)
    })
  }

  /// Rebuilds the segment's links in the given order (first = MRU).
  pub(crate) fn relink(&mut self, nodes: &mut Arena<Node>, order: &[Index]) {
    debug_assert_eq!(order.len(), self.len);
    self.head = order.first().copied();
    self.tail = order.last().copied();
    for (pos, &index) in order.iter().enumerate() {
      let node = &mut nodes[index];
      node.prev = if pos > 0 { Some(order[pos - 1]) } else { None };
      node.next = order.get(pos + 1).copied();
    }
  }
}
