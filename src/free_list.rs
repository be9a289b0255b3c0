use crate::{
  arena::Arena,
  block::{FreeRegion, NIL},
};

/// Address-ordered singly linked list of free regions.
///
/// Nodes live inside the free bytes they describe; the list itself only holds
/// the offset of the lowest free region.
///
/// ```text
///   head
///    │
///    ▼
///   ┌──────────┐          ┌──────────┐          ┌──────────┐
///   │ size     │  next    │ size     │  next    │ size     │  next
///   │ next ────┼─────────►│ next ────┼─────────►│ next ────┼──► NIL
///   └──────────┘          └──────────┘          └──────────┘
///    lowest offset                               highest offset
/// ```
#[derive(Debug)]
pub(crate) struct FreeList {
  head: usize,
  len: usize,
}

/// A free region visited during a walk, with the offset of its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor {
  pub prev: Option<usize>,
  pub offset: usize,
  pub region: FreeRegion,
}

impl Cursor {
  pub fn end(&self) -> usize {
    self.offset + self.region.size
  }
}

impl FreeList {
  pub fn new() -> Self {
    Self { head: NIL, len: 0 }
  }

  pub fn len(&self) -> usize {
    self.len
  }

  /// Collapses the list to one region covering the whole arena.
  pub fn reset(
    &mut self,
    arena: &mut Arena,
  ) {
    let capacity = arena.capacity();

    self.head = NIL;
    self.len = 0;
    self.insert(arena, None, 0, capacity);
  }

  /// Writes a node of `size` bytes at `offset` and links it right after `prev`,
  /// or at the head when `prev` is `None`.
  pub fn insert(
    &mut self,
    arena: &mut Arena,
    prev: Option<usize>,
    offset: usize,
    size: usize,
  ) {
    match prev {
      None => {
        arena.write(offset, FreeRegion::new(size, self.head));
        self.head = offset;
      }
      Some(prev) => {
        let mut before: FreeRegion = arena.read(prev);
        arena.write(offset, FreeRegion::new(size, before.next));
        before.next = offset;
        arena.write(prev, before);
      }
    }

    self.len += 1;
  }

  /// Unlinks the node at `offset`, whose predecessor is `prev`.
  pub fn remove(
    &mut self,
    arena: &mut Arena,
    prev: Option<usize>,
    offset: usize,
  ) {
    let node: FreeRegion = arena.read(offset);

    match prev {
      None => {
        debug_assert_eq!(self.head, offset);
        self.head = node.next;
      }
      Some(prev) => {
        let mut before: FreeRegion = arena.read(prev);
        debug_assert_eq!(before.next, offset);
        before.next = node.next;
        arena.write(prev, before);
      }
    }

    self.len -= 1;
  }

  /// Replaces the size stored in the node at `offset`.
  pub fn resize(
    &mut self,
    arena: &mut Arena,
    offset: usize,
    size: usize,
  ) {
    let mut node: FreeRegion = arena.read(offset);
    node.size = size;
    arena.write(offset, node);
  }

  pub fn iter<'a>(
    &self,
    arena: &'a Arena,
  ) -> Iter<'a> {
    Iter {
      arena,
      prev: None,
      next: self.head,
    }
  }
}

pub(crate) struct Iter<'a> {
  arena: &'a Arena,
  prev: Option<usize>,
  next: usize,
}

impl Iterator for Iter<'_> {
  type Item = Cursor;

  fn next(&mut self) -> Option<Self::Item> {
    if self.next == NIL {
      return None;
    }

    let offset = self.next;
    let region: FreeRegion = self.arena.read(offset);
    let cursor = Cursor {
      prev: self.prev,
      offset,
      region,
    };

    self.prev = Some(offset);
    self.next = region.next;

    Some(cursor)
  }
}
