use std::ptr::NonNull;

use crate::{
  arena::Arena,
  block::{
    AllocationHeader, FREE_REGION_SIZE, FreeRegion, HEADER_SIZE, MIN_ALIGNMENT, MIN_ALLOCATION_SIZE,
    NIL,
  },
  error::AllocError,
  free_list::FreeList,
  policy::Policy,
};

/// A free span of the arena, in absolute addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
  pub start: usize,
  pub size: usize,
}

impl Span {
  pub fn end(&self) -> usize {
    self.start + self.size
  }
}

#[derive(Debug)]
struct State {
  arena: Arena,
  free_list: FreeList,
}

/// General purpose allocator over a single pre-reserved arena.
///
/// Free space is kept in an address-ordered list whose nodes live in the free
/// bytes themselves. Allocations are carved out of the region chosen by the
/// configured [`Policy`]; releases put the span back in order and merge it with
/// its immediate neighbours.
///
/// The allocator is single threaded: it performs no synchronization and every
/// mutating operation takes `&mut self`.
#[derive(Debug)]
pub struct FreeListAllocator {
  capacity: usize,
  policy: Policy,
  state: Option<State>,
}

impl FreeListAllocator {
  /// Creates an allocator for an arena of `capacity` bytes. No memory is
  /// reserved until [`init`](Self::init) is called.
  pub fn new(
    capacity: usize,
    policy: Policy,
  ) -> Self {
    Self {
      capacity,
      policy,
      state: None,
    }
  }

  /// Releases any existing arena, reserves a fresh one of the configured
  /// capacity and resets it.
  pub fn init(&mut self) -> Result<(), AllocError> {
    check_capacity(self.capacity)?;
    self.release();

    let arena = Arena::reserve(self.capacity)?;

    log::debug!(
      "reserved arena {:#x}..{:#x} ({} bytes, {})",
      arena.base(),
      arena.base() + arena.capacity(),
      arena.capacity(),
      self.policy
    );

    self.state = Some(State {
      arena,
      free_list: FreeList::new(),
    });
    self.reset();

    Ok(())
  }

  /// Like [`init`](Self::init), but first changes the arena capacity.
  pub fn init_with_capacity(
    &mut self,
    capacity: usize,
  ) -> Result<(), AllocError> {
    check_capacity(capacity)?;
    self.capacity = capacity;
    self.init()
  }

  /// Forgets every outstanding allocation and turns the whole arena back into
  /// one free region. Memory is not zeroed.
  pub fn reset(&mut self) {
    let Some(state) = self.state.as_mut() else {
      return;
    };

    state.arena.reset_usage();
    state.free_list.reset(&mut state.arena);

    log::debug!("reset arena {:#x}", state.arena.base());
  }

  /// Returns the backing memory to the OS. Pointers previously handed out
  /// become dangling.
  pub fn release(&mut self) {
    if let Some(state) = self.state.take() {
      log::debug!("released arena {:#x}", state.arena.base());
    }
  }

  /// Allocates `size` bytes aligned to `alignment`.
  ///
  /// `size` must be at least [`MIN_ALLOCATION_SIZE`] and `alignment` a power of
  /// two no smaller than [`MIN_ALIGNMENT`].
  ///
  /// # Errors
  ///
  /// - [`AllocError::InvalidArgument`] for a bad size or alignment.
  /// - [`AllocError::AllocationFailed`] when no free region fits.
  /// - [`AllocError::NotInitialized`] before [`init`](Self::init).
  pub fn allocate(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size < MIN_ALLOCATION_SIZE {
      return Err(AllocError::invalid_argument(format!(
        "size {size} is below the minimum of {MIN_ALLOCATION_SIZE} bytes"
      )));
    }

    if alignment < MIN_ALIGNMENT || !alignment.is_power_of_two() {
      return Err(AllocError::invalid_argument(format!(
        "alignment {alignment} must be a power of two of at least {MIN_ALIGNMENT}"
      )));
    }

    let State { arena, free_list } = self.state.as_mut().ok_or(AllocError::NotInitialized)?;

    let fit = self
      .policy
      .find(free_list, arena, size, alignment)
      .ok_or(AllocError::AllocationFailed { size, alignment })?;

    let offset = fit.cursor.offset;
    let mut required = fit.required(size);
    let rest = fit.leftover(size);

    if rest >= FREE_REGION_SIZE {
      free_list.insert(arena, Some(offset), offset + required, rest);
    } else {
      // Too small to track on its own; the allocation keeps it.
      required += rest;
    }
    free_list.remove(arena, fit.cursor.prev, offset);

    let alignment_padding = fit.padding - HEADER_SIZE;
    let header_offset = offset + alignment_padding;
    arena.write(header_offset, AllocationHeader::new(required, alignment_padding));
    arena.commit(required);

    let data = arena.ptr_at(header_offset + HEADER_SIZE);

    log::trace!(
      "allocate {size}/{alignment}: header {:#x} data {data:p} block {required} \
       padding {alignment_padding} rest {rest} used {}",
      arena.base() + header_offset,
      arena.used()
    );

    debug_assert_eq!(data.as_ptr() as usize % alignment, 0);
    Ok(data)
  }

  /// Returns an allocation to the free list, merging it with adjacent free
  /// regions.
  ///
  /// The pointer is checked before anything is modified: it must lie inside the
  /// arena, carry a plausible header, and its span must not overlap a region
  /// that is already free. A pointer that fails those checks is reported as
  /// [`AllocError::InvalidPointer`].
  ///
  /// # Safety
  ///
  /// `ptr` must have been returned by [`allocate`](Self::allocate) on this
  /// allocator since the last `init`/`reset`, and must not have been freed
  /// already. The checks above catch most violations, but a forged pointer
  /// whose header bytes happen to look valid corrupts the free list.
  pub unsafe fn free(
    &mut self,
    ptr: NonNull<u8>,
  ) -> Result<(), AllocError> {
    let State { arena, free_list } = self.state.as_mut().ok_or(AllocError::NotInitialized)?;
    let address = ptr.as_ptr() as usize;

    let offset = arena
      .offset_of(address)
      .ok_or_else(|| AllocError::invalid_pointer(address, "outside of the arena"))?;

    if offset < HEADER_SIZE || address % MIN_ALIGNMENT != 0 {
      return Err(AllocError::invalid_pointer(address, "not a payload address"));
    }

    let header_offset = offset - HEADER_SIZE;
    let header: AllocationHeader = arena.read(header_offset);

    let start = header_offset.checked_sub(header.padding).ok_or_else(|| {
      AllocError::invalid_pointer(address, "header padding points before the arena")
    })?;
    let end = start
      .checked_add(header.block_size)
      .filter(|&end| end <= arena.capacity())
      .ok_or_else(|| {
        AllocError::invalid_pointer(address, "header block size overruns the arena")
      })?;

    if header.block_size < header.padding + HEADER_SIZE + MIN_ALLOCATION_SIZE
      || header.block_size > arena.used()
    {
      return Err(AllocError::invalid_pointer(address, "header is corrupted"));
    }

    // Find the neighbours, rejecting spans that overlap something already free.
    let mut prev = None;
    let mut next = NIL;
    for cursor in free_list.iter(arena) {
      if cursor.offset >= end {
        next = cursor.offset;
        break;
      }
      if cursor.end() > start {
        return Err(AllocError::invalid_pointer(address, "span is already free"));
      }
      prev = Some(cursor.offset);
    }

    free_list.insert(arena, prev, start, header.block_size);
    debug_assert_eq!(arena.read::<FreeRegion>(start).next, next);
    arena.reclaim(header.block_size);

    log::trace!(
      "free {address:#x}: region {:#x} block {} used {}",
      arena.base() + start,
      header.block_size,
      arena.used()
    );

    coalesce(arena, free_list, prev, start);

    Ok(())
  }

  /// Bytes currently handed out, headers and padding included.
  pub fn used_bytes(&self) -> usize {
    self.state.as_ref().map_or(0, |state| state.arena.used())
  }

  /// Highest value [`used_bytes`](Self::used_bytes) reached since the last
  /// reset.
  pub fn peak_bytes(&self) -> usize {
    self.state.as_ref().map_or(0, |state| state.arena.peak())
  }

  /// Bytes held by free regions.
  pub fn free_bytes(&self) -> usize {
    self.free_regions().iter().map(|span| span.size).sum()
  }

  /// The free regions in address order.
  pub fn free_regions(&self) -> Vec<Span> {
    let Some(State { arena, free_list }) = self.state.as_ref() else {
      return Vec::new();
    };

    let mut spans = Vec::with_capacity(free_list.len());
    spans.extend(free_list.iter(arena).map(|cursor| Span {
      start: arena.base() + cursor.offset,
      size: cursor.region.size,
    }));
    spans
  }

  /// Start of the arena, if one is reserved.
  pub fn arena_start(&self) -> Option<NonNull<u8>> {
    self.state.as_ref().map(|state| state.arena.ptr_at(0))
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn policy(&self) -> Policy {
    self.policy
  }

  pub fn is_initialized(&self) -> bool {
    self.state.is_some()
  }
}

fn check_capacity(
  capacity: usize,
) -> Result<(), AllocError> {
  if capacity < FREE_REGION_SIZE {
    return Err(AllocError::invalid_argument(format!(
      "capacity {capacity} cannot hold a free region of {FREE_REGION_SIZE} bytes"
    )));
  }

  Ok(())
}

/// Merges the region at `offset` with its successor and then with `prev`, when
/// they touch.
fn coalesce(
  arena: &mut Arena,
  free_list: &mut FreeList,
  prev: Option<usize>,
  offset: usize,
) {
  let mut node: FreeRegion = arena.read(offset);

  if node.next != NIL && offset + node.size == node.next {
    let next: FreeRegion = arena.read(node.next);

    log::trace!("merge {:#x} with next {:#x}", arena.base() + offset, arena.base() + node.next);

    free_list.remove(arena, Some(offset), node.next);
    node.size += next.size;
    free_list.resize(arena, offset, node.size);
  }

  if let Some(prev) = prev {
    let before: FreeRegion = arena.read(prev);

    if prev + before.size == offset {
      log::trace!("merge {:#x} with prev {:#x}", arena.base() + offset, arena.base() + prev);

      free_list.remove(arena, Some(prev), offset);
      free_list.resize(arena, prev, before.size + node.size);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const CAPACITY: usize = 4096 * 40;

  fn allocator(
    policy: Policy,
  ) -> FreeListAllocator {
    let mut allocator = FreeListAllocator::new(CAPACITY, policy);
    allocator.init().unwrap();
    allocator
  }

  fn offsets(
    allocator: &FreeListAllocator,
  ) -> Vec<(usize, usize)> {
    let base = allocator.arena_start().unwrap().as_ptr() as usize;

    allocator
      .free_regions()
      .iter()
      .map(|span| (span.start - base, span.size))
      .collect()
  }

  #[test]
  fn test_init_yields_single_region() {
    let allocator = allocator(Policy::FirstFit);

    assert_eq!(offsets(&allocator), vec![(0, CAPACITY)]);
    assert_eq!(allocator.used_bytes(), 0);
    assert_eq!(allocator.peak_bytes(), 0);
  }

  #[test]
  fn test_allocate_splits_front_of_region() {
    let mut allocator = allocator(Policy::FirstFit);

    let ptr = allocator.allocate(512, 8).unwrap();
    let base = allocator.arena_start().unwrap().as_ptr() as usize;

    assert_eq!(ptr.as_ptr() as usize, base + HEADER_SIZE);
    assert_eq!(allocator.used_bytes(), 512 + HEADER_SIZE);
    assert_eq!(
      offsets(&allocator),
      vec![(512 + HEADER_SIZE, CAPACITY - 512 - HEADER_SIZE)]
    );
  }

  #[test]
  fn test_allocate_and_free_restores_arena() {
    let mut allocator = allocator(Policy::FirstFit);

    let ptr = allocator.allocate(512, 8).unwrap();
    unsafe { allocator.free(ptr).unwrap() };

    assert_eq!(offsets(&allocator), vec![(0, CAPACITY)]);
    assert_eq!(allocator.used_bytes(), 0);
    assert_eq!(allocator.peak_bytes(), 512 + HEADER_SIZE);
  }

  #[test]
  fn test_alignment_padding_is_recovered_on_free() {
    let mut allocator = allocator(Policy::FirstFit);

    let a = allocator.allocate(24, 8).unwrap();
    let b = allocator.allocate(64, 256).unwrap();

    assert_eq!(b.as_ptr() as usize % 256, 0);

    unsafe { allocator.free(b).unwrap() };
    assert_eq!(allocator.used_bytes(), 24 + HEADER_SIZE);

    unsafe { allocator.free(a).unwrap() };
    assert_eq!(offsets(&allocator), vec![(0, CAPACITY)]);
  }

  #[test]
  fn test_tiny_remainder_is_absorbed() {
    let mut allocator = FreeListAllocator::new(64, Policy::FirstFit);
    allocator.init().unwrap();

    // 64 - (40 + header) leaves less than a free region record.
    let ptr = allocator.allocate(40, 8).unwrap();

    assert!(allocator.free_regions().is_empty());
    assert_eq!(allocator.used_bytes(), 64);

    unsafe { allocator.free(ptr).unwrap() };
    assert_eq!(offsets(&allocator), vec![(0, 64)]);
  }

  #[test]
  fn test_exhaustion_fails_without_mutation() {
    let mut allocator = FreeListAllocator::new(256, Policy::BestFit);
    allocator.init().unwrap();

    allocator.allocate(100, 8).unwrap();
    let before = allocator.free_regions();

    let err = allocator.allocate(200, 8).unwrap_err();

    assert!(matches!(err, AllocError::AllocationFailed { size: 200, alignment: 8 }));
    assert_eq!(allocator.free_regions(), before);
    assert_eq!(allocator.used_bytes(), 100 + HEADER_SIZE);
  }

  #[test]
  fn test_invalid_arguments() {
    let mut allocator = allocator(Policy::FirstFit);

    for (size, alignment) in [(MIN_ALLOCATION_SIZE - 1, 8), (64, 4), (64, 24), (64, 0)] {
      let err = allocator.allocate(size, alignment).unwrap_err();
      assert!(matches!(err, AllocError::InvalidArgument { .. }), "{size}/{alignment}");
    }

    assert_eq!(offsets(&allocator), vec![(0, CAPACITY)]);
  }

  #[test]
  fn test_uninitialized() {
    let mut allocator = FreeListAllocator::new(1024, Policy::FirstFit);

    assert!(matches!(allocator.allocate(64, 8), Err(AllocError::NotInitialized)));
    assert!(allocator.free_regions().is_empty());
    assert_eq!(allocator.used_bytes(), 0);
    assert!(!allocator.is_initialized());
  }

  #[test]
  fn test_capacity_too_small() {
    let mut allocator = FreeListAllocator::new(FREE_REGION_SIZE - 1, Policy::FirstFit);

    assert!(matches!(allocator.init(), Err(AllocError::InvalidArgument { .. })));
    assert!(!allocator.is_initialized());
  }

  #[test]
  fn test_double_free_is_rejected() {
    let mut allocator = allocator(Policy::FirstFit);

    let a = allocator.allocate(64, 8).unwrap();
    let _b = allocator.allocate(64, 8).unwrap();

    unsafe {
      allocator.free(a).unwrap();
      let before = allocator.free_regions();

      let err = allocator.free(a).unwrap_err();
      assert!(matches!(err, AllocError::InvalidPointer { .. }));
      assert_eq!(allocator.free_regions(), before);
    }
  }

  #[test]
  fn test_foreign_pointer_is_rejected() {
    let mut allocator = allocator(Policy::FirstFit);
    let mut local = 0u64;

    let err = unsafe { allocator.free(NonNull::from(&mut local).cast()) }.unwrap_err();
    assert!(matches!(err, AllocError::InvalidPointer { .. }));

    // Inside the arena but never handed out: the header bytes are zero.
    let base = allocator.arena_start().unwrap();
    let err = unsafe { allocator.free(base.add(64)) }.unwrap_err();
    assert!(matches!(err, AllocError::InvalidPointer { .. }));

    assert_eq!(offsets(&allocator), vec![(0, CAPACITY)]);
  }

  #[test]
  fn test_merge_with_both_neighbours() {
    let mut allocator = allocator(Policy::FirstFit);

    let a = allocator.allocate(64, 8).unwrap();
    let b = allocator.allocate(64, 8).unwrap();
    let c = allocator.allocate(64, 8).unwrap();
    let _d = allocator.allocate(64, 8).unwrap();
    let block = 64 + HEADER_SIZE;

    unsafe {
      allocator.free(a).unwrap();
      allocator.free(c).unwrap();
      assert_eq!(
        offsets(&allocator),
        vec![(0, block), (2 * block, block), (4 * block, CAPACITY - 4 * block)]
      );

      allocator.free(b).unwrap();
      assert_eq!(
        offsets(&allocator),
        vec![(0, 3 * block), (4 * block, CAPACITY - 4 * block)]
      );
    }
  }

  #[test]
  fn test_reset_discards_allocations() {
    let mut allocator = allocator(Policy::BestFit);

    for _ in 0..10 {
      allocator.allocate(128, 16).unwrap();
    }
    allocator.reset();

    assert_eq!(offsets(&allocator), vec![(0, CAPACITY)]);
    assert_eq!(allocator.used_bytes(), 0);
    assert_eq!(allocator.peak_bytes(), 0);
  }

  #[test]
  fn test_reinit_replaces_arena() {
    let mut allocator = allocator(Policy::FirstFit);
    allocator.allocate(1024, 8).unwrap();

    allocator.init_with_capacity(8192).unwrap();

    assert_eq!(allocator.capacity(), 8192);
    assert_eq!(offsets(&allocator), vec![(0, 8192)]);
    assert_eq!(allocator.used_bytes(), 0);

    allocator.release();
    assert!(!allocator.is_initialized());
    assert!(matches!(allocator.allocate(64, 8), Err(AllocError::NotInitialized)));
  }

  #[test]
  fn test_rejected_reinit_keeps_arena() {
    let mut allocator = allocator(Policy::FirstFit);
    let ptr = allocator.allocate(1024, 8).unwrap();
    let regions = allocator.free_regions();

    let err = allocator.init_with_capacity(0).unwrap_err();

    assert!(matches!(err, AllocError::InvalidArgument { .. }));
    assert!(allocator.is_initialized());
    assert_eq!(allocator.capacity(), CAPACITY);
    assert_eq!(allocator.free_regions(), regions);
    assert_eq!(allocator.used_bytes(), 1024 + HEADER_SIZE);

    unsafe { allocator.free(ptr).unwrap() };
    assert_eq!(offsets(&allocator), vec![(0, CAPACITY)]);
  }

  #[test]
  fn test_payload_is_writable() {
    let mut allocator = allocator(Policy::FirstFit);

    let a = allocator.allocate(64, 8).unwrap();
    let b = allocator.allocate(64, 8).unwrap();

    unsafe {
      std::ptr::write_bytes(a.as_ptr(), 0xAA, 64);
      std::ptr::write_bytes(b.as_ptr(), 0xBB, 64);

      assert!(std::slice::from_raw_parts(a.as_ptr(), 64).iter().all(|&x| x == 0xAA));

      allocator.free(a).unwrap();
      allocator.free(b).unwrap();
    }

    assert_eq!(offsets(&allocator), vec![(0, CAPACITY)]);
  }
}
