use std::mem;

/// Sentinel `next` value marking the tail of the free list.
pub const NIL: usize = usize::MAX;

/// Minimum alignment accepted by `allocate`.
pub const MIN_ALIGNMENT: usize = 8;

pub const FREE_REGION_SIZE: usize = mem::size_of::<FreeRegion>();

pub const HEADER_SIZE: usize = mem::size_of::<AllocationHeader>();

/// Smallest payload `allocate` accepts. The span must be able to hold a
/// [`FreeRegion`] once it is released.
pub const MIN_ALLOCATION_SIZE: usize = FREE_REGION_SIZE;

/// Plain records stored inside arena bytes.
///
/// # Safety
///
/// Implementors must be `repr(C)`, contain only integers and accept every bit
/// pattern as a valid value, so they can be read back from any initialized
/// arena bytes.
pub(crate) unsafe trait Record: Copy {}

/// Node written at the start of every free span.
///
/// `next` is the arena offset of the following free region, or [`NIL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct FreeRegion {
  pub size: usize,
  pub next: usize,
}

impl FreeRegion {
  pub fn new(
    size: usize,
    next: usize,
  ) -> Self {
    Self { size, next }
  }
}

unsafe impl Record for FreeRegion {}

/// Written immediately before every payload handed out by the allocator.
///
/// `block_size` is the whole span taken from the free list, `padding` the
/// bytes between the start of that span and this header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct AllocationHeader {
  pub block_size: usize,
  pub padding: usize,
}

impl AllocationHeader {
  pub fn new(
    block_size: usize,
    padding: usize,
  ) -> Self {
    Self { block_size, padding }
  }
}

unsafe impl Record for AllocationHeader {}
