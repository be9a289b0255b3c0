use std::{io, mem, ptr, ptr::NonNull};

use crate::{block::Record, os::Mapping};

/// The byte range owned by a [`FreeListAllocator`](crate::FreeListAllocator)
/// together with its usage counters.
///
/// Records are addressed by offset from the arena base. Reads and writes are
/// bounds checked and tolerate unaligned offsets, since a free region may start
/// right after an odd-sized allocation.
#[derive(Debug)]
pub(crate) struct Arena {
  mapping: Mapping,
  used: usize,
  peak: usize,
}

impl Arena {
  pub fn reserve(
    capacity: usize,
  ) -> io::Result<Self> {
    Ok(Self {
      mapping: Mapping::reserve(capacity)?,
      used: 0,
      peak: 0,
    })
  }

  pub fn base(&self) -> usize {
    self.mapping.addr()
  }

  pub fn capacity(&self) -> usize {
    self.mapping.len()
  }

  /// Pointer to the byte at `offset`, carrying the mapping's provenance.
  pub fn ptr_at(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    assert!(offset <= self.capacity());

    // SAFETY: `offset` is at most one past the end of the mapping.
    unsafe { self.mapping.as_non_null().add(offset) }
  }

  /// Translates an absolute address into an arena offset.
  pub fn offset_of(
    &self,
    address: usize,
  ) -> Option<usize> {
    self
      .mapping
      .contains(address)
      .then(|| address - self.base())
  }

  pub fn read<R: Record>(
    &self,
    offset: usize,
  ) -> R {
    self.check_bounds::<R>(offset);

    // SAFETY: the range is inside the mapping, which is always initialized
    // memory, and `Record` types are valid for every bit pattern.
    unsafe { ptr::read_unaligned(self.mapping.as_ptr().add(offset).cast::<R>()) }
  }

  pub fn write<R: Record>(
    &mut self,
    offset: usize,
    record: R,
  ) {
    self.check_bounds::<R>(offset);

    // SAFETY: the range is inside the mapping, which we own exclusively.
    unsafe { ptr::write_unaligned(self.mapping.as_ptr().add(offset).cast::<R>(), record) }
  }

  /// Bytes handed out, headers and padding included.
  pub fn used(&self) -> usize {
    self.used
  }

  pub fn peak(&self) -> usize {
    self.peak
  }

  pub fn commit(
    &mut self,
    bytes: usize,
  ) {
    self.used += bytes;
    self.peak = self.peak.max(self.used);
  }

  /// Gives back `bytes` previously passed to [`commit`](Self::commit).
  pub fn reclaim(
    &mut self,
    bytes: usize,
  ) {
    debug_assert!(bytes <= self.used);
    self.used -= bytes;
  }

  pub fn reset_usage(&mut self) {
    self.used = 0;
    self.peak = 0;
  }

  fn check_bounds<R: Record>(
    &self,
    offset: usize,
  ) {
    let end = offset.checked_add(mem::size_of::<R>());

    assert!(
      end.is_some_and(|end| end <= self.capacity()),
      "record at offset {offset} overruns arena of {} bytes",
      self.capacity()
    );
  }
}
