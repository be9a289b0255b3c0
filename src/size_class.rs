use std::{collections::HashMap, ptr::NonNull};

use crate::{error::AllocError, os::Mapping, pool::PoolAllocator};

/// Chunk sizes served from pools. Anything larger gets its own mapping.
pub const SIZE_CLASSES: [usize; 4] = [8, 32, 128, 512];

/// Routes variable-sized requests to a [`PoolAllocator`] per size class.
///
/// ```text
///   alloc(20) ──► class 32  ──► PoolAllocator(32)
///   alloc(500) ─► class 512 ──► PoolAllocator(512)
///   alloc(600) ─► too large ──► dedicated mapping
/// ```
///
/// The caller passes the same size back to [`free`](Self::free) so the
/// pointer can be routed without a header.
#[derive(Debug)]
pub struct SizeClassPool {
  pools: Vec<PoolAllocator>,
  large: HashMap<usize, Mapping>,
}

impl SizeClassPool {
  pub fn new() -> Result<Self, AllocError> {
    let pools = SIZE_CLASSES
      .iter()
      .map(|&class| PoolAllocator::new(class))
      .collect::<Result<Vec<_>, _>>()?;

    log::debug!("size class pool ready with classes {SIZE_CLASSES:?}");

    Ok(Self {
      pools,
      large: HashMap::new(),
    })
  }

  /// Allocates at least `size` bytes, word aligned.
  ///
  /// # Errors
  ///
  /// - [`AllocError::InvalidArgument`] for a zero size.
  /// - [`AllocError::Reserve`] when the OS refuses more memory.
  pub fn alloc(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      return Err(AllocError::invalid_argument("size must be non-zero"));
    }

    if let Some(index) = class_index(size) {
      return self.pools[index].alloc();
    }

    let mapping = Mapping::reserve(size)?;
    let ptr = mapping.as_non_null();
    self.large.insert(mapping.addr(), mapping);

    log::trace!("size class alloc {size} bytes at {ptr:p} (dedicated mapping)");
    Ok(ptr)
  }

  /// Returns memory obtained from [`alloc`](Self::alloc) with the same
  /// `size`. Dedicated mappings go straight back to the OS.
  ///
  /// # Safety
  ///
  /// `size` must be the size passed to `alloc` for `ptr`, and the memory must
  /// not be touched afterwards.
  pub unsafe fn free(
    &mut self,
    ptr: NonNull<u8>,
    size: usize,
  ) -> Result<(), AllocError> {
    let address = ptr.as_ptr() as usize;

    match class_index(size) {
      // SAFETY: forwarded from the caller.
      Some(index) => unsafe { self.pools[index].free(ptr) },
      None if size == 0 => Err(AllocError::invalid_pointer(address, "freed with size 0")),
      None => {
        let mapping = self
          .large
          .remove(&address)
          .ok_or_else(|| AllocError::invalid_pointer(address, "not a large allocation"))?;

        log::trace!("size class free {} bytes at {ptr:p} (dedicated mapping)", mapping.len());
        Ok(())
      }
    }
  }

  /// Pool backing the class that serves `size`, if any.
  pub fn pool_for(
    &self,
    size: usize,
  ) -> Option<&PoolAllocator> {
    class_index(size).map(|index| &self.pools[index])
  }

  /// Allocations currently held in dedicated mappings.
  pub fn large_allocations(&self) -> usize {
    self.large.len()
  }
}

fn class_index(
  size: usize,
) -> Option<usize> {
  if size == 0 {
    return None;
  }

  SIZE_CLASSES.iter().position(|&class| size <= class)
}
