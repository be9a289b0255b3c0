use std::ptr::NonNull;

use crate::{align, error::AllocError, os::Mapping};

/// Size of every page the pool reserves.
pub const PAGE_SIZE: usize = 4096;

/// Pages reserved up front.
pub const INITIAL_PAGES: usize = 10;

const GOLDEN_RATIO: f64 = 1.618_033_988_749_895;

/// Fixed-size chunk allocator for homogeneous objects.
///
/// Chunks are handed out from a stack of released chunks first, then by
/// bumping through the current page:
///
/// ```text
///   page 0                      page 1 (current)
///   ┌────┬────┬────┬────┐      ┌────┬────┬──────────────┐
///   │ A  │free│ B  │free│      │ C  │ D  │  untouched   │
///   └────┴─┬──┴────┴─┬──┘      └────┴────┴──────────────┘
///          │    ▲    │                   ▲
///          ▼    └────┘                   └── cursor
///         NIL         ◄── free stack head
/// ```
///
/// When every page is used up the pool grows by the golden ratio. It never
/// shares memory with a [`FreeListAllocator`](crate::FreeListAllocator).
#[derive(Debug)]
pub struct PoolAllocator {
  chunk_size: usize,
  pages: Vec<Mapping>,
  current: usize,
  cursor: usize,
  free: Option<NonNull<u8>>,
  live: usize,
}

impl PoolAllocator {
  /// Creates a pool serving chunks of `chunk_size` bytes, rounded up to the
  /// machine word.
  pub fn new(
    chunk_size: usize,
  ) -> Result<Self, AllocError> {
    if chunk_size == 0 || chunk_size > PAGE_SIZE {
      return Err(AllocError::invalid_argument(format!(
        "chunk size {chunk_size} must be between 1 and {PAGE_SIZE}"
      )));
    }

    let mut pool = Self {
      chunk_size: align!(chunk_size),
      pages: Vec::with_capacity(INITIAL_PAGES),
      current: 0,
      cursor: 0,
      free: None,
      live: 0,
    };
    pool.grow(INITIAL_PAGES)?;

    Ok(pool)
  }

  /// Hands out one chunk.
  ///
  /// # Errors
  ///
  /// [`AllocError::Reserve`] if the pool needs another page and the OS
  /// refuses it.
  pub fn alloc(&mut self) -> Result<NonNull<u8>, AllocError> {
    if let Some(chunk) = self.free {
      // SAFETY: chunks on the free stack hold the link written by `free`.
      self.free = unsafe { chunk.cast::<Option<NonNull<u8>>>().read() };
      self.live += 1;

      log::trace!("pool alloc {chunk:p} (reused)");
      return Ok(chunk);
    }

    if self.cursor + self.chunk_size > PAGE_SIZE {
      if self.current + 1 == self.pages.len() {
        let extra = (self.pages.len() as f64 * GOLDEN_RATIO).ceil() as usize;
        self.grow(extra)?;
      }

      self.current += 1;
      self.cursor = 0;
    }

    // SAFETY: `cursor + chunk_size` fits in the page.
    let chunk = unsafe { self.pages[self.current].as_non_null().add(self.cursor) };
    self.cursor += self.chunk_size;
    self.live += 1;

    log::trace!("pool alloc {chunk:p}");
    Ok(chunk)
  }

  /// Returns a chunk to the pool.
  ///
  /// The pointer must sit on a chunk boundary of a page this pool has already
  /// carved, and must not be on the free stack; otherwise
  /// [`AllocError::InvalidPointer`] is returned and nothing changes.
  ///
  /// # Safety
  ///
  /// The caller must not touch the chunk after freeing it.
  pub unsafe fn free(
    &mut self,
    ptr: NonNull<u8>,
  ) -> Result<(), AllocError> {
    let address = ptr.as_ptr() as usize;

    let (page, offset) = self
      .pages
      .iter()
      .enumerate()
      .find(|(_, mapping)| mapping.contains(address))
      .map(|(index, mapping)| (index, address - mapping.addr()))
      .ok_or_else(|| AllocError::invalid_pointer(address, "outside of the pool"))?;

    if offset % self.chunk_size != 0 || offset + self.chunk_size > PAGE_SIZE {
      return Err(AllocError::invalid_pointer(address, "not on a chunk boundary"));
    }

    if page > self.current || (page == self.current && offset >= self.cursor) {
      return Err(AllocError::invalid_pointer(address, "chunk was never handed out"));
    }

    if self.free_chunks().any(|chunk| chunk == ptr) {
      return Err(AllocError::invalid_pointer(address, "chunk is already free"));
    }

    // SAFETY: the chunk belongs to this pool and is word aligned.
    unsafe { ptr.cast::<Option<NonNull<u8>>>().write(self.free) };
    self.free = Some(ptr);
    self.live -= 1;

    log::trace!("pool free {ptr:p}");
    Ok(())
  }

  pub fn chunk_size(&self) -> usize {
    self.chunk_size
  }

  pub fn page_count(&self) -> usize {
    self.pages.len()
  }

  /// Chunks currently handed out.
  pub fn live_chunks(&self) -> usize {
    self.live
  }

  fn grow(
    &mut self,
    pages: usize,
  ) -> Result<(), AllocError> {
    for _ in 0..pages {
      self.pages.push(Mapping::reserve(PAGE_SIZE)?);
    }

    log::debug!(
      "pool of {}-byte chunks grew by {pages} pages to {}",
      self.chunk_size,
      self.pages.len()
    );
    Ok(())
  }

  fn free_chunks(&self) -> impl Iterator<Item = NonNull<u8>> + '_ {
    let mut next = self.free;

    std::iter::from_fn(move || {
      let chunk = next?;
      // SAFETY: chunks on the free stack hold the link written by `free`.
      next = unsafe { chunk.cast::<Option<NonNull<u8>>>().read() };
      Some(chunk)
    })
  }
}
