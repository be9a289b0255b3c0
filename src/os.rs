use std::{io, ptr, ptr::NonNull};

/// Anonymous read/write memory obtained from the OS, returned on drop.
///
/// This is the reserve/commit/release capability both allocators sit on.
/// The pages are committed eagerly and start zeroed.
#[derive(Debug)]
pub(crate) struct Mapping {
  ptr: NonNull<u8>,
  len: usize,
}

// SAFETY: the mapping is owned exclusively; moving the owner to another thread
// moves the only handle to the memory with it.
unsafe impl Send for Mapping {}

impl Mapping {
  pub fn reserve(
    len: usize,
  ) -> io::Result<Self> {
    if len == 0 {
      return Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        "cannot map an empty region",
      ));
    }

    let address = unsafe {
      libc::mmap(
        ptr::null_mut(),
        len,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if address == libc::MAP_FAILED {
      return Err(io::Error::last_os_error());
    }

    let ptr = NonNull::new(address.cast::<u8>())
      .ok_or_else(|| io::Error::other("mmap returned a null mapping"))?;

    Ok(Self { ptr, len })
  }

  pub fn as_ptr(&self) -> *mut u8 {
    self.ptr.as_ptr()
  }

  pub fn as_non_null(&self) -> NonNull<u8> {
    self.ptr
  }

  pub fn addr(&self) -> usize {
    self.ptr.as_ptr() as usize
  }

  pub fn len(&self) -> usize {
    self.len
  }

  /// Whether `address` falls inside the mapping.
  pub fn contains(
    &self,
    address: usize,
  ) -> bool {
    address >= self.addr() && address - self.addr() < self.len
  }
}

impl Drop for Mapping {
  fn drop(&mut self) {
    let result = unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) };

    if result != 0 {
      log::warn!(
        "munmap({:p}, {}) failed: {}",
        self.ptr,
        self.len,
        io::Error::last_os_error()
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_reserve_is_zeroed_and_writable() {
    let mapping = Mapping::reserve(4096).unwrap();

    unsafe {
      let bytes = std::slice::from_raw_parts_mut(mapping.as_ptr(), mapping.len());
      assert!(bytes.iter().all(|&b| b == 0));

      bytes[0] = 0xAB;
      bytes[4095] = 0xCD;
      assert_eq!(bytes[0], 0xAB);
      assert_eq!(bytes[4095], 0xCD);
    }
  }

  #[test]
  fn test_reserve_is_page_aligned() {
    let mapping = Mapping::reserve(100).unwrap();

    assert_eq!(mapping.addr() % 4096, 0);
    assert!(mapping.contains(mapping.addr()));
    assert!(mapping.contains(mapping.addr() + 99));
    assert!(!mapping.contains(mapping.addr() + 100));
    assert!(!mapping.contains(mapping.addr() - 1));
  }

  #[test]
  fn test_reserve_empty_is_rejected() {
    let err = Mapping::reserve(0).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
  }
}
