use std::io;

use thiserror::Error;

/// Errors reported by [`FreeListAllocator`](crate::FreeListAllocator) and
/// [`PoolAllocator`](crate::PoolAllocator).
///
/// Every variant except [`AllocError::Reserve`] is raised before the
/// allocator touches its bookkeeping, so a failed call leaves it unchanged.
#[derive(Debug, Error)]
pub enum AllocError {
  /// A size, alignment or capacity argument can never be satisfied.
  #[error("invalid argument: {reason}")]
  InvalidArgument { reason: String },

  /// No free region is large enough for the request.
  #[error("allocation of {size} bytes aligned to {alignment} failed: no free region fits")]
  AllocationFailed { size: usize, alignment: usize },

  /// `free` was given a pointer this allocator did not hand out, or one that
  /// was already released.
  #[error("invalid pointer {address:#x}: {reason}")]
  InvalidPointer { address: usize, reason: &'static str },

  /// The allocator has no arena; call `init` first.
  #[error("allocator is not initialized")]
  NotInitialized,

  /// The OS refused to provide backing memory.
  #[error("failed to reserve backing memory: {0}")]
  Reserve(#[from] io::Error),
}

impl AllocError {
  pub(crate) fn invalid_argument(
    reason: impl Into<String>,
  ) -> Self {
    Self::InvalidArgument {
      reason: reason.into(),
    }
  }

  pub(crate) fn invalid_pointer(
    address: usize,
    reason: &'static str,
  ) -> Self {
    log::warn!("rejected pointer {address:#x}: {reason}");
    Self::InvalidPointer { address, reason }
  }
}
