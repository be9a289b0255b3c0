//! # rfreelist - A Free-List Arena Allocator
//!
//! This crate provides a general purpose **free-list allocator** that manages a
//! single region of memory reserved up front from the OS, plus a small
//! fixed-size **pool allocator** for homogeneous objects, with a size-class
//! router on top of it.
//!
//! ## Overview
//!
//! The arena is always partitioned into spans that are either free or
//! allocated. Free spans are chained, in address order, through nodes stored
//! inside the free bytes themselves:
//!
//! ```text
//!   Free-List Allocator Concept:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                              ARENA                                   │
//!   │                                                                      │
//!   │   ┌──────┬────────┬──────┬──────────┬──────┬────────────────────┐    │
//!   │   │  A1  │  free  │  A2  │   free   │  A3  │        free        │    │
//!   │   └──────┴───┬────┴──────┴────┬─────┴──────┴─────────┬──────────┘    │
//!   │        head ─┘        ▲       │      ▲               │               │
//!   │              └────────┘       └──────┘               └──► NIL        │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Allocation carves a span out of a free region (First-Fit or Best-Fit).
//!   Release puts it back in address order and merges touching neighbours.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rfreelist
//!   ├── align      - Alignment macros (align!, align_to!) and header padding
//!   ├── block      - Free region and allocation header records (internal)
//!   ├── os         - Memory mapping obtained from the OS (internal)
//!   ├── arena      - Arena bytes and usage counters (internal)
//!   ├── free_list  - Address-ordered free region list (internal)
//!   ├── policy     - First-Fit / Best-Fit placement
//!   ├── allocator  - FreeListAllocator implementation
//!   ├── pool       - PoolAllocator implementation
//!   ├── size_class - SizeClassPool routing sizes to pools
//!   └── error      - AllocError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rfreelist::{FreeListAllocator, Policy};
//!
//! let mut allocator = FreeListAllocator::new(4096 * 40, Policy::FirstFit);
//! allocator.init().unwrap();
//!
//! // Allocate 512 bytes aligned to 8
//! let ptr = allocator.allocate(512, 8).unwrap();
//!
//! unsafe {
//!     // Use the memory
//!     ptr.as_ptr().write_bytes(0, 512);
//!
//!     // Free the memory
//!     allocator.free(ptr).unwrap();
//! }
//!
//! assert_eq!(allocator.used_bytes(), 0);
//! assert_eq!(allocator.free_regions().len(), 1);
//! ```
//!
//! ## How It Works
//!
//! Every allocation is preceded by a header recording how much of the free
//! region it consumed and how far the header sits from the region start:
//!
//! ```text
//!   Single Allocation:
//!
//!   region start                     payload (aligned)
//!   │                                │
//!   ▼                                ▼
//!   ┌──────────────┬─────────────────┬──────────────────────┬──────────────┐
//!   │ align padding│     Header      │      User Data       │  remainder   │
//!   │              │ ┌─────────────┐ │                      │ (new free    │
//!   │              │ │ block_size  │ │                      │  region)     │
//!   │              │ │ padding     │ │                      │              │
//!   │              │ └─────────────┘ │                      │              │
//!   └──────────────┴─────────────────┴──────────────────────┴──────────────┘
//!   ◄──────────────────── block_size ───────────────────────►
//! ```
//!
//! Freeing reads the header back, rebuilds the free region from
//! `header - padding` for `block_size` bytes, links it in address order and
//! coalesces it with the regions immediately before and after it.
//!
//! ## Features
//!
//! - **Pluggable placement**: First-Fit or Best-Fit, fixed at construction
//! - **Alignment aware**: any power of two alignment of at least 8 bytes
//! - **Coalescing**: adjacent free regions never stay split after a free
//! - **Checked frees**: foreign and double-freed pointers are reported
//! - **Instrumentation**: used and peak bytes, free region snapshots
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **Fixed capacity**: The arena never grows
//! - **No compaction**: Live allocations are never moved
//! - **Unix-only**: Requires `libc` and `mmap` (POSIX systems)
//!
//! ## Safety
//!
//! Allocating is safe. Freeing is `unsafe`: the allocator validates what it
//! can, but a forged pointer with a plausible header corrupts the free list.

pub mod align;
mod allocator;
mod arena;
mod block;
mod error;
mod free_list;
mod os;
mod policy;
mod pool;
mod size_class;

pub use allocator::{FreeListAllocator, Span};
pub use block::{HEADER_SIZE, MIN_ALIGNMENT, MIN_ALLOCATION_SIZE};
pub use error::AllocError;
pub use policy::Policy;
pub use pool::{INITIAL_PAGES, PAGE_SIZE, PoolAllocator};
pub use size_class::{SIZE_CLASSES, SizeClassPool};
