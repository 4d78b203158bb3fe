//! # Kernel Physical Page Allocator
//!
//! This crate hands out contiguous runs of 4 KiB physical frames and takes
//! them back. It is the page supply for everything above it: page-table
//! allocation, the virtual memory manager and the kernel heap.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │          PageAllocator (trait)                      │
//! │    • register_region / allocate / release           │
//! │    • free_page_count / self_check                   │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │          FirstFitAllocator                          │
//! │    • Address-ordered free list of block heads       │
//! │    • First-fit search, split on allocation          │
//! │    • Coalescing with both neighbours on release     │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │          PageStore (externally owned)               │
//! │    • One Page descriptor per physical frame         │
//! │    • Indexed by FrameNumber                         │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Free List
//!
//! A free run of pages is represented by its lowest page, the *block head*.
//! Only the head carries the run length and only heads are linked into the
//! free list. Links are frame numbers stored in the descriptors themselves;
//! the list never allocates. Blocks are kept sorted by address and are never
//! adjacent: releasing a run merges it with the free blocks directly below
//! and above.
//!
//! ```text
//! frames:  0    4         10   13        20
//!          [####|.........|####|.........]
//!                ^ head(6)      ^ head(7)
//! free list: sentinel -> 4 -> 13 -> sentinel, free total = 13
//! ```
//!
//! ## Errors
//!
//! Running out of memory is an ordinary, recoverable result of
//! [`FirstFitAllocator::allocate`]. Everything else is an
//! [`InvariantViolation`]: releasing a free page, releasing an unmanaged page
//! or finding a corrupted list. The allocator reports it and the kernel is
//! expected to stop.
//!
//! ## Concurrency
//!
//! There is no internal locking. A kernel that shares the allocator between
//! cores or with interrupt handlers keeps it behind one lock.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_pmm::{FirstFitAllocator, FrameNumber, Page, PageArray};
//!
//! let mut pages = [Page::new(); 128];
//! let base = FrameNumber::new(0x100);
//! let mut pmm = FirstFitAllocator::new(PageArray::new(base, &mut pages));
//!
//! pmm.register_region(base, 100).unwrap();
//! let run = pmm.allocate(5).unwrap();
//! assert_eq!(run, base);
//! assert_eq!(pmm.free_page_count(), 95);
//!
//! pmm.release(run, 5).unwrap();
//! assert_eq!(pmm.free_page_count(), 100);
//! assert_eq!(pmm.free_block_count(), 1);
//! ```
//!
//! ## Features
//!
//! - `verify-each-op`: walk the whole free list after every mutating call
//!   and report any structural damage as that call's error.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod check;
mod error;
mod first_fit;
mod frame;
mod free_list;
mod manager;
mod page;
mod store;

pub use error::{InvariantViolation, PmmError};
pub use first_fit::FirstFitAllocator;
pub use frame::{FrameNumber, FrameRange, PAGE_SHIFT, PAGE_SIZE, PhysicalAddress};
pub use free_list::{Blocks, FreeBlock};
pub use manager::{ALLOCATOR_NAME, PageAllocator};
pub use page::{Page, PageFlags};
pub use store::{PageArray, PageStore};
