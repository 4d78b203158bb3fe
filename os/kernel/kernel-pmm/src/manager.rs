//! # Page Allocator Interface
//!
//! The seam between the physical memory manager and whatever allocation
//! strategy backs it. Boot code registers regions through it, and the
//! virtual memory layer and kernel heap draw pages from it without knowing
//! which allocator sits behind.

use crate::{
    FirstFitAllocator, FrameNumber, InvariantViolation, PageStore, PhysicalAddress, PmmError,
};

/// Name reported by [`FirstFitAllocator`].
pub const ALLOCATOR_NAME: &str = "first_fit_page_allocator";

/// A physical page allocator handing out contiguous runs of frames.
///
/// Implementations are not synchronized; callers serialize access.
pub trait PageAllocator {
    /// Human-readable name of the allocation strategy.
    fn name(&self) -> &'static str;

    /// Hand a run of unmanaged frames over to the allocator.
    ///
    /// # Errors
    /// Malformed or already managed regions.
    fn register_region(&mut self, base: FrameNumber, count: usize)
    -> Result<(), InvariantViolation>;

    /// Allocate `count` contiguous frames.
    ///
    /// # Errors
    /// [`PmmError::OutOfMemory`] when no run is long enough.
    fn allocate(&mut self, count: usize) -> Result<FrameNumber, PmmError>;

    /// Return a run previously obtained from [`allocate`](Self::allocate).
    ///
    /// # Errors
    /// Double frees and other contract breaches.
    fn release(&mut self, base: FrameNumber, count: usize) -> Result<(), InvariantViolation>;

    /// Number of free frames.
    fn free_page_count(&self) -> usize;

    /// Run the allocator's self-consistency check.
    ///
    /// # Errors
    /// The first violated invariant or failed scripted step.
    fn self_check(&mut self) -> Result<(), InvariantViolation>;

    /// Allocate a single frame.
    ///
    /// # Errors
    /// See [`allocate`](Self::allocate).
    fn allocate_page(&mut self) -> Result<FrameNumber, PmmError> {
        self.allocate(1)
    }

    /// Release a single frame.
    ///
    /// # Errors
    /// See [`release`](Self::release).
    fn release_page(&mut self, frame: FrameNumber) -> Result<(), InvariantViolation> {
        self.release(frame, 1)
    }

    /// Allocate `count` contiguous frames and return the physical address of the first.
    ///
    /// # Errors
    /// See [`allocate`](Self::allocate).
    fn allocate_address(&mut self, count: usize) -> Result<PhysicalAddress, PmmError> {
        self.allocate(count).map(FrameNumber::start_address)
    }
}

impl<S: PageStore> PageAllocator for FirstFitAllocator<S> {
    fn name(&self) -> &'static str {
        ALLOCATOR_NAME
    }

    fn register_region(
        &mut self,
        base: FrameNumber,
        count: usize,
    ) -> Result<(), InvariantViolation> {
        Self::register_region(self, base, count)
    }

    fn allocate(&mut self, count: usize) -> Result<FrameNumber, PmmError> {
        Self::allocate(self, count)
    }

    fn release(&mut self, base: FrameNumber, count: usize) -> Result<(), InvariantViolation> {
        Self::release(self, base, count)
    }

    fn free_page_count(&self) -> usize {
        Self::free_page_count(self)
    }

    fn self_check(&mut self) -> Result<(), InvariantViolation> {
        Self::self_check(self)
    }
}
