//! # Page Descriptor Store
//!
//! The allocator does not own the descriptor array. Whoever enumerated
//! physical memory hands it over through [`PageStore`]; [`PageArray`] is the
//! flat-array implementation used by the kernel and the tests.

use crate::{FrameNumber, FrameRange, InvariantViolation, Page};

/// Frame-indexed access to page descriptors.
///
/// Implementations must return the same descriptor for the same frame for as
/// long as the allocator holds the store; slots are never created or removed.
pub trait PageStore {
    /// Frames described by this store.
    fn frames(&self) -> FrameRange;

    /// Descriptor of `frame`, or `None` if the store does not describe it.
    fn page(&self, frame: FrameNumber) -> Option<&Page>;

    /// Mutable descriptor of `frame`, or `None` if the store does not describe it.
    fn page_mut(&mut self, frame: FrameNumber) -> Option<&mut Page>;
}

/// A contiguous slice of descriptors whose first slot describes `first_frame`.
pub struct PageArray<'a> {
    first_frame: FrameNumber,
    pages: &'a mut [Page],
}

impl<'a> PageArray<'a> {
    /// Wrap `pages`, with `pages[0]` describing `first_frame`.
    #[must_use]
    pub const fn new(first_frame: FrameNumber, pages: &'a mut [Page]) -> Self {
        Self { first_frame, pages }
    }

    #[inline]
    fn slot(&self, frame: FrameNumber) -> Option<usize> {
        if self.frames().contains(frame) {
            frame.offset_from(self.first_frame)
        } else {
            None
        }
    }
}

impl PageStore for PageArray<'_> {
    /// Slots past the top of the frame space describe nothing.
    fn frames(&self) -> FrameRange {
        FrameRange::with_len(self.first_frame, self.pages.len()).unwrap_or(FrameRange::new(
            self.first_frame,
            FrameNumber::new(usize::MAX),
        ))
    }

    fn page(&self, frame: FrameNumber) -> Option<&Page> {
        self.slot(frame).map(|idx| &self.pages[idx])
    }

    fn page_mut(&mut self, frame: FrameNumber) -> Option<&mut Page> {
        self.slot(frame).map(|idx| &mut self.pages[idx])
    }
}

impl<S: PageStore + ?Sized> PageStore for &mut S {
    fn frames(&self) -> FrameRange {
        (**self).frames()
    }

    fn page(&self, frame: FrameNumber) -> Option<&Page> {
        (**self).page(frame)
    }

    fn page_mut(&mut self, frame: FrameNumber) -> Option<&mut Page> {
        (**self).page_mut(frame)
    }
}

/// Descriptor of `frame`, failing if the store does not describe it.
pub(crate) fn lookup<S: PageStore + ?Sized>(
    store: &S,
    frame: FrameNumber,
) -> Result<&Page, InvariantViolation> {
    store
        .page(frame)
        .ok_or(InvariantViolation::FrameOutOfRange { frame })
}

/// Mutable descriptor of `frame`, failing if the store does not describe it.
pub(crate) fn lookup_mut<S: PageStore + ?Sized>(
    store: &mut S,
    frame: FrameNumber,
) -> Result<&mut Page, InvariantViolation> {
    store
        .page_mut(frame)
        .ok_or(InvariantViolation::FrameOutOfRange { frame })
}
