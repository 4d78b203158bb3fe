//! # Page Descriptors
//!
//! One [`Page`] exists per physical frame. The array of descriptors is owned
//! by whoever discovered physical memory; the allocator only flips the fields
//! below and threads free-block heads together through [`FreeListLink`].

use crate::FrameNumber;
use bitfield_struct::bitfield;

/// State bits of a page descriptor.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct PageFlags {
    /// Frame went through region registration (bit 0). Never cleared again.
    pub managed: bool,
    /// Frame is the lowest page of a free run and is linked into the free list (bit 1).
    pub free_head: bool,
    /// Reserved for owners of allocated pages (bits 2..7).
    #[bits(6)]
    __: u8,
}

/// Back/forward references of a free-block head.
///
/// `None` refers to the sentinel of the owning free list, which makes the
/// list circular without a dedicated sentinel descriptor.
#[derive(Copy, Clone, Default, Eq, PartialEq, Debug)]
pub struct FreeListLink {
    pub prev: Option<FrameNumber>,
    pub next: Option<FrameNumber>,
}

impl FreeListLink {
    /// A link that points at the sentinel in both directions.
    pub const DETACHED: Self = Self {
        prev: None,
        next: None,
    };
}

/// Descriptor of one physical frame.
#[derive(Copy, Clone, Default, Eq, PartialEq, Debug)]
pub struct Page {
    ref_count: u32,
    flags: PageFlags,
    /// Pages in the free run; meaningful only while `flags.free_head()` is set.
    block_length: usize,
    link: FreeListLink,
}

impl Page {
    /// An unmanaged, unreferenced frame.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ref_count: 0,
            flags: PageFlags::new(),
            block_length: 0,
            link: FreeListLink::DETACHED,
        }
    }

    /// Number of external owners. The allocator resets it but never reads it.
    #[inline]
    #[must_use]
    pub const fn ref_count(&self) -> u32 {
        self.ref_count
    }

    #[inline]
    pub const fn set_ref_count(&mut self, count: u32) {
        self.ref_count = count;
    }

    #[inline]
    #[must_use]
    pub const fn flags(&self) -> PageFlags {
        self.flags
    }

    #[inline]
    #[must_use]
    pub const fn is_managed(&self) -> bool {
        self.flags.managed()
    }

    #[inline]
    #[must_use]
    pub const fn is_free_block_head(&self) -> bool {
        self.flags.free_head()
    }

    /// Length of the free run headed by this page, `None` if it is not a head.
    #[inline]
    #[must_use]
    pub const fn block_length(&self) -> Option<usize> {
        if self.flags.free_head() {
            Some(self.block_length)
        } else {
            None
        }
    }

    #[inline]
    pub(crate) const fn raw_block_length(&self) -> usize {
        self.block_length
    }

    #[inline]
    pub(crate) const fn link(&self) -> FreeListLink {
        self.link
    }

    #[inline]
    pub(crate) const fn link_mut(&mut self) -> &mut FreeListLink {
        &mut self.link
    }

    /// Take the frame into the allocator's domain in the allocated state.
    pub(crate) const fn adopt(&mut self) {
        self.reset();
        self.flags.set_managed(true);
    }

    /// Drop every free-list property; `managed` is kept.
    pub(crate) const fn reset(&mut self) {
        self.ref_count = 0;
        self.clear_head();
    }

    pub(crate) const fn make_head(&mut self, length: usize) {
        self.flags.set_free_head(true);
        self.block_length = length;
    }

    pub(crate) const fn set_block_length(&mut self, length: usize) {
        self.block_length = length;
    }

    pub(crate) const fn clear_head(&mut self) {
        self.flags.set_free_head(false);
        self.block_length = 0;
        self.link = FreeListLink::DETACHED;
    }
}
