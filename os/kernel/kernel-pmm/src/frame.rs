//! # Physical Frames and Addresses
//!
//! Thin newtypes that keep frame numbers and physical byte addresses apart.
//! A [`FrameNumber`] counts 4 KiB frames from physical address zero; the
//! descriptor store is indexed by it, and the free list links through it.

use core::fmt;
use core::ops::{Add, AddAssign, Sub};

/// log2 of the frame size, i.e. the number of offset bits in a physical address.
pub const PAGE_SHIFT: u32 = 12;

/// Size of one physical frame in bytes (4 KiB).
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;

/// Physical memory address.
///
/// Carries intent only; the allocator never dereferences it.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Byte offset of this address inside its frame.
    #[inline]
    #[must_use]
    pub const fn frame_offset(self) -> u64 {
        self.0 & (PAGE_SIZE - 1)
    }

    #[inline]
    #[must_use]
    pub const fn is_frame_aligned(self) -> bool {
        self.frame_offset() == 0
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<FrameNumber> for PhysicalAddress {
    #[inline]
    fn from(frame: FrameNumber) -> Self {
        frame.start_address()
    }
}

/// Number of a physical page frame, counted from physical address zero.
///
/// `frame + n` names the frame `n` positions above `frame`; this is the only
/// arithmetic the allocator needs for splitting and coalescing runs.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FrameNumber(usize);

impl FrameNumber {
    #[inline]
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// The frame that contains `addr`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn containing(addr: PhysicalAddress) -> Self {
        Self((addr.as_u64() >> PAGE_SHIFT) as usize)
    }

    /// The frame starting at `addr`, or `None` if `addr` is not frame aligned.
    #[inline]
    #[must_use]
    pub const fn from_address(addr: PhysicalAddress) -> Option<Self> {
        if addr.is_frame_aligned() {
            Some(Self::containing(addr))
        } else {
            None
        }
    }

    /// First byte of the frame.
    #[inline]
    #[must_use]
    pub const fn start_address(self) -> PhysicalAddress {
        PhysicalAddress::new((self.0 as u64) << PAGE_SHIFT)
    }

    /// First byte after the frame.
    #[inline]
    #[must_use]
    pub const fn end_address(self) -> PhysicalAddress {
        PhysicalAddress::new(((self.0 as u64) + 1) << PAGE_SHIFT)
    }

    /// `self + count`, or `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, count: usize) -> Option<Self> {
        match self.0.checked_add(count) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Number of frames from `origin` up to `self`.
    #[inline]
    #[must_use]
    pub const fn offset_from(self, origin: Self) -> Option<usize> {
        self.0.checked_sub(origin.0)
    }
}

impl fmt::Debug for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PFN(0x{:X})", self.0)
    }
}

impl fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

impl Add<usize> for FrameNumber {
    type Output = Self;

    #[inline]
    fn add(self, rhs: usize) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<usize> for FrameNumber {
    #[inline]
    fn add_assign(&mut self, rhs: usize) {
        self.0 += rhs;
    }
}

impl Sub<usize> for FrameNumber {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: usize) -> Self::Output {
        Self(self.0 - rhs)
    }
}

/// Half-open run of frames `[start, end)`.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, Debug)]
pub struct FrameRange {
    /// First frame of the run.
    pub start: FrameNumber,
    /// First frame after the run.
    pub end: FrameNumber,
}

impl FrameRange {
    #[inline]
    #[must_use]
    pub const fn new(start: FrameNumber, end: FrameNumber) -> Self {
        Self { start, end }
    }

    /// The run of `count` frames starting at `start`, or `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn with_len(start: FrameNumber, count: usize) -> Option<Self> {
        match start.checked_add(count) {
            Some(end) => Some(Self { start, end }),
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.0.saturating_sub(self.start.0)
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start.0 >= self.end.0
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, frame: FrameNumber) -> bool {
        self.start.0 <= frame.0 && frame.0 < self.end.0
    }

    /// Whether `self` and `other` share at least one frame.
    #[inline]
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start.0 < other.end.0 && other.start.0 < self.end.0
    }

    /// Iterate over all frames of the run in ascending order.
    pub fn iter_frames(&self) -> impl Iterator<Item = FrameNumber> + use<> {
        (self.start.0..self.end.0).map(FrameNumber)
    }
}

impl fmt::Display for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{})", self.start, self.end)
    }
}
