use crate::FrameNumber;

/// A broken caller contract or a corrupted free list.
///
/// None of these are meant to be recovered from: the descriptor state can no
/// longer be trusted and the embedding kernel should halt.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum InvariantViolation {
    /// Region registration with zero pages or a run that does not fit the frame space.
    #[error("invalid region of {count} pages at frame {base}")]
    InvalidRegion { base: FrameNumber, count: usize },
    /// Region registration touched a frame that is already managed.
    #[error("frame {frame} is already managed")]
    AlreadyManaged { frame: FrameNumber },
    /// Release of zero pages.
    #[error("zero-length run at frame {base}")]
    ZeroLength { base: FrameNumber },
    /// Allocation request for zero pages.
    #[error("allocation of zero pages")]
    EmptyAllocation,
    /// The descriptor store does not describe the frame.
    #[error("frame {frame} is outside the page descriptor store")]
    FrameOutOfRange { frame: FrameNumber },
    /// Release of a frame that never went through region registration.
    #[error("frame {frame} is not managed by the allocator")]
    UnmanagedFrame { frame: FrameNumber },
    /// Release of a frame that is already free.
    #[error("frame {frame} is already free (double free or corruption)")]
    DoubleFreeOrCorruption { frame: FrameNumber },
    /// Release found a block adjacent to the merged run that was not coalesced.
    #[error("missed merge: free run ending at {end} touches free block {neighbor}")]
    MissedMerge {
        end: FrameNumber,
        neighbor: FrameNumber,
    },
    /// A linked frame does not carry the free-block-head flag.
    #[error("linked frame {frame} is not a free-block head")]
    NotABlockHead { frame: FrameNumber },
    /// A head flag is set on a frame that is not linked into the free list.
    #[error("{flagged} frames carry the head flag but {linked} blocks are linked")]
    StrayBlockHeads { flagged: usize, linked: usize },
    /// A neighbor's back link does not point at the expected frame.
    #[error("broken back link at frame {frame}")]
    BrokenLink { frame: FrameNumber },
    /// Two consecutive blocks are out of address order or overlap.
    #[error("free block {second} does not lie above free block {first}")]
    Unsorted {
        first: FrameNumber,
        second: FrameNumber,
    },
    /// Two consecutive blocks touch and should have been one.
    #[error("free blocks {first} and {second} are adjacent")]
    AdjacentBlocks {
        first: FrameNumber,
        second: FrameNumber,
    },
    /// The running page total disagrees with the sum over all blocks.
    #[error("free total is {recorded} pages but blocks add up to {counted}")]
    FreeTotalMismatch { recorded: usize, counted: usize },
    /// The running block count disagrees with the number of linked blocks.
    #[error("block count is {recorded} but {counted} blocks are linked")]
    BlockCountMismatch { recorded: usize, counted: usize },
    /// A step of the scripted self check produced an unexpected result.
    #[error("self check failed: {0}")]
    SelfCheckFailed(&'static str),
}

/// Failure of [`allocate`](crate::FirstFitAllocator::allocate).
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PmmError {
    /// No single free block holds the requested number of pages.
    /// The allocator state is unchanged.
    #[error("out of memory: {requested} pages requested, {available} pages free")]
    OutOfMemory { requested: usize, available: usize },
    #[error(transparent)]
    InvariantViolation(#[from] InvariantViolation),
}

impl PmmError {
    #[inline]
    #[must_use]
    pub const fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }
}
