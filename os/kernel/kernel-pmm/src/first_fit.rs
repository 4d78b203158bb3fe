use crate::free_list::{Blocks, FreeBlock, FreeList};
use crate::store::{lookup, lookup_mut};
use crate::{FrameNumber, FrameRange, InvariantViolation, PageStore, PmmError};
use log::{debug, error, trace};

/// A first-fit page allocator over an address-ordered free list.
///
/// Free runs are represented by their lowest page (the *block head*), which
/// carries the run length and is linked into the free list. Allocation takes
/// the lowest block that is large enough and splits off the remainder;
/// release coalesces with both address-adjacent neighbours and relinks the
/// merged block in address order.
///
/// The allocator does no locking. Callers that share it must serialize every
/// call, e.g. by wrapping the instance in a spin lock.
///
/// # Invariants
/// After every public operation:
/// - the free total equals the sum of all block lengths,
/// - blocks are sorted by base frame and no two blocks are adjacent,
/// - a page is a block head iff it is linked into the free list.
pub struct FirstFitAllocator<S: PageStore> {
    store: S,
    free: FreeList,
}

impl<S: PageStore> FirstFitAllocator<S> {
    /// Create an allocator with an empty free list over `store`.
    ///
    /// No frame is managed until it is handed over by
    /// [`register_region`](Self::register_region).
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self {
            store,
            free: FreeList::new(),
        }
    }

    /// Reset the free list to empty and the free total to zero.
    ///
    /// Pages that were free stay managed but are no longer reachable; they
    /// lose their head flag so the list and the descriptors stay consistent.
    ///
    /// # Errors
    /// Fails if a linked frame is outside the descriptor store.
    pub fn init(&mut self) -> Result<(), InvariantViolation> {
        let mut cursor = self.free.first();
        while let Some(frame) = cursor {
            cursor = self.free.next(&self.store, frame)?;
            lookup_mut(&mut self.store, frame)?.clear_head();
        }
        self.free = FreeList::new();
        Ok(())
    }

    /// The descriptor store, for inspection.
    #[inline]
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Give up the allocator and return the descriptor store.
    #[inline]
    #[must_use]
    pub fn into_store(self) -> S {
        self.store
    }

    /// Number of free pages. O(1).
    #[inline]
    #[must_use]
    pub const fn free_page_count(&self) -> usize {
        self.free.free_total()
    }

    /// Number of free blocks. O(1).
    #[inline]
    #[must_use]
    pub const fn free_block_count(&self) -> usize {
        self.free.block_count()
    }

    /// The free blocks in ascending address order.
    #[inline]
    #[must_use]
    pub fn blocks(&self) -> Blocks<'_, S> {
        self.free.iter(&self.store)
    }

    /// Length of the largest free block, 0 when nothing is free.
    #[must_use]
    pub fn largest_free_block(&self) -> usize {
        self.blocks().map(|b| b.length).max().unwrap_or(0)
    }

    /// Hand `count` frames starting at `base` over to the allocator as one free run.
    ///
    /// Every frame of the run is reset and marked managed. The run is linked
    /// in address order and merged with free blocks it touches, so regions may
    /// be registered in any order.
    ///
    /// # Errors
    /// - [`InvariantViolation::InvalidRegion`] if `count` is zero or the run overflows.
    /// - [`InvariantViolation::FrameOutOfRange`] if the store does not describe a frame.
    /// - [`InvariantViolation::AlreadyManaged`] if a frame was registered before.
    ///
    /// Nothing is modified when an error is returned.
    pub fn register_region(
        &mut self,
        base: FrameNumber,
        count: usize,
    ) -> Result<(), InvariantViolation> {
        let run = FrameRange::with_len(base, count)
            .filter(|run| !run.is_empty())
            .ok_or(InvariantViolation::InvalidRegion { base, count })?;

        for frame in run.iter_frames() {
            if lookup(&self.store, frame)?.is_managed() {
                return Err(InvariantViolation::AlreadyManaged { frame });
            }
        }

        for frame in run.iter_frames() {
            lookup_mut(&mut self.store, frame)?.adopt();
        }

        debug!("Registering {count} pages at frame {base} ({run})");
        self.link_free_run(base, count)?;
        self.free.credit(count);
        self.verify_after_op()
    }

    /// Allocate `count` contiguous pages, first fit from the lowest address.
    ///
    /// On success the returned run is managed, unreferenced, and no longer
    /// reachable from the free list. Allocation never merges blocks; it only
    /// shrinks or removes the chosen one.
    ///
    /// # Errors
    /// - [`PmmError::OutOfMemory`] if fewer than `count` pages are free, or no
    ///   single free block is long enough. The free list is left untouched.
    /// - [`PmmError::InvariantViolation`] if `count` is zero or the free list
    ///   is corrupted.
    pub fn allocate(&mut self, count: usize) -> Result<FrameNumber, PmmError> {
        if count == 0 {
            return Err(InvariantViolation::EmptyAllocation.into());
        }
        if count > self.free.free_total() {
            return Err(self.out_of_memory(count));
        }

        let Some(FreeBlock { base, length }) = self.blocks().find(|b| b.length >= count) else {
            return Err(self.out_of_memory(count));
        };

        if length > count {
            // The remainder sits between `base` and its successor, so linking
            // it right behind `base` keeps the address order.
            let remainder = base + count;
            lookup_mut(&mut self.store, remainder)?.make_head(length - count);
            self.free.insert_after(&mut self.store, Some(base), remainder)?;
        }
        self.free.unlink(&mut self.store, base)?;
        lookup_mut(&mut self.store, base)?.reset();
        self.free.debit(count);

        trace!("Allocated {count} pages at frame {base} (block of {length})");
        self.verify_after_op()?;
        Ok(base)
    }

    /// Return the run of `count` pages starting at `base` to the free list.
    ///
    /// The run must be exactly one earlier allocation. It is merged with the
    /// free blocks directly below and above it.
    ///
    /// # Errors
    /// - [`InvariantViolation::ZeroLength`] if `count` is zero.
    /// - [`InvariantViolation::FrameOutOfRange`], [`InvariantViolation::UnmanagedFrame`]
    ///   or [`InvariantViolation::DoubleFreeOrCorruption`] if any page of the run
    ///   is not currently allocated. Nothing is modified in that case.
    /// - [`InvariantViolation::MissedMerge`] if the free list was already broken.
    pub fn release(&mut self, base: FrameNumber, count: usize) -> Result<(), InvariantViolation> {
        let result = self.release_run(base, count);
        if let Err(ref e) = result {
            error!("Releasing {count} pages at frame {base} failed: {e}");
        }
        result
    }

    fn release_run(&mut self, base: FrameNumber, count: usize) -> Result<(), InvariantViolation> {
        if count == 0 {
            return Err(InvariantViolation::ZeroLength { base });
        }
        let run = FrameRange::with_len(base, count)
            .ok_or(InvariantViolation::FrameOutOfRange { frame: base })?;
        self.ensure_allocated(&run)?;

        for frame in run.iter_frames() {
            lookup_mut(&mut self.store, frame)?.reset();
        }

        self.link_free_run(base, count)?;
        self.free.credit(count);

        trace!("Released {count} pages at frame {base}");
        self.verify_after_op()
    }

    /// Every page of `run` must be managed and not part of a free block.
    fn ensure_allocated(&self, run: &FrameRange) -> Result<(), InvariantViolation> {
        for frame in run.iter_frames() {
            let page = lookup(&self.store, frame)?;
            if !page.is_managed() {
                return Err(InvariantViolation::UnmanagedFrame { frame });
            }
            if page.is_free_block_head() {
                return Err(InvariantViolation::DoubleFreeOrCorruption { frame });
            }
        }

        // Tail pages of a free block carry no flag; look for overlap instead.
        for block in self.blocks() {
            if block.base > run.end {
                break;
            }
            let free = FrameRange::new(block.base, block.end());
            if free.overlaps(run) {
                let frame = core::cmp::max(free.start, run.start);
                return Err(InvariantViolation::DoubleFreeOrCorruption { frame });
            }
        }
        Ok(())
    }

    /// Merge the reset run `[base, base + count)` with its free neighbours and
    /// link the result in address order. Does not touch the free total.
    fn link_free_run(&mut self, base: FrameNumber, count: usize) -> Result<(), InvariantViolation> {
        let mut head = base;
        let mut length = count;
        lookup_mut(&mut self.store, head)?.make_head(length);

        // The whole list is scanned so that a block out of address order still
        // gets merged, or trips the missed-merge check below.
        let mut cursor = self.free.first();
        while let Some(frame) = cursor {
            let block_length = lookup(&self.store, frame)?.raw_block_length();
            cursor = self.free.next(&self.store, frame)?;

            if head + length == frame {
                trace!("Merging free block {frame} (+{block_length}) into {head}");
                self.free.unlink(&mut self.store, frame)?;
                lookup_mut(&mut self.store, frame)?.clear_head();
                length += block_length;
                lookup_mut(&mut self.store, head)?.set_block_length(length);
            } else if frame + block_length == head {
                trace!("Merging {head} (+{length}) into free block {frame}");
                self.free.unlink(&mut self.store, frame)?;
                lookup_mut(&mut self.store, head)?.clear_head();
                head = frame;
                length += block_length;
                lookup_mut(&mut self.store, head)?.make_head(length);
            }
        }

        let end = head + length;
        let mut successor = self.free.first();
        while let Some(frame) = successor {
            if frame >= end {
                if frame == end {
                    return Err(InvariantViolation::MissedMerge {
                        end,
                        neighbor: frame,
                    });
                }
                break;
            }
            successor = self.free.next(&self.store, frame)?;
        }
        self.free.insert_before(&mut self.store, successor, head)
    }

    fn out_of_memory(&self, requested: usize) -> PmmError {
        let available = self.free.free_total();
        debug!(
            "Out of memory: {requested} pages requested, {available} free in {} blocks",
            self.free.block_count()
        );
        PmmError::OutOfMemory {
            requested,
            available,
        }
    }

    /// Structural check of the free list and the descriptors.
    ///
    /// Verifies that every linked frame is a managed block head with a
    /// non-zero length, that links agree in both directions, that blocks are
    /// strictly ascending and never adjacent, that the recorded totals match,
    /// and that no unlinked descriptor carries the head flag.
    ///
    /// # Errors
    /// The first violated property.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.check_list()?;

        let flagged = self
            .store
            .frames()
            .iter_frames()
            .filter(|&f| self.store.page(f).is_some_and(crate::Page::is_free_block_head))
            .count();
        if flagged != self.free.block_count() {
            return Err(InvariantViolation::StrayBlockHeads {
                flagged,
                linked: self.free.block_count(),
            });
        }
        Ok(())
    }

    /// The list-only part of [`check_invariants`](Self::check_invariants).
    ///
    /// The walk needs no step limit: revisiting a block always breaks a back link.
    pub(crate) fn check_list(&self) -> Result<(), InvariantViolation> {
        let mut prev: Option<(FrameNumber, usize)> = None;
        let mut counted_pages = 0usize;
        let mut counted_blocks = 0usize;

        let mut cursor = self.free.first();
        while let Some(frame) = cursor {
            let page = lookup(&self.store, frame)?;
            let flags = page.flags();
            if !flags.free_head() || !flags.managed() || page.raw_block_length() == 0 {
                return Err(InvariantViolation::NotABlockHead { frame });
            }
            if page.link().prev != prev.map(|(p, _)| p) {
                return Err(InvariantViolation::BrokenLink { frame });
            }
            if let Some((p, p_len)) = prev {
                let p_end = p + p_len;
                if p_end == frame {
                    return Err(InvariantViolation::AdjacentBlocks {
                        first: p,
                        second: frame,
                    });
                }
                if p_end > frame {
                    return Err(InvariantViolation::Unsorted {
                        first: p,
                        second: frame,
                    });
                }
            }

            counted_pages += page.raw_block_length();
            counted_blocks += 1;
            prev = Some((frame, page.raw_block_length()));
            cursor = page.link().next;
        }

        if self.free.last() != prev.map(|(p, _)| p) {
            return Err(InvariantViolation::BrokenLink {
                frame: prev.map_or_else(FrameNumber::default, |(p, _)| p),
            });
        }
        if counted_pages != self.free.free_total() {
            return Err(InvariantViolation::FreeTotalMismatch {
                recorded: self.free.free_total(),
                counted: counted_pages,
            });
        }
        if counted_blocks != self.free.block_count() {
            return Err(InvariantViolation::BlockCountMismatch {
                recorded: self.free.block_count(),
                counted: counted_blocks,
            });
        }
        Ok(())
    }

    #[cfg(feature = "verify-each-op")]
    #[inline]
    fn verify_after_op(&self) -> Result<(), InvariantViolation> {
        self.check_list().inspect_err(|e| {
            error!("Free list check failed: {e}");
        })
    }

    #[cfg(not(feature = "verify-each-op"))]
    #[inline]
    #[allow(clippy::unnecessary_wraps, clippy::unused_self)]
    const fn verify_after_op(&self) -> Result<(), InvariantViolation> {
        Ok(())
    }

    /// Swap the free list for an empty one; used by the self check to run
    /// scripted scenarios against a pool it fully controls.
    pub(crate) const fn stash_free_list(&mut self) -> FreeList {
        core::mem::replace(&mut self.free, FreeList::new())
    }

    pub(crate) fn restore_free_list(&mut self, stash: FreeList) {
        self.free = stash;
    }

    pub(crate) fn free_list_is_empty(&self) -> bool {
        self.free.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Page, PageArray};

    const BASE: usize = 0x100;

    fn f(n: usize) -> FrameNumber {
        FrameNumber::new(BASE + n)
    }

    fn blocks<S: PageStore>(pmm: &FirstFitAllocator<S>) -> Vec<(usize, usize)> {
        pmm.blocks()
            .map(|FreeBlock { base, length }| (base.as_usize() - BASE, length))
            .collect()
    }

    #[test]
    fn register_creates_single_block() {
        let mut pages = [Page::new(); 16];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(0), 16).unwrap();

        assert_eq!(pmm.free_page_count(), 16);
        assert_eq!(blocks(&pmm), [(0, 16)]);
        assert!(pmm.store().page(f(15)).unwrap().is_managed());
        pmm.check_invariants().unwrap();
    }

    #[test]
    fn register_rejects_empty_and_managed_regions() {
        let mut pages = [Page::new(); 8];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));

        assert_eq!(
            pmm.register_region(f(0), 0),
            Err(InvariantViolation::InvalidRegion {
                base: f(0),
                count: 0
            })
        );
        pmm.register_region(f(2), 4).unwrap();
        assert_eq!(
            pmm.register_region(f(0), 3),
            Err(InvariantViolation::AlreadyManaged { frame: f(2) })
        );
        assert_eq!(
            pmm.register_region(f(6), 4),
            Err(InvariantViolation::FrameOutOfRange { frame: f(8) })
        );
        assert!(!pmm.store().page(f(6)).unwrap().is_managed());
        assert_eq!(pmm.free_page_count(), 4);
    }

    #[test]
    fn register_out_of_order_stays_sorted() {
        let mut pages = [Page::new(); 32];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(20), 4).unwrap();
        pmm.register_region(f(2), 3).unwrap();
        pmm.register_region(f(10), 5).unwrap();

        assert_eq!(blocks(&pmm), [(2, 3), (10, 5), (20, 4)]);
        pmm.check_invariants().unwrap();
    }

    #[test]
    fn register_adjacent_regions_coalesce() {
        let mut pages = [Page::new(); 32];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(8), 8).unwrap();
        pmm.register_region(f(0), 8).unwrap();
        pmm.register_region(f(16), 4).unwrap();

        assert_eq!(blocks(&pmm), [(0, 20)]);
        assert_eq!(pmm.free_page_count(), 20);
        pmm.check_invariants().unwrap();
    }

    #[test]
    fn allocate_exact_fit_removes_block() {
        let mut pages = [Page::new(); 16];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(0), 4).unwrap();
        pmm.register_region(f(8), 8).unwrap();

        assert_eq!(pmm.allocate(4), Ok(f(0)));
        assert_eq!(blocks(&pmm), [(8, 8)]);
        let page = pmm.store().page(f(0)).unwrap();
        assert!(!page.is_free_block_head());
        assert_eq!(page.ref_count(), 0);
        pmm.check_invariants().unwrap();
    }

    #[test]
    fn allocate_splits_and_keeps_remainder_in_place() {
        let mut pages = [Page::new(); 32];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(0), 2).unwrap();
        pmm.register_region(f(4), 10).unwrap();
        pmm.register_region(f(20), 10).unwrap();

        assert_eq!(pmm.allocate(3), Ok(f(4)));
        assert_eq!(blocks(&pmm), [(0, 2), (7, 7), (20, 10)]);
        assert_eq!(pmm.free_page_count(), 19);
        pmm.check_invariants().unwrap();
    }

    #[test]
    fn allocate_failure_leaves_state_untouched() {
        let mut pages = [Page::new(); 16];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(0), 2).unwrap();
        pmm.register_region(f(5), 3).unwrap();

        assert_eq!(
            pmm.allocate(6),
            Err(PmmError::OutOfMemory {
                requested: 6,
                available: 5
            })
        );
        // Enough pages in total, but fragmented.
        assert!(pmm.allocate(4).unwrap_err().is_out_of_memory());
        assert_eq!(blocks(&pmm), [(0, 2), (5, 3)]);
        assert_eq!(pmm.largest_free_block(), 3);
    }

    #[test]
    fn allocate_zero_is_rejected() {
        let mut pages = [Page::new(); 4];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(0), 4).unwrap();
        assert!(matches!(
            pmm.allocate(0),
            Err(PmmError::InvariantViolation(
                InvariantViolation::EmptyAllocation
            ))
        ));
        assert_eq!(pmm.free_page_count(), 4);
    }

    #[test]
    fn release_merges_both_sides() {
        let mut pages = [Page::new(); 16];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(0), 12).unwrap();

        let a = pmm.allocate(4).unwrap();
        let b = pmm.allocate(4).unwrap();
        let c = pmm.allocate(4).unwrap();
        assert_eq!(pmm.free_page_count(), 0);

        pmm.release(a, 4).unwrap();
        pmm.release(c, 4).unwrap();
        assert_eq!(blocks(&pmm), [(0, 4), (8, 4)]);

        pmm.release(b, 4).unwrap();
        assert_eq!(blocks(&pmm), [(0, 12)]);
        assert!(!pmm.store().page(f(8)).unwrap().is_free_block_head());
        pmm.check_invariants().unwrap();
    }

    #[test]
    fn release_merges_into_lower_neighbor() {
        let mut pages = [Page::new(); 16];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(0), 10).unwrap();
        let a = pmm.allocate(3).unwrap();
        let b = pmm.allocate(3).unwrap();
        assert_eq!(blocks(&pmm), [(6, 4)]);

        pmm.release(a, 3).unwrap();
        assert_eq!(blocks(&pmm), [(0, 3), (6, 4)]);
        pmm.release(b, 3).unwrap();
        assert_eq!(blocks(&pmm), [(0, 10)]);
        pmm.check_invariants().unwrap();
    }

    #[test]
    fn release_rejects_double_free() {
        let mut pages = [Page::new(); 8];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(0), 8).unwrap();
        let a = pmm.allocate(4).unwrap();
        pmm.release(a, 4).unwrap();

        assert_eq!(
            pmm.release(a, 4),
            Err(InvariantViolation::DoubleFreeOrCorruption { frame: a })
        );
        // A tail page of a free block has no flag but is still free.
        assert_eq!(
            pmm.release(f(3), 1),
            Err(InvariantViolation::DoubleFreeOrCorruption { frame: f(3) })
        );
        assert_eq!(pmm.free_page_count(), 8);
        pmm.check_invariants().unwrap();
    }

    #[test]
    fn release_rejects_unmanaged_pages() {
        let mut pages = [Page::new(); 8];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(0), 4).unwrap();
        let a = pmm.allocate(4).unwrap();

        assert_eq!(
            pmm.release(a, 5),
            Err(InvariantViolation::UnmanagedFrame { frame: f(4) })
        );
        assert_eq!(
            pmm.release(a, 0),
            Err(InvariantViolation::ZeroLength { base: a })
        );
        assert_eq!(
            pmm.release(f(7), 2),
            Err(InvariantViolation::UnmanagedFrame { frame: f(7) })
        );
        assert_eq!(pmm.free_page_count(), 0);
    }

    #[test]
    fn init_forgets_free_blocks() {
        let mut pages = [Page::new(); 8];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(0), 8).unwrap();
        pmm.init().unwrap();

        assert_eq!(pmm.free_page_count(), 0);
        assert_eq!(pmm.free_block_count(), 0);
        assert!(!pmm.store().page(f(0)).unwrap().is_free_block_head());
        assert!(pmm.allocate(1).unwrap_err().is_out_of_memory());
        pmm.check_invariants().unwrap();
    }

    #[test]
    fn check_detects_stray_head_flag() {
        let mut pages = [Page::new(); 8];
        pages[5].adopt();
        pages[5].make_head(1);
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(0), 4).unwrap();

        assert_eq!(
            pmm.check_invariants(),
            Err(InvariantViolation::StrayBlockHeads {
                flagged: 2,
                linked: 1
            })
        );
    }

    /// Link a free block of `length` pages at `base` behind the allocator's back.
    fn forge_block(pmm: &mut FirstFitAllocator<PageArray<'_>>, base: FrameNumber, length: usize) {
        let page = pmm.store.page_mut(base).unwrap();
        page.adopt();
        page.make_head(length);
        pmm.free.insert_before(&mut pmm.store, None, base).unwrap();
        pmm.free.credit(length);
    }

    #[test]
    fn check_detects_adjacent_blocks() {
        let mut pages = [Page::new(); 16];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(0), 8).unwrap();
        forge_block(&mut pmm, f(8), 2);

        let adjacent = InvariantViolation::AdjacentBlocks {
            first: f(0),
            second: f(8),
        };
        assert_eq!(pmm.check_list(), Err(adjacent));
        assert_eq!(pmm.check_invariants(), Err(adjacent));
    }

    #[test]
    fn check_detects_unsorted_blocks() {
        let mut pages = [Page::new(); 16];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(8), 4).unwrap();
        forge_block(&mut pmm, f(0), 2);

        assert_eq!(
            pmm.check_invariants(),
            Err(InvariantViolation::Unsorted {
                first: f(8),
                second: f(0)
            })
        );
    }

    #[test]
    fn check_detects_broken_back_link() {
        let mut pages = [Page::new(); 16];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(0), 4).unwrap();
        pmm.register_region(f(8), 4).unwrap();
        pmm.store.page_mut(f(8)).unwrap().link_mut().prev = None;

        assert_eq!(
            pmm.check_invariants(),
            Err(InvariantViolation::BrokenLink { frame: f(8) })
        );
    }

    #[test]
    fn check_detects_self_loop() {
        let mut pages = [Page::new(); 16];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(0), 4).unwrap();
        pmm.register_region(f(8), 4).unwrap();
        pmm.store.page_mut(f(8)).unwrap().link_mut().next = Some(f(8));

        assert_eq!(
            pmm.check_invariants(),
            Err(InvariantViolation::BrokenLink { frame: f(8) })
        );
        // The block iterator gives up after one step per described frame.
        assert_eq!(pmm.blocks().count(), 16);
    }

    #[test]
    fn check_detects_cleared_head_flag() {
        let mut pages = [Page::new(); 16];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(0), 4).unwrap();
        pmm.register_region(f(8), 4).unwrap();
        pmm.store.page_mut(f(8)).unwrap().clear_head();

        assert_eq!(
            pmm.check_invariants(),
            Err(InvariantViolation::NotABlockHead { frame: f(8) })
        );
    }

    #[test]
    fn check_detects_miscounted_totals() {
        let mut pages = [Page::new(); 16];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(0), 4).unwrap();

        pmm.free.credit(1);
        assert_eq!(
            pmm.check_invariants(),
            Err(InvariantViolation::FreeTotalMismatch {
                recorded: 5,
                counted: 4
            })
        );

        pmm.free.debit(1);
        pmm.free.set_block_count(2);
        assert_eq!(
            pmm.check_invariants(),
            Err(InvariantViolation::BlockCountMismatch {
                recorded: 2,
                counted: 1
            })
        );
    }

    #[test]
    fn release_detects_missed_merge() {
        let mut pages = [Page::new(); 16];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(8), 2).unwrap();
        let run = pmm.allocate(2).unwrap();
        // Two touching blocks, linked out of order.
        forge_block(&mut pmm, f(12), 2);
        forge_block(&mut pmm, f(10), 2);

        assert_eq!(
            pmm.release(run, 2),
            Err(InvariantViolation::MissedMerge {
                end: f(12),
                neighbor: f(12)
            })
        );
    }

    #[test]
    fn allocator_at_top_of_frame_space() {
        let mut pages = [Page::new(); 8];
        let top = FrameNumber::new(usize::MAX - 4);
        let mut pmm = FirstFitAllocator::new(PageArray::new(top, &mut pages));
        pmm.register_region(top, 4).unwrap();

        let run = pmm.allocate(3).unwrap();
        assert_eq!(run, top);
        assert_eq!(pmm.blocks().next().map(|b| b.end()), Some(top + 4));
        pmm.release(run, 3).unwrap();
        pmm.check_invariants().unwrap();
    }

    #[cfg(feature = "verify-each-op")]
    #[test]
    fn mutating_call_reports_list_damage() {
        let mut pages = [Page::new(); 16];
        let mut pmm = FirstFitAllocator::new(PageArray::new(f(0), &mut pages));
        pmm.register_region(f(0), 8).unwrap();
        forge_block(&mut pmm, f(8), 2);

        assert_eq!(
            pmm.register_region(f(12), 2),
            Err(InvariantViolation::AdjacentBlocks {
                first: f(0),
                second: f(8)
            })
        );
    }
}
