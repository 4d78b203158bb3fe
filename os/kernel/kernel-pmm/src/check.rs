//! # Scripted Self Check
//!
//! A correctness oracle for a live allocator. It first walks the free list,
//! then drives a fixed allocate/release script through the allocator and
//! compares every returned frame and count against the expected first-fit
//! outcome.
//!
//! The script runs against a private pool: it borrows a few pages from the
//! real free list, swaps the free list for an empty one, replays the script
//! on the borrowed pages only, then swaps the original list back and returns
//! the pages. Nothing outside the borrowed pages is touched.

use crate::{FirstFitAllocator, FrameNumber, InvariantViolation, Page, PageStore, PmmError};
use log::{debug, error};

/// Fail the self check with `$what` unless `$cond` holds.
macro_rules! ensure {
    ($cond:expr, $what:literal) => {
        if !$cond {
            return Err(InvariantViolation::SelfCheckFailed($what));
        }
    };
}

impl<S: PageStore> FirstFitAllocator<S> {
    /// Validate the free list and replay the scripted allocation scenarios.
    ///
    /// Needs at least five contiguous free pages. Leaves the free list with
    /// the same blocks, page count and block count it had before.
    ///
    /// This is a diagnostic, not a production path; an error means either
    /// the allocator or its descriptors are broken and the caller should halt.
    ///
    /// # Errors
    /// [`InvariantViolation::SelfCheckFailed`] naming the first unexpected
    /// step, or the structural violation found by
    /// [`check_invariants`](Self::check_invariants).
    pub fn self_check(&mut self) -> Result<(), InvariantViolation> {
        debug!(
            "Running allocator self check on {} free pages in {} blocks",
            self.free_page_count(),
            self.free_block_count()
        );
        let result = self.run_self_check();
        match result {
            Ok(()) => debug!("Allocator self check passed"),
            Err(ref e) => error!("Allocator self check failed: {e}"),
        }
        result
    }

    fn run_self_check(&mut self) -> Result<(), InvariantViolation> {
        self.check_invariants()?;
        let (blocks, pages) = self.census();
        ensure!(pages == self.free_page_count(), "free census disagrees with free count");

        self.basic_check()?;
        self.first_fit_check()?;

        self.check_invariants()?;
        ensure!(self.census() == (blocks, pages), "free list changed across self check");
        Ok(())
    }

    /// Three single pages: distinct, unreferenced, reusable.
    fn basic_check(&mut self) -> Result<(), InvariantViolation> {
        let p0 = self.expect_alloc(1, "basic: first single page")?;
        let p1 = self.expect_alloc(1, "basic: second single page")?;
        let p2 = self.expect_alloc(1, "basic: third single page")?;

        ensure!(p0 != p1 && p0 != p2 && p1 != p2, "basic: pages are not distinct");
        ensure!(
            self.ref_count(p0) == Some(0)
                && self.ref_count(p1) == Some(0)
                && self.ref_count(p2) == Some(0),
            "basic: allocated page is referenced"
        );
        let frames = self.store().frames();
        ensure!(
            frames.contains(p0) && frames.contains(p1) && frames.contains(p2),
            "basic: page outside descriptor store"
        );

        let reused = self.with_scratch_list(|pmm| {
            pmm.expect_exhausted(1, "basic: empty pool allocated a page")?;

            pmm.release(p0, 1)?;
            pmm.release(p1, 1)?;
            pmm.release(p2, 1)?;
            ensure!(pmm.free_page_count() == 3, "basic: three released pages not counted");

            let q0 = pmm.expect_alloc(1, "basic: reallocate first page")?;
            let q1 = pmm.expect_alloc(1, "basic: reallocate second page")?;
            let q2 = pmm.expect_alloc(1, "basic: reallocate third page")?;
            pmm.expect_exhausted(1, "basic: exhausted pool allocated a page")?;

            pmm.release(q0, 1)?;
            ensure!(!pmm.free_list_is_empty(), "basic: released page not listed");
            let p = pmm.expect_alloc(1, "basic: reuse released page")?;
            ensure!(p == q0, "basic: released page not reused");
            pmm.expect_exhausted(1, "basic: pool not empty after reuse")?;
            ensure!(pmm.free_page_count() == 0, "basic: free count not zero");
            Ok([p, q1, q2])
        })?;

        for page in reused {
            self.release(page, 1)?;
        }
        Ok(())
    }

    /// Split, out-of-order release, exact reuse and re-merge on a 5-page run.
    fn first_fit_check(&mut self) -> Result<(), InvariantViolation> {
        let p0 = self.expect_alloc(5, "first fit: five page run")?;
        ensure!(
            self.head_length(p0).is_none(),
            "first fit: allocated run still marked free"
        );

        let merged = self.with_scratch_list(|pmm| {
            ensure!(pmm.free_list_is_empty(), "first fit: scratch list not empty");
            pmm.expect_exhausted(1, "first fit: empty pool allocated a page")?;

            pmm.release(p0 + 2, 3)?;
            pmm.expect_exhausted(4, "first fit: four pages from a three page gap")?;
            ensure!(
                pmm.head_length(p0 + 2) == Some(3),
                "first fit: released run has wrong length"
            );

            let p1 = pmm.expect_alloc(3, "first fit: three page gap")?;
            pmm.expect_exhausted(1, "first fit: pool not empty after exact fit")?;
            ensure!(p1 == p0 + 2, "first fit: exact fit at wrong frame");

            let p2 = p0 + 1;
            pmm.release(p0, 1)?;
            pmm.release(p1, 3)?;
            ensure!(
                pmm.head_length(p0) == Some(1),
                "first fit: single page block has wrong length"
            );
            ensure!(
                pmm.head_length(p1) == Some(3),
                "first fit: three page block has wrong length"
            );

            let q = pmm.expect_alloc(1, "first fit: lowest single page")?;
            ensure!(q == p2 - 1, "first fit: single page not taken from lowest block");
            pmm.release(q, 1)?;
            let q = pmm.expect_alloc(2, "first fit: two pages after split")?;
            ensure!(q == p2 + 1, "first fit: two pages not taken from first fitting block");

            pmm.release(q, 2)?;
            pmm.release(p2, 1)?;
            ensure!(pmm.free_block_count() == 1, "first fit: run did not re-merge");

            let whole = pmm.expect_alloc(5, "first fit: re-merged five page run")?;
            ensure!(whole == p0, "first fit: re-merged run at wrong frame");
            pmm.expect_exhausted(1, "first fit: pool not empty after re-merge")?;
            ensure!(pmm.free_page_count() == 0, "first fit: free count not zero");
            Ok(whole)
        })?;

        self.release(merged, 5)
    }

    /// Run `script` against an empty free list and put the original back,
    /// also when the script fails. Pages the script left free are dropped
    /// from the scratch list first so no stray head flags survive.
    fn with_scratch_list<R>(
        &mut self,
        script: impl FnOnce(&mut Self) -> Result<R, InvariantViolation>,
    ) -> Result<R, InvariantViolation> {
        let stash = self.stash_free_list();
        let result = script(self);
        let cleanup = self.init();
        self.restore_free_list(stash);
        let value = result?;
        cleanup?;
        Ok(value)
    }

    fn expect_alloc(
        &mut self,
        count: usize,
        what: &'static str,
    ) -> Result<FrameNumber, InvariantViolation> {
        match self.allocate(count) {
            Ok(frame) => Ok(frame),
            Err(PmmError::OutOfMemory { .. }) => Err(InvariantViolation::SelfCheckFailed(what)),
            Err(PmmError::InvariantViolation(e)) => Err(e),
        }
    }

    fn expect_exhausted(
        &mut self,
        count: usize,
        what: &'static str,
    ) -> Result<(), InvariantViolation> {
        match self.allocate(count) {
            Err(PmmError::OutOfMemory { .. }) => Ok(()),
            Ok(_) => Err(InvariantViolation::SelfCheckFailed(what)),
            Err(PmmError::InvariantViolation(e)) => Err(e),
        }
    }

    fn head_length(&self, frame: FrameNumber) -> Option<usize> {
        self.store().page(frame).and_then(Page::block_length)
    }

    fn ref_count(&self, frame: FrameNumber) -> Option<u32> {
        self.store().page(frame).map(Page::ref_count)
    }

    /// Number of blocks and pages found by walking the list.
    fn census(&self) -> (usize, usize) {
        self.blocks()
            .fold((0, 0), |(blocks, pages), b| (blocks + 1, pages + b.length))
    }
}
