use crate::page::FreeListLink;
use crate::store::{lookup, lookup_mut};
use crate::{FrameNumber, InvariantViolation, PageStore};

/// A free run as seen through the free list.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct FreeBlock {
    /// Lowest frame of the run (the block head).
    pub base: FrameNumber,
    /// Number of frames in the run.
    pub length: usize,
}

impl FreeBlock {
    /// First frame above the run.
    #[inline]
    #[must_use]
    pub fn end(&self) -> FrameNumber {
        self.base + self.length
    }
}

/// Address-ordered, doubly linked list of free-block heads.
///
/// The links live in the page descriptors and name frames by number; a link
/// of `None` refers to the sentinel stored here, so the list is circular:
///
/// ```text
///   sentinel.next -> B0 <-> B1 <-> ... <-> Bn <- sentinel.prev
///   B0.prev = None                 Bn.next = None
/// ```
///
/// # Invariants
/// - `free_total` equals the sum of the lengths of all linked blocks.
/// - `blocks` equals the number of linked blocks.
pub(crate) struct FreeList {
    sentinel: FreeListLink,
    free_total: usize,
    blocks: usize,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self {
            sentinel: FreeListLink::DETACHED,
            free_total: 0,
            blocks: 0,
        }
    }

    #[inline]
    pub(crate) const fn first(&self) -> Option<FrameNumber> {
        self.sentinel.next
    }

    #[inline]
    pub(crate) const fn last(&self) -> Option<FrameNumber> {
        self.sentinel.prev
    }

    #[inline]
    pub(crate) const fn is_empty(&self) -> bool {
        self.sentinel.next.is_none()
    }

    #[inline]
    pub(crate) const fn free_total(&self) -> usize {
        self.free_total
    }

    #[inline]
    pub(crate) const fn block_count(&self) -> usize {
        self.blocks
    }

    #[cfg(test)]
    pub(crate) const fn set_block_count(&mut self, blocks: usize) {
        self.blocks = blocks;
    }

    #[inline]
    pub(crate) const fn credit(&mut self, pages: usize) {
        self.free_total += pages;
    }

    #[inline]
    pub(crate) const fn debit(&mut self, pages: usize) {
        self.free_total -= pages;
    }

    fn link_of<S: PageStore + ?Sized>(
        &self,
        store: &S,
        at: Option<FrameNumber>,
    ) -> Result<FreeListLink, InvariantViolation> {
        match at {
            None => Ok(self.sentinel),
            Some(frame) => Ok(lookup(store, frame)?.link()),
        }
    }

    fn link_mut<'a, S: PageStore + ?Sized>(
        &'a mut self,
        store: &'a mut S,
        at: Option<FrameNumber>,
    ) -> Result<&'a mut FreeListLink, InvariantViolation> {
        match at {
            None => Ok(&mut self.sentinel),
            Some(frame) => Ok(lookup_mut(store, frame)?.link_mut()),
        }
    }

    /// The block linked after `frame`; `None` once the sentinel is reached.
    #[inline]
    pub(crate) fn next<S: PageStore + ?Sized>(
        &self,
        store: &S,
        frame: FrameNumber,
    ) -> Result<Option<FrameNumber>, InvariantViolation> {
        Ok(lookup(store, frame)?.link().next)
    }

    /// Link `frame` in front of `at` (`None` inserts at the tail).
    pub(crate) fn insert_before<S: PageStore + ?Sized>(
        &mut self,
        store: &mut S,
        at: Option<FrameNumber>,
        frame: FrameNumber,
    ) -> Result<(), InvariantViolation> {
        let prev = self.link_of(&*store, at)?.prev;
        *lookup_mut(store, frame)?.link_mut() = FreeListLink { prev, next: at };
        self.link_mut(store, prev)?.next = Some(frame);
        self.link_mut(store, at)?.prev = Some(frame);
        self.blocks += 1;
        Ok(())
    }

    /// Link `frame` right behind `at` (`None` inserts at the front).
    pub(crate) fn insert_after<S: PageStore + ?Sized>(
        &mut self,
        store: &mut S,
        at: Option<FrameNumber>,
        frame: FrameNumber,
    ) -> Result<(), InvariantViolation> {
        let next = self.link_of(&*store, at)?.next;
        self.insert_before(store, next, frame)
    }

    /// Take `frame` out of the list. The page's own link is detached.
    pub(crate) fn unlink<S: PageStore + ?Sized>(
        &mut self,
        store: &mut S,
        frame: FrameNumber,
    ) -> Result<(), InvariantViolation> {
        let FreeListLink { prev, next } = lookup(&*store, frame)?.link();
        self.link_mut(store, prev)?.next = next;
        self.link_mut(store, next)?.prev = prev;
        *lookup_mut(store, frame)?.link_mut() = FreeListLink::DETACHED;
        self.blocks -= 1;
        Ok(())
    }

    /// Walk the blocks from the lowest address upwards.
    pub(crate) fn iter<'a, S: PageStore + ?Sized>(&self, store: &'a S) -> Blocks<'a, S> {
        Blocks {
            store,
            cursor: self.first(),
            budget: store.frames().len(),
        }
    }
}

/// Iterator over the blocks of a free list.
///
/// Stops early on a dangling link and after as many steps as the store has
/// frames, so a corrupted list cannot make it spin forever.
pub struct Blocks<'a, S: PageStore + ?Sized> {
    store: &'a S,
    cursor: Option<FrameNumber>,
    budget: usize,
}

impl<S: PageStore + ?Sized> Iterator for Blocks<'_, S> {
    type Item = FreeBlock;

    fn next(&mut self) -> Option<Self::Item> {
        let base = self.cursor?;
        if self.budget == 0 {
            return None;
        }
        self.budget -= 1;
        let page = self.store.page(base)?;
        self.cursor = page.link().next;
        Some(FreeBlock {
            base,
            length: page.raw_block_length(),
        })
    }
}
