//! Free-list maintenance.
//!
//! Wraps [`hf_list::CircularList`] with the one allocator-specific fact the
//! generic list doesn't know: a leading sentinel is seeded into the list
//! once, at bootstrap, and is never unlinked again. The fit search and the
//! invariant checker both walk through it; they simply skip it by checking
//! the allocated bit, which a sentinel always carries.

use hf_list::CircularList;

use crate::block::Block;

pub(crate) struct FreeList {
    list: CircularList<Block>,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        FreeList {
            list: CircularList::new(),
        }
    }

    /// Seed the list with the permanent leading sentinel. Must be called
    /// exactly once, during bootstrap, before any other list operation.
    pub(crate) fn seed_with_sentinel(&mut self, sentinel: Block) {
        debug_assert!(self.list.is_empty());
        self.list.push_after_anchor(sentinel);
    }

    /// Insert a newly-freed block, moving the anchor to it.
    pub(crate) fn insert(&mut self, block: Block) {
        debug_assert!(!block.allocated());
        self.list.push_after_anchor(block);
    }

    /// Remove `block` from the list, whether it's a genuine free block or
    /// (in the course of arena reset) the sentinel itself.
    pub(crate) fn remove(&mut self, block: Block) {
        self.list.unlink(block);
    }

    /// The node the anchor currently references.
    ///
    /// Never `None` once [`FreeList::seed_with_sentinel`] has run: the
    /// sentinel is a permanent member, so the underlying list can never
    /// become empty again.
    pub(crate) fn anchor(&self) -> Block {
        self.list
            .anchor()
            .expect("free list anchor is never empty once seeded")
    }

    /// Every free block reachable from the anchor, in list order, skipping
    /// the sentinel.
    pub(crate) fn iter_free(&self) -> impl Iterator<Item = Block> + '_ {
        self.list.iter().filter(|b| !b.allocated())
    }

    /// Every member of the underlying list, sentinel included.
    pub(crate) fn iter_all(&self) -> impl Iterator<Item = Block> + '_ {
        self.list.iter()
    }
}
