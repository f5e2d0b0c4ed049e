//! Placement: choosing a free block to satisfy a request, and carving the
//! allocated piece out of it.

use core::ptr::NonNull;

use crate::block::{Block, MIN_BLOCK_UNITS};
use crate::freelist::FreeList;

/// How a request picks among free blocks large enough to satisfy it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PlacementPolicy {
    /// Take the first free block on the list at least as large as
    /// required, in list order from the anchor.
    FirstFit,
    /// Walk the whole free list and take the smallest block at least as
    /// large as required.
    BestFit,
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        PlacementPolicy::FirstFit
    }
}

/// Search the free list for a block of at least `required` HF units,
/// according to `policy`.
///
/// Best-fit starts from no candidate at all rather than from a sentinel
/// "too-large" value: the first block that fits unconditionally becomes
/// the initial candidate, and only a strictly smaller later candidate
/// replaces it. This avoids a subtle bug a fixed sentinel invites, where a
/// too-small sentinel would reject every real block, or a too-large one
/// would fail to initialize when every free block is smaller than it.
pub(crate) fn find_fit(
    free_list: &FreeList,
    required: usize,
    policy: PlacementPolicy,
) -> Option<Block> {
    match policy {
        PlacementPolicy::FirstFit => free_list.iter_free().find(|b| b.size() >= required),
        PlacementPolicy::BestFit => {
            let mut best: Option<Block> = None;
            for candidate in free_list.iter_free() {
                if candidate.size() < required {
                    continue;
                }
                best = match best {
                    Some(current) if candidate.size() >= current.size() => Some(current),
                    _ => Some(candidate),
                };
            }
            best
        }
    }
}

/// Carve an allocated block of `required` HF units out of `block`, which
/// must already be known to be at least that large.
///
/// If the remainder would itself be a legal block, `block` is split: the
/// remainder keeps `block`'s address and free-list linkage (its size
/// alone changes, so nothing needs to be unlinked or reinserted), and the
/// newly-allocated piece is carved from the high-address end. Otherwise
/// the whole block is consumed: it is unlinked from the free list and
/// marked allocated in place.
pub(crate) fn place(free_list: &mut FreeList, block: Block, required: usize) -> Block {
    debug_assert!(block.size() >= required);
    let total = block.size();
    if total >= required + MIN_BLOCK_UNITS {
        let remainder_size = total - required;
        block.write_tags(remainder_size, false);
        let alloc_ptr = unsafe { block.as_ptr().as_ptr().add(remainder_size) };
        let allocated = unsafe { Block::at(NonNull::new_unchecked(alloc_ptr)) };
        allocated.write_tags(required, true);
        allocated
    } else {
        free_list.remove(block);
        block.write_tags(total, true);
        block
    }
}
