//! Arena growth: extending the committed region when placement can't find
//! a big enough free block.

use core::ptr::NonNull;

use crate::block::{bytes_to_units, units_to_bytes, Block, Hf};
use crate::Heap;

fn round_up_to_multiple(n: usize, m: usize) -> usize {
    debug_assert!(m > 0);
    ((n + m - 1) / m) * m
}

/// Grow the arena by at least `min_units` HF units and return the new
/// free block, already tagged free but not yet linked into the free list
/// or coalesced with any predecessor (callers pass it through
/// [`crate::release::coalesce`]).
///
/// The request is rounded up to a whole number of pages, in HF units, the
/// same way a real `sbrk`-backed allocator rounds requests up to whole
/// pages. The new region begins immediately after the current trailing
/// sentinel: that sentinel's one-unit header slot is reused as the header
/// of the new free block (its footer lands at the far end of the newly
/// committed region, minus one unit for the fresh trailing sentinel
/// installed there), so only `rounded - 1` additional units need to come
/// from the arena provider on top of the unit the old sentinel already
/// occupied.
pub(crate) fn grow(heap: &mut Heap, min_units: usize) -> hf_base::Result<Block> {
    let page_units = bytes_to_units(heap.arena.page_size()).max(1);
    let rounded = round_up_to_multiple(min_units.max(1), page_units);

    let tail = heap
        .tail_sentinel
        .expect("grow is only called once the arena has been bootstrapped");

    let new_region_units = rounded; // `rounded - 1` new free-block units, plus 1 new sentinel unit.
    let new_region = heap.arena.sbrk(units_to_bytes(new_region_units))?;
    debug_assert_eq!(
        new_region.as_ptr() as usize,
        tail.as_ptr().as_ptr() as usize + units_to_bytes(1)
    );

    let free_block = tail;
    free_block.write_tags(rounded, false);

    let new_tail_ptr = unsafe { free_block.as_ptr().as_ptr().add(rounded) as *mut Hf };
    let new_tail = unsafe { Block::at(NonNull::new_unchecked(new_tail_ptr)) };
    new_tail.write_tags(1, true);
    heap.tail_sentinel = Some(new_tail);

    Ok(free_block)
}
