//! Arena bootstrap: the one-time setup that installs the leading and
//! trailing sentinels and seeds the free list.

use core::ptr::NonNull;

use crate::block::{units_to_bytes, Block, Hf};
use crate::Heap;

/// Size, in HF units, of the bootstrap leading sentinel.
///
/// Unlike the trailing sentinel (one unit), the leading sentinel is sized
/// as a full minimum-size block. This lets it double as the free list's
/// permanent anchor member without needing a special case for a
/// sub-minimum "block" anywhere neighbor or placement arithmetic walks
/// through it: its header and footer agree the same way any other four-
/// unit block's would, and only its allocated bit marks it as exempt from
/// ever being handed out.
const LEADING_SENTINEL_UNITS: usize = 4;

/// Request the arena's first page of memory and install both sentinels.
///
/// Called lazily on first use rather than requiring an explicit call
/// before the allocator will do anything: an allocation request preceding
/// bootstrap simply triggers it.
pub(crate) fn bootstrap(heap: &mut Heap) {
    heap.arena.init();
    let bytes = units_to_bytes(LEADING_SENTINEL_UNITS + 1);
    let base = heap
        .arena
        .sbrk(bytes)
        .expect("bootstrap sbrk request is far smaller than the arena's reservation");

    let leading = unsafe { Block::at(base.cast::<Hf>()) };
    leading.write_tags(LEADING_SENTINEL_UNITS, true);
    heap.free_list.seed_with_sentinel(leading);

    let trailing_ptr = unsafe { base.as_ptr().add(units_to_bytes(LEADING_SENTINEL_UNITS)) as *mut Hf };
    let trailing = unsafe { Block::at(NonNull::new_unchecked(trailing_ptr)) };
    trailing.write_tags(1, true);

    heap.leading_sentinel = Some(leading);
    heap.tail_sentinel = Some(trailing);
    heap.arena.mark_bootstrapped();
}
