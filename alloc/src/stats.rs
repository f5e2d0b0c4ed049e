//! Point-in-time usage statistics, computed by walking the physical block
//! chain.

use crate::block::units_to_bytes;
use crate::Heap;

/// A snapshot of the arena's occupancy.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    /// Total bytes currently committed from the arena, sentinels included.
    pub arena_bytes: usize,
    /// Bytes held by free blocks (header and footer included).
    pub free_bytes: usize,
    /// Bytes held by allocated blocks, sentinels excluded.
    pub allocated_bytes: usize,
    /// Number of free blocks currently on the free list.
    pub free_block_count: usize,
}

pub(crate) fn stats(heap: &Heap) -> Stats {
    let Some(leading) = heap.leading_sentinel else {
        return Stats::default();
    };
    let tail = heap
        .tail_sentinel
        .expect("tail sentinel is always set alongside the leading sentinel");

    let mut out = Stats::default();
    let mut cursor = leading;
    loop {
        let size_bytes = units_to_bytes(cursor.size());
        out.arena_bytes += size_bytes;
        if cursor.as_ptr() == leading.as_ptr() || cursor.as_ptr() == tail.as_ptr() {
            // Sentinels aren't counted as allocated user blocks.
        } else if cursor.allocated() {
            out.allocated_bytes += size_bytes;
        } else {
            out.free_bytes += size_bytes;
            out.free_block_count += 1;
        }
        if cursor.as_ptr() == tail.as_ptr() {
            break;
        }
        cursor = cursor.next_neighbor();
    }
    out
}
