//! Recovering a block from a payload pointer handed back by a caller.

use core::mem::align_of;
use core::ptr::NonNull;

use hf_base::Error;

use crate::block::{Block, Hf, MIN_BLOCK_UNITS};
use crate::Heap;

/// Recover the allocated block owning `ptr`, or report why `ptr` doesn't
/// identify one.
///
/// Takes a fast path when `ptr` is aligned the way a genuine payload
/// pointer always is: step back one `Hf` unit and check that what's there
/// looks like a consistent, allocated block header whose footer agrees.
/// Any address that fails that check — including one that's merely
/// misaligned, or that points partway into a block's payload rather than
/// at its start — falls back to a linear walk from the leading sentinel,
/// which is slower but always correct.
pub(crate) fn identify(heap: &Heap, ptr: *const u8) -> hf_base::Result<Block> {
    let lo = heap.arena.heap_lo();
    let hi = heap.arena.heap_hi();
    if ptr.is_null() || lo.is_null() || (ptr as usize) <= (lo as usize) || (ptr as usize) > (hi as usize)
    {
        return Err(Error::BadAddress);
    }

    if (ptr as usize) % align_of::<Hf>() == 0 {
        let candidate_ptr = unsafe { (ptr as *mut Hf).sub(1) };
        if (candidate_ptr as usize) >= (lo as usize) {
            let candidate = unsafe { Block::at(NonNull::new_unchecked(candidate_ptr)) };
            if candidate.allocated() && candidate.size() >= MIN_BLOCK_UNITS {
                let footer = candidate.footer();
                if footer.size() == candidate.size() && footer.allocated() {
                    return Ok(candidate);
                }
            }
        }
    }

    let leading = heap
        .leading_sentinel
        .expect("identify is only called once the arena has been bootstrapped");
    let mut cursor = leading;
    loop {
        let next = cursor.next_neighbor();
        let next_addr = next.as_ptr().as_ptr() as usize;
        if next_addr > ptr as usize {
            return if cursor.allocated() {
                Ok(cursor)
            } else {
                Err(Error::BadAddress)
            };
        }
        if next_addr >= hi as usize {
            return Err(Error::BadAddress);
        }
        cursor = next;
    }
}
