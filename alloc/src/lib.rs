//  HF: a boundary-tag heap allocator
//  by Eliza Weisman (eliza@elizas.website)
//
//  Released under the terms of the MIT license. See `LICENSE` in the root
//  directory of this repository for more information.
//
//! A boundary-tag, free-list heap allocator over a simulated bump arena.
//!
//! Every block carries a fixed-size record (an "HF unit") at both its low
//! and high address: a header and a footer, always written together so
//! the two can never disagree. Free blocks are additionally threaded onto
//! a circular doubly-linked free list through the link fields of their
//! headers; a single sentinel bracket at each end of the arena keeps
//! neighbor arithmetic from ever having to special-case the arena's edges.
#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]

mod block;
mod bootstrap;
mod freelist;
mod growth;
mod identify;
mod placement;
mod release;
mod stats;

use core::alloc::{GlobalAlloc, Layout};
use core::cmp::min;
use core::ptr::{self, NonNull};

use hf_arena::Arena;
use hf_base::{Error, ErrorIndicator, Locked, Result};
use log::trace;

use block::{bytes_to_units, units_to_bytes, Block, MIN_BLOCK_UNITS};
use freelist::FreeList;
use hf_list::Linked;

pub use placement::PlacementPolicy;
pub use stats::Stats;

/// A boundary-tag heap bound to a particular [`Arena`].
///
/// Most callers want the process-wide singleton exposed through the free
/// functions below ([`mm_init`], [`mm_malloc`], etc.) rather than this
/// type directly; `Heap` is public so tests (and anyone embedding more
/// than one heap) can build an independent instance bound to a private
/// `Arena`.
pub struct Heap<'a> {
    arena: &'a Arena,
    leading_sentinel: Option<Block>,
    tail_sentinel: Option<Block>,
    free_list: FreeList,
    policy: PlacementPolicy,
    errors: ErrorIndicator,
}

// SAFETY: `Heap` is never accessed concurrently — every entry point takes
// `&mut self`, and the process-wide singleton below only ever reaches it
// through a `Locked` mutex guard. The raw `NonNull<Hf>` pointers held by
// its `Block` fields never alias a pointer on another thread while this
// one holds the lock, so moving a `Heap` across threads is sound even
// though `Block` itself carries no `Send` impl of its own.
unsafe impl Send for Heap<'_> {}

impl<'a> Heap<'a> {
    /// Construct a heap over `arena` using first-fit placement. Nothing is
    /// requested from the arena until the first allocation.
    pub fn new(arena: &'a Arena) -> Self {
        Heap::with_policy(arena, PlacementPolicy::default())
    }

    /// Construct a heap over `arena` using the given placement policy.
    pub fn with_policy(arena: &'a Arena, policy: PlacementPolicy) -> Self {
        Heap {
            arena,
            leading_sentinel: None,
            tail_sentinel: None,
            free_list: FreeList::new(),
            policy,
            errors: ErrorIndicator::new(),
        }
    }

    fn ensure_bootstrapped(&mut self) {
        if self.leading_sentinel.is_none() {
            bootstrap::bootstrap(self);
        }
    }

    /// The HF-unit count a request for `bytes` of payload must occupy,
    /// header, footer, and minimum size floor all included.
    fn required_units(bytes: usize) -> usize {
        let units = bytes_to_units(bytes) + 2;
        units.max(MIN_BLOCK_UNITS)
    }

    /// Allocate `bytes` of payload, growing the arena as needed.
    ///
    /// `bytes == 0` is not special-cased: it floors to the same minimum
    /// block every tiny request floors to, and returns a valid, distinct
    /// pointer rather than null.
    pub fn allocate(&mut self, bytes: usize) -> Option<NonNull<u8>> {
        self.ensure_bootstrapped();
        self.errors.clear();
        let required = Self::required_units(bytes);
        loop {
            if let Some(candidate) = placement::find_fit(&self.free_list, required, self.policy) {
                let allocated = placement::place(&mut self.free_list, candidate, required);
                debug_assert!(self.check_invariants());
                trace!("hf-alloc: allocated {} units for {} bytes", required, bytes);
                return Some(allocated.payload_ptr());
            }
            if self.grow(required).is_err() {
                self.errors.set(Error::OutOfMemory);
                return None;
            }
        }
    }

    /// Release a block previously returned by [`Heap::allocate`] or
    /// [`Heap::resize`].
    ///
    /// A null pointer is a no-op. Any other pointer that doesn't identify
    /// a currently allocated block records [`Error::BadAddress`] and is
    /// otherwise ignored.
    pub fn release(&mut self, ptr: *mut u8) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };
        self.errors.clear();
        match identify::identify(self, ptr.as_ptr() as *const u8) {
            Ok(block) => {
                release::release_and_coalesce(self, block);
                debug_assert!(self.check_invariants());
            }
            Err(e) => self.errors.set(e),
        }
    }

    /// Resize a block previously returned by [`Heap::allocate`] or
    /// [`Heap::resize`], preserving its contents up to the smaller of the
    /// old and new sizes.
    ///
    /// `ptr == null` behaves as a fresh [`Heap::allocate`].
    pub fn resize(&mut self, ptr: *mut u8, bytes: usize) -> Option<NonNull<u8>> {
        let Some(old_ptr) = NonNull::new(ptr) else {
            return self.allocate(bytes);
        };
        self.errors.clear();
        let old = match identify::identify(self, old_ptr.as_ptr() as *const u8) {
            Ok(b) => b,
            Err(e) => {
                self.errors.set(e);
                return None;
            }
        };

        let required = Self::required_units(bytes);
        if old.size() >= required {
            // Already big enough; shrinking in place is not attempted, to
            // avoid churning the free list for a request that's already
            // satisfied.
            return Some(old.payload_ptr());
        }

        let old_payload_bytes = units_to_bytes(old.size() - 2);
        let new_ptr = self.allocate(bytes)?;
        let copy_len = min(old_payload_bytes, bytes);
        unsafe {
            ptr::copy_nonoverlapping(old.payload_ptr().as_ptr(), new_ptr.as_ptr(), copy_len);
        }
        self.release(old.payload_ptr().as_ptr());
        Some(new_ptr)
    }

    fn grow(&mut self, min_units: usize) -> Result<()> {
        self.ensure_bootstrapped();
        let new_block = growth::grow(self, min_units)?;
        release::coalesce(self, new_block);
        Ok(())
    }

    /// Rewind the heap to its freshly-bootstrapped state: the arena is
    /// rewound to its bootstrap size and the free list and error
    /// indicator are reinstalled from scratch.
    ///
    /// The sentinels themselves are left as they are rather than
    /// reinstalled: `reset_brk` only moves the arena's high-water mark
    /// back to the position it held right after bootstrap, and nothing
    /// ever writes below that mark again once growth moves past it, so
    /// the original sentinels are still exactly where bootstrap left
    /// them. Bootstrapping a second time here would `sbrk` again and
    /// strand the leading sentinel mid-arena instead of at `heap_lo`.
    pub fn reset(&mut self) {
        self.arena.reset_brk();
        self.free_list = FreeList::new();
        self.errors.clear();
        match self.leading_sentinel {
            Some(leading) => {
                // Re-derive the trailing sentinel from the leading one's
                // own (untouched) size rather than trusting the field left
                // over from whatever growth happened before the reset: it
                // may have been relocated arbitrarily far down the arena.
                self.tail_sentinel = Some(leading.next_neighbor());
                self.free_list.seed_with_sentinel(leading);
            }
            None => self.ensure_bootstrapped(),
        }
    }

    /// The most recently recorded error, if any.
    pub fn last_error(&self) -> Option<Error> {
        self.errors.get()
    }

    /// A point-in-time snapshot of the heap's occupancy.
    pub fn stats(&self) -> Stats {
        stats::stats(self)
    }

    /// Walk the whole arena and free list, checking every invariant this
    /// allocator is meant to uphold. Intended for debug assertions and
    /// tests, not the allocation hot path.
    pub fn check_invariants(&self) -> bool {
        let (Some(leading), Some(tail)) = (self.leading_sentinel, self.tail_sentinel) else {
            return true;
        };
        if !leading.allocated() || !tail.allocated() {
            return false;
        }

        let mut cursor = leading;
        let mut total_units = 0usize;
        let mut free_blocks_physical = 0usize;
        let mut prev_was_free = false;
        loop {
            let footer = cursor.footer();
            if footer.size() != cursor.size() || footer.allocated() != cursor.allocated() {
                return false;
            }
            total_units += cursor.size();
            let is_free = !cursor.allocated();
            if is_free {
                if prev_was_free {
                    return false;
                }
                free_blocks_physical += 1;
            }
            prev_was_free = is_free;
            if cursor.as_ptr() == tail.as_ptr() {
                break;
            }
            cursor = cursor.next_neighbor();
        }

        let committed_bytes =
            (self.arena.heap_hi() as usize + 1).saturating_sub(self.arena.heap_lo() as usize);
        if total_units != bytes_to_units(committed_bytes) {
            return false;
        }

        let mut free_blocks_listed = 0usize;
        for listed in self.free_list.iter_all() {
            if listed.allocated() {
                continue; // the sentinel shares the structure but isn't a free block.
            }
            free_blocks_listed += 1;
            match listed.next_link().get() {
                Some(next) if next.prev_link().get() == Some(listed) => {}
                _ => return false,
            }
        }
        free_blocks_listed == free_blocks_physical
    }
}

static HEAP: Locked<Option<Heap<'static>>> = Locked::new(None);

/// Establish the arena and install sentinels, if the process-wide heap
/// hasn't already been initialized. A no-op otherwise.
pub fn mm_init() {
    let mut guard = HEAP.lock();
    if guard.is_none() {
        *guard = Some(Heap::new(&hf_arena::ARENA));
    }
}

/// Rewind the process-wide heap to its freshly-bootstrapped state,
/// initializing it first if necessary.
pub fn mm_reset() {
    let mut guard = HEAP.lock();
    match guard.as_mut() {
        Some(heap) => heap.reset(),
        None => *guard = Some(Heap::new(&hf_arena::ARENA)),
    }
}

/// Release the underlying arena and clear the process-wide heap. The next
/// call to any other `mm_*` function re-bootstraps from scratch.
pub fn mm_deinit() {
    let mut guard = HEAP.lock();
    hf_arena::ARENA.deinit();
    *guard = None;
}

/// Allocate `bytes` from the process-wide heap, auto-initializing it on
/// first use. Returns null on out-of-memory.
pub fn mm_malloc(bytes: usize) -> *mut u8 {
    let mut guard = HEAP.lock();
    let heap = guard.get_or_insert_with(|| Heap::new(&hf_arena::ARENA));
    heap.allocate(bytes)
        .map(|p| p.as_ptr())
        .unwrap_or(ptr::null_mut())
}

/// Release a pointer previously returned by [`mm_malloc`] or
/// [`mm_realloc`]. A no-op if the process-wide heap was never
/// initialized.
pub fn mm_free(ptr: *mut u8) {
    let mut guard = HEAP.lock();
    if let Some(heap) = guard.as_mut() {
        heap.release(ptr);
    }
}

/// Resize a pointer previously returned by [`mm_malloc`] or
/// [`mm_realloc`], auto-initializing the heap on first use. Returns null
/// on out-of-memory.
pub fn mm_realloc(ptr: *mut u8, bytes: usize) -> *mut u8 {
    let mut guard = HEAP.lock();
    let heap = guard.get_or_insert_with(|| Heap::new(&hf_arena::ARENA));
    heap.resize(ptr, bytes)
        .map(|p| p.as_ptr())
        .unwrap_or(ptr::null_mut())
}

/// The most recently recorded error from the process-wide heap, if any.
pub fn mm_last_error() -> Option<Error> {
    HEAP.lock().as_ref().and_then(Heap::last_error)
}

/// A `GlobalAlloc` adapter over the process-wide heap.
///
/// Requests for alignment stronger than an `Hf` record's natural
/// alignment are out of scope; callers that need over-aligned storage
/// should allocate extra and align within it themselves.
pub struct GlobalHeap;

unsafe impl GlobalAlloc for GlobalHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        debug_assert!(layout.align() <= core::mem::align_of::<usize>() * 3);
        mm_malloc(layout.size())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        mm_free(ptr)
    }

    unsafe fn realloc(&self, ptr: *mut u8, _layout: Layout, new_size: usize) -> *mut u8 {
        mm_realloc(ptr, new_size)
    }
}
