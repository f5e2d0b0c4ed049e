//  HF: a boundary-tag heap allocator
//  by Eliza Weisman (eliza@elizas.website)
//
//  Released under the terms of the MIT license. See `LICENSE` in the root
//  directory of this repository for more information.
//
//! Integration and property tests exercising `hf-alloc` end-to-end,
//! against its public API only: no test here reaches into
//! `hf_alloc::block` or any other crate-private module, the same way
//! `alarm-test` exercised `alarm-base` from the outside as a separate
//! crate rather than from an in-tree `#[cfg(test)]` module.
//!
//! This crate has no public items of its own; it exists to hold the
//! `#[cfg(test)]` module below.
#![cfg(test)]

use hf_alloc::{Heap, PlacementPolicy};
use hf_arena::Arena;
use hf_base::Error;

mod end_to_end {
    use super::*;

    // Scenario 1: `a = allocate(64); b = allocate(64); release(a); c =
    // allocate(64);` — `c` reuses the block `a` occupied (LIFO reuse of a
    // freshly released block).
    #[test]
    fn released_block_is_reused_lifo() {
        let arena = Arena::new();
        let mut heap = Heap::new(&arena);
        let a = heap.allocate(64).unwrap();
        let _b = heap.allocate(64).unwrap();
        heap.release(a.as_ptr());
        let c = heap.allocate(64).unwrap();
        assert_eq!(c, a);
        assert!(heap.check_invariants());
    }

    // Scenario 2: releasing two adjacent blocks in address order (`a`
    // then `b`) merges them into one free block (forward coalesce on the
    // second release).
    #[test]
    fn releasing_in_address_order_coalesces_forward() {
        let arena = Arena::new();
        let mut heap = Heap::new(&arena);
        let a = heap.allocate(64).unwrap();
        let b = heap.allocate(64).unwrap();
        let before = heap.stats();
        heap.release(a.as_ptr());
        heap.release(b.as_ptr());
        assert!(heap.check_invariants());
        assert_eq!(heap.stats().free_block_count, 1);
        assert_eq!(heap.stats().arena_bytes, before.arena_bytes);
    }

    // Scenario 3: releasing two adjacent blocks in reverse address order
    // (`b` then `a`) also merges them into one free block (backward
    // coalesce on the second release).
    #[test]
    fn releasing_in_reverse_address_order_coalesces_backward() {
        let arena = Arena::new();
        let mut heap = Heap::new(&arena);
        let a = heap.allocate(64).unwrap();
        let b = heap.allocate(64).unwrap();
        heap.release(b.as_ptr());
        heap.release(a.as_ptr());
        assert!(heap.check_invariants());
        assert_eq!(heap.stats().free_block_count, 1);
    }

    // Scenario 4: shrinking a resize request is satisfied in place; the
    // existing block already covers the smaller request.
    #[test]
    fn resize_to_a_smaller_size_returns_the_same_pointer() {
        let arena = Arena::new();
        let mut heap = Heap::new(&arena);
        let a = heap.allocate(1024).unwrap();
        let resized = heap.resize(a.as_ptr(), 128).unwrap();
        assert_eq!(resized, a);
        assert!(heap.check_invariants());
    }

    // Scenario 5: growing a resize request moves the payload to a new
    // block, preserving the overlapping prefix; the old payload pointer
    // is no longer valid afterward.
    #[test]
    fn resize_to_a_larger_size_moves_and_preserves_the_prefix() {
        let arena = Arena::new();
        let mut heap = Heap::new(&arena);
        let a = heap.allocate(64).unwrap();
        let pattern: Vec<u8> = (0..64u32).map(|i| (i % 251) as u8).collect();
        unsafe {
            core::ptr::copy_nonoverlapping(pattern.as_ptr(), a.as_ptr(), pattern.len());
        }
        let b = heap.resize(a.as_ptr(), 1024).unwrap();
        assert_ne!(b, a);
        let copied = unsafe { core::slice::from_raw_parts(b.as_ptr(), 64) };
        assert_eq!(copied, pattern.as_slice());
        assert!(heap.check_invariants());

        // `a` no longer identifies a live allocation.
        heap.release(a.as_ptr());
        assert_eq!(heap.last_error(), Some(Error::BadAddress));
    }

    // Scenario 6: allocating past the initial arena's capacity triggers
    // growth; the allocation that provoked it still succeeds, and the
    // invariants (including the block-size/arena-size accounting) hold
    // against the grown arena.
    #[test]
    fn exhausting_the_initial_arena_triggers_growth_and_then_succeeds() {
        let arena = Arena::new();
        let mut heap = Heap::new(&arena);
        let initial_arena_bytes = heap.stats().arena_bytes;

        // Fill the bootstrap arena with small allocations until the next
        // one can't be satisfied without growing.
        let mut held = Vec::new();
        loop {
            match heap.allocate(32) {
                Some(p) => held.push(p),
                None => break,
            }
            if heap.stats().arena_bytes > initial_arena_bytes {
                break;
            }
        }
        assert!(heap.stats().arena_bytes >= initial_arena_bytes);
        let grown = heap.allocate(hf_arena::PAGE_SIZE * 4).unwrap();
        assert!(!grown.as_ptr().is_null());
        assert!(heap.check_invariants());
    }
}

mod boundaries {
    use super::*;

    #[test]
    fn zero_byte_allocation_round_trips_through_release() {
        let arena = Arena::new();
        let mut heap = Heap::new(&arena);
        let p = heap.allocate(0).unwrap();
        heap.release(p.as_ptr());
        assert_eq!(heap.last_error(), None);
        assert!(heap.check_invariants());
    }

    #[test]
    fn release_of_null_does_not_set_the_error_indicator() {
        let arena = Arena::new();
        let mut heap = Heap::new(&arena);
        heap.release(core::ptr::null_mut());
        assert_eq!(heap.last_error(), None);
    }

    #[test]
    fn an_oversized_request_fails_with_out_of_memory_and_leaves_the_arena_unchanged() {
        let arena = Arena::new();
        let mut heap = Heap::new(&arena);
        let _ = heap.allocate(64).unwrap();
        let before = heap.stats();
        let result = heap.allocate(hf_arena::MAX_ARENA_BYTES * 2);
        assert!(result.is_none());
        assert_eq!(heap.last_error(), Some(Error::OutOfMemory));
        assert_eq!(heap.stats(), before);
    }

    #[test]
    fn release_of_an_interior_pointer_succeeds_via_the_slow_path() {
        let arena = Arena::new();
        let mut heap = Heap::new(&arena);
        let p = heap.allocate(256).unwrap();
        let interior = unsafe { p.as_ptr().add(37) };
        heap.release(interior);
        assert_eq!(heap.last_error(), None);
        assert!(heap.check_invariants());
    }

    #[test]
    fn releasing_a_pointer_twice_reports_bad_address_the_second_time() {
        let arena = Arena::new();
        let mut heap = Heap::new(&arena);
        let p = heap.allocate(64).unwrap();
        heap.release(p.as_ptr());
        assert_eq!(heap.last_error(), None);
        heap.release(p.as_ptr());
        assert_eq!(heap.last_error(), Some(Error::BadAddress));
    }
}

// The process-wide `mm_*` singleton shares a single static `HEAP` across
// the whole test binary, so every scenario that touches it lives in this
// one `#[test]` function: splitting it across functions would let
// `cargo test`'s default parallel test threads interleave unrelated
// allocations against the same heap.
#[test]
fn process_wide_singleton_lifecycle() {
    hf_alloc::mm_deinit();

    let a = hf_alloc::mm_malloc(64);
    assert!(!a.is_null());
    let b = hf_alloc::mm_malloc(64);
    assert!(!b.is_null());
    hf_alloc::mm_free(a);
    let c = hf_alloc::mm_malloc(64);
    assert_eq!(c, a);

    let grown = hf_alloc::mm_realloc(c, 4096);
    assert!(!grown.is_null());
    assert_ne!(grown, c);

    hf_alloc::mm_free(grown);
    hf_alloc::mm_free(b);
    assert_eq!(hf_alloc::mm_last_error(), None);

    // A double free is reported without panicking.
    hf_alloc::mm_free(grown);
    assert_eq!(hf_alloc::mm_last_error(), Some(Error::BadAddress));

    // `mm_reset` rewinds the arena and clears the sticky error.
    hf_alloc::mm_reset();
    assert_eq!(hf_alloc::mm_last_error(), None);
    let fresh = hf_alloc::mm_malloc(32);
    assert!(!fresh.is_null());
    hf_alloc::mm_free(fresh);

    hf_alloc::mm_deinit();
}

mod invariants {
    use super::*;
    use quickcheck::TestResult;

    /// A scripted sequence of allocate/release operations, replayed
    /// against a single heap, checking every invariant after each step.
    ///
    /// Each `u8` in the script is interpreted as: even values allocate a
    /// small-to-medium size derived from the byte; odd values release the
    /// least-recently-allocated still-live pointer, if any. This keeps
    /// shrinkage meaningful for quickcheck without needing a custom
    /// `Arbitrary` type.
    fn replay(script: &[u8], policy: PlacementPolicy) -> bool {
        let arena = Arena::new();
        let mut heap = Heap::with_policy(&arena, policy);
        let mut live: Vec<*mut u8> = Vec::new();
        for &byte in script {
            if byte % 2 == 0 {
                let size = (byte as usize) * 4 + 1;
                if let Some(p) = heap.allocate(size) {
                    live.push(p.as_ptr());
                }
            } else if !live.is_empty() {
                let p = live.remove(0);
                heap.release(p);
            }
            if !heap.check_invariants() {
                return false;
            }
        }
        for p in live {
            heap.release(p);
            if !heap.check_invariants() {
                return false;
            }
        }
        true
    }

    quickcheck::quickcheck! {
        fn invariants_hold_after_every_operation_first_fit(script: Vec<u8>) -> TestResult {
            if script.len() > 200 {
                return TestResult::discard();
            }
            TestResult::from_bool(replay(&script, PlacementPolicy::FirstFit))
        }

        fn invariants_hold_after_every_operation_best_fit(script: Vec<u8>) -> TestResult {
            if script.len() > 200 {
                return TestResult::discard();
            }
            TestResult::from_bool(replay(&script, PlacementPolicy::BestFit))
        }
    }

    quickcheck::quickcheck! {
        // For all `n > 0`: releasing the block `allocate(n)` just
        // returned brings the heap's occupancy back to what it was
        // beforehand (modulo arena growth, which never shrinks back on
        // its own and so is excluded from the comparison below by
        // comparing free/allocated bytes rather than raw arena size).
        fn release_after_allocate_restores_occupancy(n: usize) -> TestResult {
            let n = n % (64 * 1024);
            if n == 0 {
                return TestResult::discard();
            }
            let arena = Arena::new();
            let mut heap = Heap::new(&arena);
            let before = heap.stats();
            let p = match heap.allocate(n) {
                Some(p) => p,
                None => return TestResult::discard(),
            };
            heap.release(p.as_ptr());
            let after = heap.stats();
            TestResult::from_bool(
                after.allocated_bytes == before.allocated_bytes
                    && after.free_bytes >= before.free_bytes
                    && heap.check_invariants(),
            )
        }

        // For all `n, m > 0`: `resize(allocate(n), m)` returns a pointer
        // into a block whose payload covers at least `m` bytes, and the
        // first `min(n, m)` bytes of payload are preserved.
        fn resize_preserves_the_common_prefix(n: usize, m: usize) -> TestResult {
            let n = (n % 4096) + 1;
            let m = (m % 4096) + 1;
            let arena = Arena::new();
            let mut heap = Heap::new(&arena);
            let a = match heap.allocate(n) {
                Some(p) => p,
                None => return TestResult::discard(),
            };
            let pattern: Vec<u8> = (0..n).map(|i| (i % 256) as u8).collect();
            unsafe {
                core::ptr::copy_nonoverlapping(pattern.as_ptr(), a.as_ptr(), n);
            }
            let b = match heap.resize(a.as_ptr(), m) {
                Some(p) => p,
                None => return TestResult::discard(),
            };
            let common = n.min(m);
            let tail = unsafe { core::slice::from_raw_parts(b.as_ptr(), common) };
            TestResult::from_bool(tail == &pattern[..common] && heap.check_invariants())
        }
    }
}
