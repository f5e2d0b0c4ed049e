//  HF: a boundary-tag heap allocator
//  by Eliza Weisman (eliza@elizas.website)
//
//  Released under the terms of the MIT license. See `LICENSE` in the root
//  directory of this repository for more information.
//
//! A simulated `sbrk`-style bump arena.
//!
//! This crate is an opaque linear bump region whose base is page-aligned
//! and whose growth returns a pointer to newly committed trailing bytes.
//! It owns a single fixed-capacity backing buffer and hands out a
//! monotonically growing prefix of it, the same way a real `sbrk(2)` hands
//! out a monotonically growing prefix of a process's address space.
//!
//! The backing buffer is reserved up front (see [`MAX_ARENA_BYTES`]) rather
//! than grown with successive reallocations, because growing the core
//! allocator's arena must never invalidate pointers the caller already
//! holds into it.
#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]

extern crate alloc;

use alloc::boxed::Box;
use core::ptr::NonNull;

use hf_base::{Error, Locked, Result};
use log::{debug, trace};

/// The simulated page size used for arena growth rounding.
///
/// Real `sbrk`-backed allocators grow in whole pages; we pick a
/// conventional 4 KiB page so the growth arithmetic in `hf-alloc` exercises
/// the same rounding a real deployment would see.
pub const PAGE_SIZE: usize = 4096;

/// The maximum size the simulated arena can ever grow to.
///
/// A real arena is bounded by the address space and the OS's willingness to
/// back more pages; ours is bounded by this fixed reservation. Requests to
/// grow past it fail with [`Error::OutOfMemory`], exactly as a real `sbrk`
/// would fail once the process's data segment limit is reached.
pub const MAX_ARENA_BYTES: usize = 64 * 1024 * 1024;

struct Inner {
    backing: Option<Box<[u8]>>,
    /// Offset of the current high-water mark within `backing`.
    brk: usize,
    /// `brk` as of the last call to [`Arena::mark_bootstrapped`].
    bootstrap_brk: usize,
}

impl Inner {
    const fn new() -> Self {
        Inner {
            backing: None,
            brk: 0,
            bootstrap_brk: 0,
        }
    }
}

/// A simulated, process-wide `sbrk` arena.
///
/// There is ordinarily exactly one of these per process (see
/// [`static@ARENA`]); the type itself carries no process-global state so it
/// remains straightforward to construct a private instance for testing.
pub struct Arena {
    inner: Locked<Inner>,
}

impl Arena {
    /// Construct an uninitialized arena. Call [`Arena::init`] before use.
    pub const fn new() -> Self {
        Arena {
            inner: Locked::new(Inner::new()),
        }
    }

    /// Prepare the underlying arena, allocating its backing storage if this
    /// is the first call since construction or the last [`Arena::deinit`].
    pub fn init(&self) {
        let mut inner = self.inner.lock();
        if inner.backing.is_none() {
            debug!("hf-arena: reserving {} bytes of backing storage", MAX_ARENA_BYTES);
            inner.backing = Some(alloc::vec![0u8; MAX_ARENA_BYTES].into_boxed_slice());
            inner.brk = 0;
            inner.bootstrap_brk = 0;
        }
    }

    /// Release the underlying arena. A later call to any other method
    /// auto-initializes a fresh, empty arena; a request preceding explicit
    /// initialization is not an error.
    pub fn deinit(&self) {
        let mut inner = self.inner.lock();
        inner.backing = None;
        inner.brk = 0;
        inner.bootstrap_brk = 0;
    }

    /// Record the current high-water mark as the arena's bootstrap size.
    ///
    /// The allocator core calls this once, immediately after installing
    /// the initial sentinels, so that [`Arena::reset_brk`] has a size to
    /// rewind to.
    pub fn mark_bootstrapped(&self) {
        let mut inner = self.inner.lock();
        inner.bootstrap_brk = inner.brk;
    }

    /// Rewind the arena to its bootstrap size.
    pub fn reset_brk(&self) {
        let mut inner = self.inner.lock();
        let target = inner.bootstrap_brk;
        trace!("hf-arena: reset_brk to {} bytes", target);
        inner.brk = target;
    }

    /// Extend the arena by `bytes`, returning a pointer to the start of the
    /// newly committed region.
    ///
    /// Fails with [`Error::OutOfMemory`] if the request would exceed
    /// [`MAX_ARENA_BYTES`]. `bytes` is not itself rounded here; callers
    /// that want page-granularity growth should round up before calling
    /// (see `hf-alloc`'s `grow`, which rounds to whole HF units of at
    /// least one page).
    pub fn sbrk(&self, bytes: usize) -> Result<NonNull<u8>> {
        self.ensure_init();
        let mut inner = self.inner.lock();
        let backing = inner.backing.as_mut().expect("arena initialized above");
        let new_brk = inner.brk.checked_add(bytes).filter(|&n| n <= backing.len());
        match new_brk {
            Some(new_brk) => {
                let start = inner.brk;
                inner.brk = new_brk;
                trace!("hf-arena: sbrk({}) -> offset {}", bytes, start);
                let ptr = unsafe { backing.as_mut_ptr().add(start) };
                Ok(unsafe { NonNull::new_unchecked(ptr) })
            }
            None => Err(Error::OutOfMemory),
        }
    }

    /// The inclusive lower bound of the currently committed arena.
    ///
    /// Returns null if the arena has never been initialized.
    pub fn heap_lo(&self) -> *const u8 {
        let inner = self.inner.lock();
        match &inner.backing {
            Some(backing) => backing.as_ptr(),
            None => core::ptr::null(),
        }
    }

    /// The inclusive upper bound of the currently committed arena.
    ///
    /// Returns null if nothing has been committed yet.
    pub fn heap_hi(&self) -> *const u8 {
        let inner = self.inner.lock();
        match &inner.backing {
            Some(backing) if inner.brk > 0 => unsafe { backing.as_ptr().add(inner.brk - 1) },
            _ => core::ptr::null(),
        }
    }

    /// The page size used to round arena growth.
    #[inline]
    pub const fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    fn ensure_init(&self) {
        if self.inner.lock().backing.is_none() {
            self.init();
        }
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide arena instance.
///
/// The anchor and the underlying arena state are process-wide by default:
/// `hf-alloc`'s `Heap` is built against this single instance, though
/// nothing prevents constructing a private `Arena` for isolated tests.
pub static ARENA: Arena = Arena::new();
