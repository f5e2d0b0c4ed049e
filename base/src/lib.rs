//  HF: a boundary-tag heap allocator
//  by Eliza Weisman (eliza@elizas.website)
//
//  Released under the terms of the MIT license. See `LICENSE` in the root
//  directory of this repository for more information.
//
//! Base types shared across the HF allocator crates.
//!
//! This crate holds the bits that don't belong to any one allocator
//! component: the error taxonomy, the sticky process-level error
//! indicator, and a `spin`-backed lock wrapper used to guard the
//! process-wide arena and anchor state.
#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]

use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU8, Ordering};

/// Errors that can be reported by an HF allocator.
///
/// These are the only two ways a public entry point can fail: either
/// placement and growth both ran out of room, or a caller-supplied address
/// doesn't identify a block this allocator currently considers allocated.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// Placement exhausted the free list and the arena refused to grow.
    OutOfMemory,
    /// A pointer handed to `release`/`resize` does not identify a
    /// currently allocated block.
    BadAddress,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory => write!(f, "out of memory"),
            Error::BadAddress => write!(f, "address does not identify an allocated block"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// A `Result` alias for fallible HF allocator operations.
pub type Result<T> = core::result::Result<T, Error>;

/// A sticky, process-level record of the most recent allocator error.
///
/// Errors are signaled via this process-level indicator rather than purely
/// by return value, matching the errno-style convention of the
/// `mm_malloc`/`mm_free`/`mm_realloc` API. The allocator contract is
/// strictly single-threaded, so a plain atomic with relaxed ordering is
/// sufficient here: there is no cross-thread synchronization to provide,
/// only safe interior mutability behind a shared reference.
#[derive(Debug, Default)]
pub struct ErrorIndicator(AtomicU8);

const NONE: u8 = 0;
const OOM: u8 = 1;
const BAD_ADDRESS: u8 = 2;

impl ErrorIndicator {
    /// Construct a new indicator with no error recorded.
    #[inline]
    pub const fn new() -> Self {
        ErrorIndicator(AtomicU8::new(NONE))
    }

    /// Record `err` as the most recent error.
    #[inline]
    pub fn set(&self, err: Error) {
        let code = match err {
            Error::OutOfMemory => OOM,
            Error::BadAddress => BAD_ADDRESS,
        };
        self.0.store(code, Ordering::Relaxed);
    }

    /// Clear the indicator.
    #[inline]
    pub fn clear(&self) {
        self.0.store(NONE, Ordering::Relaxed);
    }

    /// Return the most recently recorded error, if any.
    #[inline]
    pub fn get(&self) -> Option<Error> {
        match self.0.load(Ordering::Relaxed) {
            OOM => Some(Error::OutOfMemory),
            BAD_ADDRESS => Some(Error::BadAddress),
            _ => None,
        }
    }
}

/// A value behind a `spin::Mutex`.
///
/// The allocator is single-threaded by contract, but its anchor and arena
/// state live in process-wide statics, and a lock is the simplest way to
/// give them a single safe point of mutation without reaching for
/// `static mut`.
#[derive(Debug)]
pub struct Locked<T>(spin::Mutex<T>);

impl<T> Locked<T> {
    /// Wrap `value` behind a lock.
    #[inline]
    pub const fn new(value: T) -> Self {
        Locked(spin::Mutex::new(value))
    }
}

impl<T> Deref for Locked<T> {
    type Target = spin::Mutex<T>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for Locked<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
