//! Block layout and tag arithmetic.
//!
//! Every block, free or allocated, begins and ends with an `Hf` record: a
//! header at the low address and a footer (an identical record) at the
//! high address. Matching header and footer sizes let a predecessor be
//! found by reading backwards from any block's own header.

use core::cell::Cell;
use core::ptr::NonNull;

use hf_list::{Link, Linked};
use static_assertions::const_assert;

/// The fixed-size record stored at both ends of every block.
///
/// `prev_free`/`next_free` are only meaningful while the block they belong
/// to is free and linked into the free list; a footer's copies of these
/// fields are never read. `meta` packs the block's size in HF units into
/// all but its low bit, which carries the allocated flag.
#[repr(C)]
pub(crate) struct Hf {
    prev_free: Cell<usize>,
    next_free: Cell<usize>,
    meta: Cell<usize>,
}

/// The size, in bytes, of one HF unit.
pub(crate) const HF_SIZE: usize = core::mem::size_of::<Hf>();

/// The smallest legal block size, in HF units: one unit each for header and
/// footer, plus two units of payload (enough to hold the free-list links
/// once the block is freed).
pub(crate) const MIN_BLOCK_UNITS: usize = 4;

const_assert!(core::mem::size_of::<Hf>() % core::mem::align_of::<Hf>() == 0);
const_assert!(MIN_BLOCK_UNITS >= 3);

/// Round a byte count up to whole HF units.
#[inline]
pub(crate) fn bytes_to_units(n: usize) -> usize {
    (n + HF_SIZE - 1) / HF_SIZE
}

/// Convert a count of whole HF units to bytes.
#[inline]
pub(crate) fn units_to_bytes(units: usize) -> usize {
    units * HF_SIZE
}

/// A typed, copyable handle to a block's header.
///
/// `Block` is a thin view over bytes living in the arena; it does not own
/// them. Equality and the free-list linkage below both compare by address.
#[derive(Copy, Clone)]
pub(crate) struct Block(NonNull<Hf>);

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Block {
    /// Construct a `Block` over the `Hf` record at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live, correctly aligned `Hf` record inside the
    /// arena.
    #[inline]
    pub(crate) unsafe fn at(ptr: NonNull<Hf>) -> Block {
        Block(ptr)
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> NonNull<Hf> {
        self.0
    }

    #[inline]
    fn hf(&self) -> &Hf {
        unsafe { self.0.as_ref() }
    }

    /// The block's size, in HF units, including both its header and footer.
    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.hf().meta.get() >> 1
    }

    #[inline]
    pub(crate) fn allocated(&self) -> bool {
        self.hf().meta.get() & 1 == 1
    }

    /// Overwrite both this block's header and its footer (computed from
    /// `size`, not the block's current size) to record `size`/`allocated`.
    ///
    /// This is the only way tags are ever written: header and footer are
    /// always updated together, so the two can never disagree.
    pub(crate) fn write_tags(&self, size: usize, allocated: bool) {
        debug_assert!(size >= 1);
        let packed = (size << 1) | allocated as usize;
        self.hf().meta.set(packed);
        let footer_ptr = unsafe { self.0.as_ptr().add(size - 1) };
        unsafe { (*footer_ptr).meta.set(packed) };
    }

    /// This block's footer, read as a `Block` in its own right.
    #[inline]
    pub(crate) fn footer(&self) -> Block {
        let footer_ptr = unsafe { self.0.as_ptr().add(self.size() - 1) };
        Block(unsafe { NonNull::new_unchecked(footer_ptr) })
    }

    /// The pointer handed to callers: the first byte following this
    /// block's header.
    #[inline]
    pub(crate) fn payload_ptr(&self) -> NonNull<u8> {
        let ptr = unsafe { self.0.as_ptr().add(1) as *mut u8 };
        unsafe { NonNull::new_unchecked(ptr) }
    }

    /// Recover the `Block` that owns `ptr`, assuming `ptr` is exactly a
    /// payload pointer this allocator previously handed out (one HF unit
    /// past the block's header).
    ///
    /// # Safety
    ///
    /// `ptr` must be the payload pointer of a live block.
    #[inline]
    pub(crate) unsafe fn from_payload_ptr(ptr: NonNull<u8>) -> Block {
        let header = (ptr.as_ptr() as *mut Hf).sub(1);
        Block(NonNull::new_unchecked(header))
    }

    /// The block immediately preceding this one in address order, found by
    /// reading its footer just before this block's header.
    #[inline]
    pub(crate) fn prev_neighbor(&self) -> Block {
        let prev_footer = unsafe { self.0.as_ptr().sub(1) };
        let prev_size = unsafe { (*prev_footer).meta.get() >> 1 };
        let prev_header = unsafe { self.0.as_ptr().sub(prev_size) };
        Block(unsafe { NonNull::new_unchecked(prev_header) })
    }

    /// The block immediately following this one in address order.
    #[inline]
    pub(crate) fn next_neighbor(&self) -> Block {
        let next_header = unsafe { self.0.as_ptr().add(self.size()) };
        Block(unsafe { NonNull::new_unchecked(next_header) })
    }
}

impl Linked for Block {
    fn next_link(&self) -> Link<Block> {
        let raw = self.hf().next_free.get();
        if raw == 0 {
            Link::none()
        } else {
            Link::some(Block(unsafe { NonNull::new_unchecked(raw as *mut Hf) }))
        }
    }

    fn prev_link(&self) -> Link<Block> {
        let raw = self.hf().prev_free.get();
        if raw == 0 {
            Link::none()
        } else {
            Link::some(Block(unsafe { NonNull::new_unchecked(raw as *mut Hf) }))
        }
    }

    fn set_next_link(&self, link: Link<Block>) {
        let raw = link.get().map(|b| b.0.as_ptr() as usize).unwrap_or(0);
        self.hf().next_free.set(raw);
    }

    fn set_prev_link(&self, link: Link<Block>) {
        let raw = link.get().map(|b| b.0.as_ptr() as usize).unwrap_or(0);
        self.hf().prev_free.set(raw);
    }
}
