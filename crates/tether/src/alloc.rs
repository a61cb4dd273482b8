//! The scratch allocator for the target-resident heap.
//!
//! The target statically reserves one contiguous byte array as a
//! host-managed heap; the host carves it into 8-byte-aligned first-fit
//! slots. Liveness is deterministic: every allocation hands out an
//! [`Rc<Allocation>`] keepalive, the allocator only holds [`Weak`] ends,
//! and a slot whose last strong handle is gone is reclaimed on the next
//! [`ScratchAllocator::autofree`] (which runs before every allocation).
//! An explicit [`ScratchAllocator::free`] is available when dropping the
//! handle is inconvenient.

use std::rc::{Rc, Weak};

use crate::error::{Error, Result};

/// A live slot in the scratch region. Holding the `Rc` keeps the slot
/// reserved.
#[derive(Debug)]
pub struct Allocation {
    /// Absolute target address of the slot.
    pub address: u64,
    /// Slot size in bytes.
    pub size: u64,
}

/// Manages one fixed scratch region of the target's address space.
pub struct ScratchAllocator {
    base: u64,
    size: u64,
    live: Vec<Weak<Allocation>>,
}

/// Rounds `value` up to the next multiple of 8.
fn ceil8(value: u64) -> u64 {
    (value + 7) & !7
}

impl ScratchAllocator {
    /// Creates an allocator over the region `[base, base + size)`.
    #[must_use]
    pub fn new(base: u64, size: u64) -> Self {
        Self {
            base,
            size,
            live: Vec::new(),
        }
    }

    /// Base address of the managed region.
    #[must_use]
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Total size of the managed region in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of live allocations.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Reserves `size` bytes and returns the keepalive handle.
    ///
    /// Runs [`ScratchAllocator::autofree`] first, then takes the lowest
    /// 8-byte-aligned gap that fits.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`] when no gap is large enough.
    pub fn allocate(&mut self, size: u64) -> Result<Rc<Allocation>> {
        self.autofree();
        let address = self.find_slot(size)?;
        let allocation = Rc::new(Allocation { address, size });
        self.live.push(Rc::downgrade(&allocation));
        Ok(allocation)
    }

    /// Drops bookkeeping for slots whose keepalive handle is gone.
    pub fn autofree(&mut self) {
        self.live.retain(|weak| weak.strong_count() > 0);
    }

    /// Explicitly releases a slot, regardless of outstanding handles.
    pub fn free(&mut self, allocation: &Rc<Allocation>) {
        self.live
            .retain(|weak| !std::ptr::eq(weak.as_ptr(), Rc::as_ptr(allocation)));
    }

    /// Lowest-address first fit with 8-byte alignment between slots.
    fn find_slot(&self, required: u64) -> Result<u64> {
        let mut taken: Vec<Rc<Allocation>> =
            self.live.iter().filter_map(Weak::upgrade).collect();
        taken.sort_by_key(|a| a.address);

        let mut search = self.base;
        for slot in &taken {
            if slot.address - search >= required {
                return Ok(search);
            }
            search = ceil8(slot.address + slot.size);
        }
        if self.base + self.size >= search + required {
            return Ok(search);
        }
        Err(Error::OutOfMemory)
    }
}
