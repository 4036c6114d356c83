//! The contiguous byte range backing the chunk heap, acquired from the OS
//! via `sbrk`, mirroring how the source this was distilled from grows its
//! heap by moving the process break directly rather than going through
//! `mmap`.

use std::ptr::NonNull;

use tracing::debug;

use crate::error::Error;

/// Owns the contiguous `[start, start + capacity)` byte range the chunk
/// list lives in. Never shrinks; never returns memory to the OS.
pub struct HeapRegion {
    start: NonNull<u8>,
    capacity: usize,
}

// SAFETY: `HeapRegion` is just a bookkeeping wrapper around a raw pointer
// obtained from `sbrk`; it performs no aliasing of its own, and the
// surrounding `Gc` singleton restricts all access to a single thread at a
// time (see `gc.rs`).
unsafe impl Send for HeapRegion {}

impl HeapRegion {
    /// Requests `capacity` bytes from the OS via `sbrk` to serve as the
    /// initial heap region.
    pub fn new(capacity: usize) -> Result<Self, Error> {
        let start = sbrk(capacity)?;
        debug!(capacity, ?start, "heap region acquired");
        Ok(Self { start, capacity })
    }

    #[must_use]
    pub fn start(&self) -> NonNull<u8> {
        self.start
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Address one past the end of the region.
    #[must_use]
    pub fn end(&self) -> NonNull<u8> {
        // SAFETY: `capacity` bytes starting at `start` were reserved by `sbrk`.
        unsafe { NonNull::new_unchecked(self.start.as_ptr().add(self.capacity)) }
    }

    #[must_use]
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        let addr = ptr.as_ptr() as usize;
        let start = self.start.as_ptr() as usize;
        addr >= start && addr < start + self.capacity
    }

    /// Grows the region by at least `shortfall` bytes, requesting
    /// `2 * shortfall` from the OS per the reference growth policy. Fails
    /// loudly (rather than silently fragmenting the heap across two
    /// disjoint ranges) if the OS hands back a non-contiguous extension.
    pub fn grow(&mut self, shortfall: usize) -> Result<(), Error> {
        let expansion = shortfall
            .checked_mul(2)
            .expect("growth request overflowed usize");
        let new_block = sbrk(expansion)?;
        if new_block != self.end() {
            // The break moved out from under us, most likely because
            // something else in the process also called sbrk. We cannot
            // safely treat the heap as one contiguous range anymore.
            panic!(
                "heap growth was not contiguous: expected new block at {:?}, OS returned {:?}",
                self.end(),
                new_block
            );
        }
        self.capacity += expansion;
        debug!(
            added = expansion,
            new_capacity = self.capacity,
            "heap region grown"
        );
        Ok(())
    }
}

/// Moves the process break forward by `bytes` and returns the start of
/// the newly acquired range.
fn sbrk(bytes: usize) -> Result<NonNull<u8>, Error> {
    // SAFETY: `sbrk` is a process-global syscall wrapper; the heap region
    // owning caller is responsible for never calling this concurrently
    // from more than one thread (an explicit Non-goal of this core).
    let prev = unsafe { libc::sbrk(bytes as libc::intptr_t) };
    if prev == usize::MAX as *mut libc::c_void {
        return Err(Error::OutOfMemory);
    }
    // SAFETY: a successful `sbrk` never returns null.
    Ok(unsafe { NonNull::new_unchecked(prev.cast::<u8>()) })
}
