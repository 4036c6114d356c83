//! Best-fit allocation, splitting, coalescing, and heap growth over the
//! chunk list owned by [`GcState`](crate::state::GcState).
//!
//! These are plain inherent methods on the shared state rather than a
//! standalone `Allocator` type with its own handle to a collector: the
//! collector needs the same chunk list and address index this module
//! mutates, and giving each subsystem a back-reference to the other would
//! just recreate the reference cycle a capability-object split is meant to
//! avoid. A single state struct with its behavior partitioned across
//! modules sidesteps the cycle entirely.

use std::ptr::NonNull;

use tracing::trace;

use crate::chunk::{ChunkHeader, HEADER_SIZE};
use crate::error::Error;
use crate::state::GcState;

/// A read-only snapshot of one chunk, for introspection by the thin
/// out-of-core layers (e.g. a heap dump). Never produced from inside a
/// mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    pub addr: usize,
    pub size: usize,
    pub is_free: bool,
}

impl GcState {
    /// Returns a payload pointer of at least `size` bytes, or `None` if
    /// `size` is zero. If `root_slot` is provided, the slot is registered
    /// as a GC root once the allocation succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the heap cannot grow, or
    /// [`Error::IndexFull`] if the address index has no free slots.
    pub fn allocate(
        &mut self,
        size: usize,
        root_slot: Option<NonNull<*mut u8>>,
    ) -> Result<Option<NonNull<u8>>, Error> {
        if size == 0 {
            return Ok(None);
        }

        if self.used + size + HEADER_SIZE > self.region.capacity() {
            self.collect();
            if self.used + size + HEADER_SIZE > self.region.capacity() {
                self.region.grow(size + HEADER_SIZE)?;
            }
        }

        let header = match self.find_best_fit(size) {
            Some(best_fit) => self.place_in_chunk(best_fit, size),
            None => self.append_chunk(size),
        };

        let payload = ChunkHeader::payload_ptr(header);
        self.index
            .insert(payload.as_ptr() as usize, size)
            .map_err(Error::from)?;

        if let Some(slot) = root_slot {
            // Write the fresh payload into the slot before registering it:
            // `register_root` only keeps slots that already point into the
            // heap, and a caller passing `root_slot` here is asking for
            // "allocate and root it", not "root whatever this slot
            // happened to already hold".
            // SAFETY: `slot` is caller-owned and valid for writes by contract.
            unsafe {
                slot.as_ptr().write(payload.as_ptr());
            }
            self.register_root(slot);
        }

        Ok(Some(payload))
    }

    /// Frees the chunk at `payload`, fatally if `payload` is not a
    /// currently live allocation.
    pub fn deallocate(&mut self, payload: NonNull<u8>) {
        let addr = payload.as_ptr() as usize;
        if !self.region.contains(payload) || addr >= self.region.start().as_ptr() as usize + self.used {
            self.fatal(format!("deallocate received a pointer outside the heap: {addr:#x}"));
        }
        if self.index.remove(addr).is_none() {
            self.fatal(format!(
                "deallocate received a pointer not tracked by the address index: {addr:#x}"
            ));
        }

        // SAFETY: `addr` was just confirmed live in the address index, so
        // it is a valid chunk payload address.
        let header = unsafe { ChunkHeader::from_payload(payload) };
        // SAFETY: `header` points at a live chunk header within the heap region.
        let mut chunk = unsafe { ChunkHeader::load(header) };
        chunk.is_free = true;
        let prev = chunk.prev;
        unsafe {
            ChunkHeader::store(header, chunk);
        }
        trace!(addr = addr, "chunk freed");

        self.coalesce_with_next(header);
        if let Some(prev) = prev {
            self.coalesce_with_next(prev);
        }
    }

    /// Address-order best-fit search: the smallest free chunk with
    /// `size >= requested`, earliest in address order on ties.
    fn find_best_fit(&self, requested: usize) -> Option<NonNull<ChunkHeader>> {
        let mut best: Option<(NonNull<ChunkHeader>, usize)> = None;
        let mut cursor = self.head;
        while let Some(node) = cursor {
            // SAFETY: every node reachable from `head` is a live chunk header.
            let chunk = unsafe { ChunkHeader::load(node) };
            if chunk.is_free && chunk.size >= requested {
                let replace = match best {
                    None => true,
                    Some((_, best_size)) => chunk.size < best_size,
                };
                if replace {
                    best = Some((node, chunk.size));
                }
            }
            cursor = chunk.next;
        }
        if let Some((node, size)) = best {
            trace!(size, requested, "best-fit hit");
            Some(node)
        } else {
            trace!(requested, "best-fit miss, will bump high-water mark");
            None
        }
    }

    /// Hands `winner` (a free chunk with `size >= requested`) to the
    /// caller, splitting off the remainder as a new free chunk when the
    /// excess is large enough to hold another header.
    fn place_in_chunk(&mut self, winner: NonNull<ChunkHeader>, requested: usize) -> NonNull<ChunkHeader> {
        // SAFETY: `winner` came from `find_best_fit`, a live chunk in this list.
        let mut winner_chunk = unsafe { ChunkHeader::load(winner) };
        let excess = winner_chunk.size - requested;

        if excess >= HEADER_SIZE + 1 {
            let remainder = excess - HEADER_SIZE;
            // SAFETY: `winner`'s payload plus `requested` bytes is still
            // within `winner`'s own footprint, which is within the heap region.
            let new_header_ptr = unsafe {
                NonNull::new_unchecked(
                    ChunkHeader::payload_ptr(winner).as_ptr().add(requested).cast::<ChunkHeader>(),
                )
            };

            let old_next = winner_chunk.next;
            winner_chunk.size = requested;
            winner_chunk.next = Some(new_header_ptr);

            let new_chunk = ChunkHeader {
                size: remainder,
                is_free: true,
                marked: false,
                prev: Some(winner),
                next: old_next,
            };
            if let Some(old_next) = old_next {
                // SAFETY: `old_next` is a live chunk header.
                let mut next_chunk = unsafe { ChunkHeader::load(old_next) };
                next_chunk.prev = Some(new_header_ptr);
                unsafe {
                    ChunkHeader::store(old_next, next_chunk);
                }
            } else {
                self.tail = Some(new_header_ptr);
            }
            // SAFETY: the computed address is within the heap region and
            // was previously uninitialized payload bytes of `winner`.
            unsafe {
                ChunkHeader::store(new_header_ptr, new_chunk);
            }
            trace!(requested, remainder, "split on allocate");
        } else {
            trace!(requested, excess, "no split, excess too small for a header");
        }

        winner_chunk.is_free = false;
        // SAFETY: `winner` is a live chunk header.
        unsafe {
            ChunkHeader::store(winner, winner_chunk);
        }
        winner
    }

    /// Creates a new chunk of exactly `size` bytes at the current
    /// high-water mark, either as the very first chunk or appended to the
    /// tail.
    fn append_chunk(&mut self, size: usize) -> NonNull<ChunkHeader> {
        // SAFETY: `used` bytes from `start` are already partitioned by the
        // chunk list; the next `HEADER_SIZE + size` bytes were reserved by
        // the region's capacity and are free for a new header.
        let header = unsafe {
            NonNull::new_unchecked(self.region.start().as_ptr().add(self.used).cast::<ChunkHeader>())
        };
        let mut chunk = ChunkHeader {
            size,
            is_free: false,
            marked: true,
            prev: None,
            next: None,
        };

        match self.tail {
            Some(tail) => {
                // SAFETY: `tail` is a live chunk header.
                let mut tail_chunk = unsafe { ChunkHeader::load(tail) };
                tail_chunk.next = Some(header);
                unsafe {
                    ChunkHeader::store(tail, tail_chunk);
                }
                chunk.prev = Some(tail);
            }
            None => {
                self.head = Some(header);
            }
        }
        // SAFETY: see above; this range is uninitialized but owned.
        unsafe {
            ChunkHeader::store(header, chunk);
        }
        self.tail = Some(header);
        self.used += HEADER_SIZE + size;
        header
    }

    /// Merges `header` into `header.next` if the neighbor is free,
    /// re-establishing invariant I3 for that pair.
    pub(crate) fn coalesce_with_next(&mut self, header: NonNull<ChunkHeader>) {
        // SAFETY: `header` is a live chunk header.
        let mut this = unsafe { ChunkHeader::load(header) };
        if !this.is_free {
            return;
        }
        let Some(next) = this.next else { return };
        // SAFETY: `next` is the next live chunk header in the list.
        let next_chunk = unsafe { ChunkHeader::load(next) };
        if !next_chunk.is_free {
            return;
        }

        this.size += HEADER_SIZE + next_chunk.size;
        this.next = next_chunk.next;
        if let Some(new_next) = next_chunk.next {
            // SAFETY: `new_next` is a live chunk header.
            let mut new_next_chunk = unsafe { ChunkHeader::load(new_next) };
            new_next_chunk.prev = Some(header);
            unsafe {
                ChunkHeader::store(new_next, new_next_chunk);
            }
        } else {
            self.tail = Some(header);
        }
        let absorbed = HEADER_SIZE + next_chunk.size;
        // SAFETY: `header` is a live chunk header.
        unsafe {
            ChunkHeader::store(header, this);
        }
        trace!(addr = header.as_ptr() as usize, absorbed, "coalesced with next");
    }

    /// Iterates every aligned `usize`-sized word in `header`'s payload,
    /// for conservative pointer scanning during the mark phase. Lives here
    /// rather than in the collector because it is the allocator that knows
    /// the chunk layout.
    pub(crate) fn scan_payload_words(&self, header: NonNull<ChunkHeader>) -> impl Iterator<Item = usize> + '_ {
        // SAFETY: `header` is a live chunk header; its payload is `size`
        // bytes immediately following it.
        let size = unsafe { ChunkHeader::load(header) }.size;
        let payload = ChunkHeader::payload_ptr(header);
        let word_count = size / std::mem::size_of::<usize>();
        (0..word_count).map(move |i| {
            // SAFETY: `i < word_count` keeps the read within the payload.
            unsafe { payload.as_ptr().cast::<usize>().add(i).read_unaligned() }
        })
    }

    /// Snapshot of every chunk in address order, for read-only
    /// introspection by out-of-core layers.
    #[must_use]
    pub fn chunks(&self) -> Vec<ChunkInfo> {
        let mut out = Vec::new();
        let mut cursor = self.head;
        while let Some(node) = cursor {
            // SAFETY: every node reachable from `head` is a live chunk header.
            let chunk = unsafe { ChunkHeader::load(node) };
            out.push(ChunkInfo {
                addr: ChunkHeader::payload_ptr(node).as_ptr() as usize,
                size: chunk.size,
                is_free: chunk.is_free,
            });
            cursor = chunk.next;
        }
        out
    }
}
