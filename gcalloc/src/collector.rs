//! Conservative mark-and-sweep over the same chunk list and address index
//! [`crate::allocator`] maintains. Kept as a separate `impl GcState` block
//! rather than a standalone `Collector` type holding a reference back to
//! the allocator, for the reason given in `allocator.rs`'s module docs.

use std::ptr::NonNull;

use tracing::debug;

use crate::chunk::ChunkHeader;
use crate::state::GcState;

impl GcState {
    /// Registers `slot` as a GC root if the registry has room and
    /// `*slot` currently points into the heap. If the registry is full,
    /// triggers one collection and retries; still-full after that drops
    /// the root silently (documented, not reported to the caller).
    pub(crate) fn register_root(&mut self, slot: NonNull<*mut u8>) {
        if self.roots.is_full() {
            self.collect();
            if self.roots.is_full() {
                tracing::warn!("root registry still full after a collection, dropping root");
                return;
            }
        }
        if self.slot_points_into_heap(slot) {
            self.roots.push(slot);
        }
    }

    /// `*dest_slot = src_ptr`, then registers `dest_slot` as a root.
    /// Returns `src_ptr` unchanged.
    pub(crate) fn assign_root(&mut self, dest_slot: NonNull<*mut u8>, src_ptr: NonNull<u8>) -> NonNull<u8> {
        // SAFETY: `dest_slot` is caller-owned and valid for writes by contract.
        unsafe {
            dest_slot.as_ptr().write(src_ptr.as_ptr());
        }
        self.register_root(dest_slot);
        src_ptr
    }

    fn slot_points_into_heap(&self, slot: NonNull<*mut u8>) -> bool {
        // SAFETY: `slot` is caller-owned and valid for reads by contract.
        let value = unsafe { slot.as_ptr().read() };
        NonNull::new(value).is_some_and(|p| self.addr_in_used_range(p.as_ptr() as usize))
    }

    fn addr_in_used_range(&self, addr: usize) -> bool {
        let start = self.region.start().as_ptr() as usize;
        addr >= start && addr < start + self.used
    }

    /// Runs one mark-and-sweep cycle: materialize roots (compacting stale
    /// ones), unmark every chunk, transitively mark from the gray set, then
    /// sweep and coalesce.
    pub(crate) fn collect(&mut self) {
        let start = self.region.start().as_ptr() as usize;
        let used = self.used;

        let mut gray: Vec<NonNull<ChunkHeader>> = Vec::new();
        let index = &self.index;
        self.roots.retain(|slot| {
            // SAFETY: `slot` is caller-owned and valid for reads by contract.
            let value = unsafe { slot.as_ptr().read() };
            let Some(ptr) = NonNull::new(value) else {
                return false;
            };
            let addr = ptr.as_ptr() as usize;
            if addr < start || addr >= start + used {
                return false;
            }
            if index.lookup(addr).is_some() {
                // SAFETY: `addr` was just confirmed present in the address index.
                gray.push(unsafe { ChunkHeader::from_payload(ptr) });
            }
            true
        });

        let mut cursor = self.head;
        while let Some(node) = cursor {
            // SAFETY: every node reachable from `head` is a live chunk header.
            let mut chunk = unsafe { ChunkHeader::load(node) };
            chunk.marked = false;
            let next = chunk.next;
            unsafe {
                ChunkHeader::store(node, chunk);
            }
            cursor = next;
        }

        while let Some(header) = gray.pop() {
            // SAFETY: `header` is a live chunk header pushed above or below.
            let mut chunk = unsafe { ChunkHeader::load(header) };
            if chunk.marked {
                continue;
            }
            for word in self.scan_payload_words(header) {
                if word < start || word >= start + used {
                    continue;
                }
                if self.index.lookup(word).is_some() {
                    // SAFETY: `word` was just confirmed present in the address index.
                    let candidate = unsafe { ChunkHeader::from_payload(NonNull::new_unchecked(word as *mut u8)) };
                    // SAFETY: `candidate` is a live chunk header.
                    if !unsafe { ChunkHeader::load(candidate) }.marked {
                        gray.push(candidate);
                    }
                }
            }
            chunk.marked = true;
            // SAFETY: `header` is a live chunk header.
            unsafe {
                ChunkHeader::store(header, chunk);
            }
        }

        let mut freed = 0usize;
        let mut cursor = self.head;
        while let Some(node) = cursor {
            // SAFETY: every node reachable from `head` is a live chunk header.
            let mut chunk = unsafe { ChunkHeader::load(node) };
            let next = chunk.next;
            let prev = chunk.prev;
            if !chunk.is_free && !chunk.marked {
                chunk.is_free = true;
                unsafe {
                    ChunkHeader::store(node, chunk);
                }
                let addr = ChunkHeader::payload_ptr(node).as_ptr() as usize;
                self.index.remove(addr);
                freed += 1;
                if let Some(prev) = prev {
                    self.coalesce_with_next(prev);
                }
            }
            cursor = next;
        }

        debug!(freed, "collection cycle complete");
    }
}
