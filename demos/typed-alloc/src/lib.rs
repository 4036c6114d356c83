//! Thin, out-of-core helpers layered on top of [`gcalloc`]: typed
//! construct/destruct wrappers and a human-readable heap dump.
//!
//! The reference design's `allocate_new<T>`/`free_ptr<T>` and
//! `heap_dump` live outside the core on purpose — the core exposes only
//! raw `allocate`/`deallocate`/introspection, and anything that needs a
//! user-defined constructor or destructor, or wants to print the heap,
//! is built from those primitives here instead of baked into the
//! allocator itself.

use std::fmt::Write as _;
use std::ptr::NonNull;

use gcalloc::{ChunkInfo, Error, Gc};

/// Allocates room for a `T` on the process-wide [`Gc`] heap and moves
/// `value` into it via placement write. Returns `None` only if `size_of::<T>()`
/// is zero (a zero-size request is never an error, just a no-op per the
/// core's contract).
///
/// Chunk payloads carry no alignment padding beyond the natural alignment
/// of the metadata header, so `T` must not require more alignment than
/// `usize` — the same word-alignment caller contract the core already
/// places on conservative pointer scanning.
///
/// # Panics
///
/// Panics in debug builds if `align_of::<T>() > align_of::<usize>()`.
///
/// # Errors
///
/// Propagates [`Error`] if the underlying `allocate` call fails.
pub fn alloc_new<T>(value: T) -> Result<Option<NonNull<T>>, Error> {
    debug_assert!(
        std::mem::align_of::<T>() <= std::mem::align_of::<usize>(),
        "alloc_new does not support types more strictly aligned than usize"
    );
    let gc = Gc::instance();
    let Some(payload) = gc.allocate(std::mem::size_of::<T>())? else {
        return Ok(None);
    };
    let typed = payload.cast::<T>();
    // SAFETY: `payload` is freshly allocated, sized for exactly one `T`,
    // and not yet read from.
    unsafe {
        typed.as_ptr().write(value);
    }
    Ok(Some(typed))
}

/// Runs `T`'s destructor in place, then releases the memory back to the
/// [`Gc`] heap.
///
/// # Safety
///
/// `ptr` must have come from [`alloc_new`] and not have been freed
/// already.
pub unsafe fn free_ptr<T>(ptr: NonNull<T>) {
    // SAFETY: forwarded from the caller's contract.
    unsafe {
        std::ptr::drop_in_place(ptr.as_ptr());
    }
    Gc::instance().deallocate(Some(ptr.cast::<u8>()));
}

/// Renders the current chunk list as a human-readable listing, the same
/// information the reference design's `heap_dump`/`print_allocated_chunks`
/// print directly to stdout, but returned as a string here so the caller
/// decides where it goes.
#[must_use]
pub fn dump() -> String {
    let chunks = Gc::instance().chunks();
    let mut out = String::new();
    let mut allocated_bytes = 0usize;
    let mut free_bytes = 0usize;
    let mut allocated_count = 0usize;
    let mut free_count = 0usize;

    writeln!(out, "heap dump ({} chunks):", chunks.len()).unwrap();
    for ChunkInfo { addr, size, is_free } in &chunks {
        writeln!(
            out,
            "  {addr:#x}: {size} bytes, {}",
            if *is_free { "free" } else { "allocated" }
        )
        .unwrap();
        if *is_free {
            free_bytes += size;
            free_count += 1;
        } else {
            allocated_bytes += size;
            allocated_count += 1;
        }
    }
    writeln!(
        out,
        "summary: {allocated_count} allocated chunks ({allocated_bytes} bytes), {free_count} free chunks ({free_bytes} bytes)"
    )
    .unwrap();
    out
}
