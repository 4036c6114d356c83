//! The public singleton façade: `instance`, `allocate`, `deallocate`,
//! `register_root`, `assign_root`, `collect`.
//!
//! Modeled on this codebase's lazily-initialized global handles (a
//! `#[global_allocator]` static wrapping a lock around mutable state) but
//! swapping the `Mutex` for a `RefCell`: the core is explicitly
//! single-threaded (concurrent access is documented UB, not a supported
//! path to defend against), and `RefCell`'s runtime borrow check is
//! exactly the mechanism that turns a reentrant `collect()` call — forbidden
//! by contract — into an immediate, loud panic instead of silent
//! corruption of the chunk list.

use std::cell::RefCell;
use std::ptr::NonNull;
use std::sync::OnceLock;

use crate::allocator::ChunkInfo;
use crate::config::Config;
use crate::error::Error;
use crate::state::GcState;

/// The process-wide heap and collector. Obtained via [`Gc::instance`];
/// never constructed directly.
pub struct Gc {
    state: RefCell<GcState>,
}

// SAFETY: `Gc` is reachable from multiple threads only through a shared
// `&'static Gc`; every access goes through `RefCell::borrow[_mut]`, which
// panics rather than racing under concurrent use. This does not make the
// core thread-safe (two threads each calling `allocate` concurrently will
// panic one of them), it only makes misuse loud instead of silently
// unsound — thread safety is an explicit non-goal.
unsafe impl Sync for Gc {}

static INSTANCE: OnceLock<Gc> = OnceLock::new();

impl Gc {
    /// Returns the process-wide singleton, initializing it with
    /// [`Config::default`] on first call.
    ///
    /// # Panics
    ///
    /// Panics if the OS refuses the initial heap reservation; there is no
    /// recovery from that on first boot.
    #[must_use]
    pub fn instance() -> &'static Gc {
        Self::instance_with(Config::default())
    }

    /// Returns the process-wide singleton, initializing it with `config`
    /// if this is the first call. If the singleton already exists,
    /// `config` is ignored and a debug-level event notes the fact.
    ///
    /// # Panics
    ///
    /// Panics if the OS refuses the initial heap reservation.
    #[must_use]
    pub fn instance_with(config: Config) -> &'static Gc {
        INSTANCE.get_or_init(|| Gc {
            state: RefCell::new(GcState::new(config).expect("failed to reserve the initial heap")),
        })
    }

    /// Allocates `size` bytes, returning `None` for a zero-size request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the heap cannot grow to satisfy
    /// the request, or [`Error::IndexFull`] if the address-index pool is
    /// exhausted.
    pub fn allocate(&self, size: usize) -> Result<Option<NonNull<u8>>, Error> {
        self.state.borrow_mut().allocate(size, None)
    }

    /// Like [`Gc::allocate`], additionally registering `root_slot` as a GC
    /// root once the allocation succeeds.
    ///
    /// # Errors
    ///
    /// See [`Gc::allocate`].
    pub fn allocate_rooted(
        &self,
        size: usize,
        root_slot: NonNull<*mut u8>,
    ) -> Result<Option<NonNull<u8>>, Error> {
        self.state.borrow_mut().allocate(size, Some(root_slot))
    }

    /// Frees `payload`. A `None` payload is a no-op.
    ///
    /// # Panics
    ///
    /// Panics (or aborts, per [`Config::fatal_aborts_process`]) if
    /// `payload` is `Some` and not a currently live allocation.
    pub fn deallocate(&self, payload: Option<NonNull<u8>>) {
        let Some(payload) = payload else { return };
        self.state.borrow_mut().deallocate(payload);
    }

    /// Registers `slot` as a GC root if it currently points into the heap.
    /// Silently dropped if the root registry is full even after an
    /// opportunistic collection.
    pub fn register_root(&self, slot: NonNull<*mut u8>) {
        self.state.borrow_mut().register_root(slot);
    }

    /// `*dest_slot = src_ptr`, then registers `dest_slot` as a root.
    /// Returns `src_ptr`.
    pub fn assign_root(&self, dest_slot: NonNull<*mut u8>, src_ptr: NonNull<u8>) -> NonNull<u8> {
        self.state.borrow_mut().assign_root(dest_slot, src_ptr)
    }

    /// Runs one mark-and-sweep cycle over the registered roots.
    ///
    /// # Panics
    ///
    /// Panics if called reentrantly from within another `collect()` (e.g.
    /// from code a payload scan happens to invoke) — forbidden by
    /// contract, enforced here by `RefCell`'s runtime borrow check rather
    /// than a dedicated reentrancy flag.
    pub fn collect(&self) {
        self.state.borrow_mut().collect();
    }

    /// A read-only snapshot of every chunk in address order, for
    /// out-of-core introspection (e.g. a heap dump layered on top of this
    /// crate).
    #[must_use]
    pub fn chunks(&self) -> Vec<ChunkInfo> {
        self.state.borrow().chunks()
    }
}
