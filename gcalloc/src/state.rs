//! Shared mutable state threaded through the allocator, collector, and
//! root registry.

use std::ptr::NonNull;

use tracing::info;

use crate::chunk::ChunkHeader;
use crate::config::Config;
use crate::error::{self, Error};
use crate::region::HeapRegion;
use crate::roots::RootRegistry;
use addr_index::AddrIndex;

/// Everything `allocate`, `deallocate`, and `collect` read or mutate.
/// Deliberately not `Clone`: there is exactly one of these per [`crate::Gc`]
/// instance, constructed once and never handed out by value.
pub(crate) struct GcState {
    pub(crate) region: HeapRegion,
    pub(crate) head: Option<NonNull<ChunkHeader>>,
    pub(crate) tail: Option<NonNull<ChunkHeader>>,
    /// Offset of the first unused byte in the region; the high-water mark.
    pub(crate) used: usize,
    pub(crate) index: AddrIndex,
    pub(crate) roots: RootRegistry,
    pub(crate) config: Config,
}

// SAFETY: composed entirely of `Send` fields; see each field type's own
// safety note. The owning `Gc` singleton is responsible for confining all
// access to one thread at a time.
unsafe impl Send for GcState {}

impl GcState {
    pub(crate) fn new(config: Config) -> Result<Self, Error> {
        let region = HeapRegion::new(config.initial_heap_capacity)?;
        info!(
            capacity = config.initial_heap_capacity,
            "gc heap initialized"
        );
        Ok(Self {
            region,
            head: None,
            tail: None,
            used: 0,
            index: AddrIndex::with_capacity(config.index_pool_capacity),
            roots: RootRegistry::with_capacity(config.root_registry_capacity),
            config,
        })
    }

    /// Logs `message` and then panics or aborts per
    /// [`Config::fatal_aborts_process`]. Used for every caller-misuse
    /// condition the reference design treats as unrecoverable.
    pub(crate) fn fatal(&self, message: impl std::fmt::Display) -> ! {
        error::fatal(self.config.fatal_aborts_process, message)
    }
}
