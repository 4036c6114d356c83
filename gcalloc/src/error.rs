//! The recoverable error taxonomy, plus the `fatal` helper for the
//! caller-misuse conditions the reference design treats as unrecoverable
//! (an invalid `deallocate`, a corrupted chunk list precondition).

#[derive(onlyerror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// the OS refused to extend the process's data segment
    #[error("the OS refused to grow the heap")]
    OutOfMemory,
    /// the address-index node pool has no free slots
    #[error("address index pool exhausted")]
    IndexFull,
}

impl From<addr_index::IndexError> for Error {
    fn from(_: addr_index::IndexError) -> Self {
        Self::IndexFull
    }
}

/// Logs `message` at `error` level, then either panics or aborts the
/// process depending on `aborts_process`. Panicking is the default so
/// `#[should_panic]` tests can observe it; a deployed binary can opt into
/// `abort` so a caller-misuse bug can never be caught and papered over by
/// an unwind through allocator-owned state.
pub(crate) fn fatal(aborts_process: bool, message: impl std::fmt::Display) -> ! {
    let message = message.to_string();
    tracing::error!("{message}");
    if aborts_process {
        std::process::abort();
    } else {
        panic!("{message}");
    }
}
