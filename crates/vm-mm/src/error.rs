//! Error taxonomy for the core: one enum variant per failure kind the
//! frame table, eviction engine, SPT and loader can report, and
//! nothing is retried anywhere in this crate. A failed load or a
//! failed evict terminates the faulting task; only
//! [`EvictError::Fatal`] is a kernel-wide panic, and that panic
//! happens at the call site that drives the eviction engine, not
//! inside it, so the engine itself stays host-testable.

/// Raised by [`crate::SupplementalPageTable::insert_file`] /
/// `insert_mmf` when an entry already exists for the given page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SptError {
    DuplicateKey,
}

/// Raised by [`crate::PageDirectory::map`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapError {
    OutOfMemory,
    AlreadyMapped,
}

/// Raised by [`crate::SwapDevice::swap_out`] when every slot is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapError;

/// Raised by the eviction engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictError {
    /// No free swap slot was available when one was needed to persist
    /// the victim. Propagates up to the faulting task, which is
    /// terminated; it is not a whole-kernel panic.
    SwapExhausted,

    /// The frame table had no eligible victim (it was empty) or a
    /// write-back to the filesystem failed. Unrecoverable kernel
    /// state: the caller is expected to panic.
    Fatal,
}

/// Raised by the page loader when materializing an SPTE into a frame
/// fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadError {
    /// The filesystem returned fewer bytes than the SPTE's
    /// `read_bytes` promised.
    ShortRead,

    /// The page-directory install failed (e.g. duplicate mapping).
    MapFailed,

    /// No frame could be produced, neither directly nor through
    /// eviction.
    OutOfMemory,

    /// Eviction needed a swap slot to make room and none was free.
    SwapExhausted,
}

impl From<MapError> for LoadError {
    fn from(e: MapError) -> Self {
        match e {
            MapError::OutOfMemory => Self::OutOfMemory,
            MapError::AlreadyMapped => Self::MapFailed,
        }
    }
}
