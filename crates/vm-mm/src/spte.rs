//! The supplemental page table entry: describes where the contents of
//! a non-resident user page live and how to materialize it on a page
//! fault.

use addr::user::UserVirtual;
use bitflags::bitflags;

use crate::ids::{FileHandle, SwapSlot};

bitflags! {
    /// The meaningful combinations are `FILE`, `MMF`, `SWAP`,
    /// `FILE|SWAP`, `MMF|SWAP`; `FILE|MMF` is never constructed. A
    /// tagged-variant enum would exclude the illegal combination by
    /// construction, but the transition rules (e.g. `FILE|SWAP ->
    /// FILE`) read as in-place bit mutation, which is what a bitset
    /// gives for free.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BackingKind: u8 {
        const FILE = 1 << 0;
        const MMF  = 1 << 1;
        const SWAP = 1 << 2;
    }
}

/// Payload for `FILE` and `MMF` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileBackingInfo {
    pub file: FileHandle,
    pub offset: usize,
    pub read_bytes: usize,
    /// Bytes to zero-fill past `read_bytes`. Always `PAGE_SIZE -
    /// read_bytes` for `MMF` entries; meaningful only for `FILE`.
    pub zero_bytes: usize,
    /// Ignored for `MMF`, which is always writable to the mapping
    /// even though dirty pages go back to the file rather than swap.
    pub writable: bool,
}

/// Payload for entries with the `SWAP` bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapInfo {
    pub slot: SwapSlot,
    /// The writable bit captured from the PTE at eviction time, since
    /// that bit is gone once the PTE is cleared.
    pub writable: bool,
}

/// One entry of a process's supplemental page table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spte {
    pub vaddr: UserVirtual,
    pub kind: BackingKind,
    pub file: Option<FileBackingInfo>,
    pub swap: Option<SwapInfo>,
    /// Advisory: whether a frame is currently mapped for this entry.
    pub loaded: bool,
}

impl Spte {
    #[must_use]
    pub const fn file(vaddr: UserVirtual, info: FileBackingInfo) -> Self {
        Self {
            vaddr,
            kind: BackingKind::FILE,
            file: Some(info),
            swap: None,
            loaded: false,
        }
    }

    #[must_use]
    pub const fn mmf(vaddr: UserVirtual, info: FileBackingInfo) -> Self {
        Self {
            vaddr,
            kind: BackingKind::MMF,
            file: Some(info),
            swap: None,
            loaded: false,
        }
    }

    /// An entry synthesized by the eviction engine the first time an
    /// anonymous page (stack growth, or any page with no prior
    /// backing) is evicted.
    #[must_use]
    pub const fn anonymous_placeholder(vaddr: UserVirtual) -> Self {
        Self {
            vaddr,
            kind: BackingKind::empty(),
            file: None,
            swap: None,
            loaded: false,
        }
    }

    #[must_use]
    pub fn is_pure_anonymous(&self) -> bool {
        !self.kind.contains(BackingKind::FILE) && !self.kind.contains(BackingKind::MMF)
    }
}
