//! A virtual memory area: a page-aligned range of a task's address
//! space and what backs it. Covers `Anonymous`/`File`/`Mmf` kinds,
//! since `mmap` has to install the right kind of SPT entry instead of
//! always zeroing pages eagerly.

use core::ops::Range;

use addr::user::UserVirtual;
use bitflags::bitflags;
use mm::FileHandle;
use typed_builder::TypedBuilder;

use crate::x86_64::paging::table::{PageEntryFlags, PageFaultErrorCode};

/// A virtual memory area mapped in a task's address space.
#[derive(TypedBuilder, Debug, Clone)]
pub struct Area {
    /// The range of virtual addresses this area covers. The start must
    /// be page-aligned.
    range: Range<UserVirtual>,

    /// The access rights granted to this area.
    access: Access,

    /// Flags describing how this area may be manipulated.
    flags: Flags,

    /// The kind of this area: where its pages' contents come from.
    kind: Type,
}

impl Area {
    pub fn set_range(&mut self, range: Range<UserVirtual>) {
        self.range = range;
    }

    #[must_use]
    pub fn range(&self) -> &Range<UserVirtual> {
        &self.range
    }

    #[must_use]
    pub fn access(&self) -> Access {
        self.access
    }

    #[must_use]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    #[must_use]
    pub fn base(&self) -> UserVirtual {
        self.range.start
    }

    #[must_use]
    pub fn kind(&self) -> &Type {
        &self.kind
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        usize::from(self.range.end) - usize::from(self.range.start)
    }
}

/// What backs an area's pages.
#[derive(Debug, Clone, Copy)]
pub enum Type {
    /// Demand-zero memory with no file behind it: the first touch of
    /// any page installs a fresh zeroed frame, with no SPTE created
    /// eagerly (the stack grower installs pages this way; `mmap`'d
    /// anonymous regions are another instance).
    Anonymous,

    /// A lazily-loaded, read-mostly file mapping (a `FILE` SPTE kind).
    /// `offset` is this area's starting offset into `file`.
    File { file: FileHandle, offset: usize, writable: bool },

    /// A memory-mapped file whose dirty pages write back (an `MMF`
    /// SPTE kind). Always writable.
    Mmf { file: FileHandle, offset: usize },
}

bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u64 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
    }

    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u64 {
        /// The area's range is fixed and must not be relocated by `mmap`.
        const FIXED = 1 << 0;

        /// The area may grow downward on a stack-extension fault.
        const GROW_DOWN = 1 << 1;

        /// The area is permanent and can never be unmapped: used for the
        /// null-pointer and end-of-address-space guards.
        const PERMANENT = 1 << 2;
    }
}

impl From<PageFaultErrorCode> for Access {
    /// The access a page fault's error code demanded. Mutually
    /// exclusive by construction of the error code itself.
    fn from(error: PageFaultErrorCode) -> Self {
        if error.contains(PageFaultErrorCode::WRITE_ACCESS) {
            Access::WRITE
        } else if error.contains(PageFaultErrorCode::INSTRUCTION_FETCH) {
            Access::EXECUTE
        } else {
            Access::READ
        }
    }
}

impl From<Access> for PageEntryFlags {
    fn from(access: Access) -> Self {
        let mut flags = PageEntryFlags::empty();
        if access.contains(Access::WRITE) {
            flags |= PageEntryFlags::WRITABLE;
        }
        if !access.contains(Access::EXECUTE) {
            flags |= PageEntryFlags::NO_EXECUTE;
        }
        flags
    }
}
