use addr::user::UserVirtual;
use addr::{frame::Frame, Physical, Virtual};
use macros::init;
use mm::error::MapError as CoreMapError;
use mm::traits::{PageDirectory, PhysFrameSource};
use sync::Lazy;

use self::table::{FetchBehavior, PageEntry, PageEntryFlags, PageTable, PageTableRoot};
use super::cpu;
use crate::memory::frame::FRAME_ALLOCATOR;

pub mod table;
pub mod tlb;

pub use table::PageFaultErrorCode;

/// 2 MiB and 1 GiB pages are not supported, to keep the hierarchy
/// simple.
pub const PAGE_SIZE: usize = 4096;

/// The page table shared by every address space's kernel half. Copied
/// wholesale into each new [`PageTableRoot`] so kernel mappings never
/// need to be kept in sync across tasks.
pub static KERNEL_PML4: Lazy<PageTableRoot> = Lazy::new(|| unsafe { PageTableRoot::from_page(Physical::from(cpu::read_cr3())) });

/// A level in the four-level page table hierarchy.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Pml4,
    Pdpt,
    Pd,
    Pt,
}

impl Level {
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Pml4 => Some(Self::Pdpt),
            Self::Pdpt => Some(Self::Pd),
            Self::Pd => Some(Self::Pt),
            Self::Pt => None,
        }
    }

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Pml4 => 4,
            Self::Pdpt => 3,
            Self::Pd => 2,
            Self::Pt => 1,
        }
    }
}

/// Preallocates every kernel PML4 entry so creating a new address
/// space never needs to allocate a kernel page table (which would
/// need cross-address-space synchronization).
///
/// # Safety
/// Must be called exactly once, before any address space but the
/// bootstrap one is created.
#[init]
pub unsafe fn setup() {
    let mut pml4 = KERNEL_PML4.lock();
    pml4.clear_userspace();
    pml4.kernel_space_mut().iter_mut().filter(|e| !e.present()).for_each(|entry| {
        let frame = FRAME_ALLOCATOR.lock().alloc(true).expect("out of memory preallocating kernel page tables");
        entry.set_address(frame.address());
        entry.set_flags(PageEntryFlags::PRESENT | PageEntryFlags::WRITABLE);
    });
}

/// Maps `frame` at `address`, writable iff `writable`.
///
/// # Errors
/// `MapError::AlreadyMapped` if `address` already resolves to a
/// frame; `MapError::OutOfMemory` if an intermediate page table could
/// not be allocated.
///
/// # Safety
/// The caller must ensure `frame` stays exclusively owned by this
/// mapping until it is unmapped.
pub unsafe fn map(root: &PageTableRoot, address: Virtual, frame: Frame, writable: bool) -> Result<(), MapError> {
    let mut table = root.lock();
    let pte = table.fetch_last_entry(address, FetchBehavior::Allocate).map_err(|_| MapError::OutOfMemory)?;

    if pte.address().is_some() {
        return Err(MapError::AlreadyMapped);
    }

    let mut flags = PageEntryFlags::PRESENT;
    if writable {
        flags |= PageEntryFlags::WRITABLE;
    }
    if address.is_user() {
        flags |= PageEntryFlags::USER;
    }
    pte.set_flags(flags);
    pte.set_address(frame.address());
    tlb::shootdown(address);
    Ok(())
}

/// Clears the mapping at `address`, returning the frame it held.
///
/// # Errors
/// `UnmapError::NotMapped` if `address` has no mapping.
///
/// # Safety
/// The caller is responsible for freeing the returned frame if
/// appropriate.
pub unsafe fn unmap(root: &PageTableRoot, address: Virtual) -> Result<Frame, UnmapError> {
    let mut table = root.lock();
    let pte = table.fetch_last_entry(address, FetchBehavior::Reach).map_err(|_| UnmapError::NotMapped)?;

    let physical = pte.address().ok_or(UnmapError::NotMapped)?;
    pte.clear();
    tlb::shootdown(address);
    Ok(Frame::from_address(physical))
}

/// Resolves `address` to the physical address it currently maps to,
/// or `None` if it is not mapped.
#[must_use]
pub fn resolve(root: &PageTableRoot, address: Virtual) -> Option<Physical> {
    unsafe { root.lock().fetch_last_entry(address, FetchBehavior::Reach).ok().and_then(PageEntry::address) }
}

/// Adapts a [`PageTableRoot`] to the core's [`PageDirectory`] trait.
/// One per task; owns the root exclusively.
pub struct Directory {
    pub root: PageTableRoot,
}

impl Directory {
    #[must_use]
    pub fn new() -> Self {
        Self { root: PageTableRoot::new() }
    }

    fn pte<R>(&self, upage: UserVirtual, f: impl FnOnce(&PageEntry) -> R) -> Option<R> {
        unsafe {
            let mut table = self.root.lock();
            table.fetch_last_entry(upage.as_virtual(), FetchBehavior::Reach).ok().map(|e| f(e))
        }
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

impl PageDirectory for Directory {
    fn map(&mut self, upage: UserVirtual, frame: Frame, writable: bool) -> Result<(), CoreMapError> {
        unsafe { map(&self.root, upage.as_virtual(), frame, writable).map_err(Into::into) }
    }

    fn unmap(&mut self, upage: UserVirtual) {
        unsafe {
            let _ = unmap(&self.root, upage.as_virtual());
        }
    }

    fn is_accessed(&self, upage: UserVirtual) -> bool {
        self.pte(upage, PageEntry::accessed).unwrap_or(false)
    }

    fn set_accessed(&mut self, upage: UserVirtual, value: bool) {
        unsafe {
            let mut table = self.root.lock();
            if let Ok(entry) = table.fetch_last_entry(upage.as_virtual(), FetchBehavior::Reach) {
                if value {
                    entry.add_flags(PageEntryFlags::ACCESSED);
                } else {
                    entry.clear_flags(PageEntryFlags::ACCESSED);
                }
            }
        }
    }

    fn is_dirty(&self, upage: UserVirtual) -> bool {
        self.pte(upage, PageEntry::dirty).unwrap_or(false)
    }

    fn is_writable(&self, upage: UserVirtual) -> bool {
        self.pte(upage, PageEntry::writable).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapError {
    OutOfMemory,
    AlreadyMapped,
}

impl From<MapError> for CoreMapError {
    fn from(e: MapError) -> Self {
        match e {
            MapError::OutOfMemory => Self::OutOfMemory,
            MapError::AlreadyMapped => Self::AlreadyMapped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnmapError {
    NotMapped,
}
