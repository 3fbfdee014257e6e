use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use addr::{frame::Frame, Physical, Virtual};
use bitflags::bitflags;
use mm::traits::PhysFrameSource;

use super::{cpu, Level, KERNEL_PML4, PAGE_SIZE};
use crate::memory::frame::FRAME_ALLOCATOR;

bitflags! {
    /// The flags of a page table entry. See Intel Vol. 3A, Section 4.5.
    #[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    #[repr(transparent)]
    pub struct PageEntryFlags: u64 {
        const PRESENT = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const NO_CACHE = 1 << 4;
        const ACCESSED = 1 << 5;
        const DIRTY = 1 << 6;
        const HUGE_PAGE = 1 << 7;
        const GLOBAL = 1 << 8;
        const NO_EXECUTE = 1 << 63;
    }

    /// The flags the CPU pushes on the stack when a page fault occurs.
    #[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    #[repr(transparent)]
    pub struct PageFaultErrorCode: u64 {
        const PRESENT = 1 << 0;
        const WRITE_ACCESS = 1 << 1;
        const CPU_USER_MODE = 1 << 2;
        const MALFORMED_TABLE = 1 << 3;
        const INSTRUCTION_FETCH = 1 << 4;
    }
}

#[repr(C)]
pub struct PageEntry(u64);

impl PageEntry {
    pub const ADDRESS_MASK: u64 = 0x000F_FFFF_FFFF_F000;
    pub const EMPTY: Self = Self(0);

    /// # Panics
    /// Panics if `addr` is not page aligned.
    #[must_use]
    pub fn new(addr: Physical, flags: PageEntryFlags) -> Self {
        assert!(addr.is_page_aligned(), "address {addr} is not page aligned");
        Self((u64::from(addr) & Self::ADDRESS_MASK) | flags.bits())
    }

    /// # Panics
    /// Panics if `addr` is not page aligned.
    pub fn set_address(&mut self, addr: Physical) {
        assert!(addr.is_page_aligned(), "address {addr} is not page aligned");
        self.0 = (self.0 & !Self::ADDRESS_MASK) | (u64::from(addr) & Self::ADDRESS_MASK);
    }

    pub fn set_flags(&mut self, flags: PageEntryFlags) {
        self.0 = (self.0 & Self::ADDRESS_MASK) | flags.bits();
    }

    pub fn clear_flags(&mut self, flags: PageEntryFlags) {
        self.0 &= !flags.bits();
    }

    pub fn add_flags(&mut self, flags: PageEntryFlags) {
        self.0 |= flags.bits();
    }

    #[must_use]
    pub const fn present(&self) -> bool {
        self.flags().contains(PageEntryFlags::PRESENT)
    }

    #[must_use]
    pub const fn writable(&self) -> bool {
        self.flags().contains(PageEntryFlags::WRITABLE)
    }

    #[must_use]
    pub const fn dirty(&self) -> bool {
        self.flags().contains(PageEntryFlags::DIRTY)
    }

    #[must_use]
    pub const fn accessed(&self) -> bool {
        self.flags().contains(PageEntryFlags::ACCESSED)
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    #[must_use]
    pub const fn flags(&self) -> PageEntryFlags {
        PageEntryFlags::from_bits_truncate(self.0)
    }

    /// # Safety
    /// The caller must not alias the returned pointer with another
    /// mutable reference to the same table.
    #[must_use]
    pub fn table(&self) -> Option<*mut PageTable> {
        self.present().then(|| {
            let addr = self.0 & Self::ADDRESS_MASK;
            Virtual::from(Physical::new(addr)).as_mut_ptr::<PageTable>() as *mut PageTable
        })
    }

    #[must_use]
    pub const fn address(&self) -> Option<Physical> {
        if self.present() {
            Some(Physical::new_truncate(self.0 & Self::ADDRESS_MASK))
        } else {
            None
        }
    }
}

/// A 4 KiB-aligned table of 512 page table entries.
#[repr(C, align(4096))]
pub struct PageTable([PageEntry; 512]);

impl PageTable {
    pub const COUNT: usize = 512;

    #[must_use]
    pub const fn empty() -> Self {
        Self([PageEntry::EMPTY; Self::COUNT])
    }

    /// # Safety
    /// The caller must ensure no other mutable reference to the same
    /// entry exists concurrently.
    unsafe fn fetch(table: &mut PageTable, level: Level, addr: Virtual, behavior: FetchBehavior) -> Result<&mut PageEntry, FetchError> {
        let entry = &mut table.0[addr.page_index(level.index())];

        if level == Level::Pt {
            return Ok(entry);
        }

        if !entry.present() {
            match behavior {
                FetchBehavior::Allocate => {
                    let frame = FRAME_ALLOCATOR.lock().alloc(true).ok_or(FetchError::OutOfMemory)?;
                    if addr.is_user() {
                        entry.add_flags(PageEntryFlags::USER);
                    }
                    entry.add_flags(PageEntryFlags::WRITABLE | PageEntryFlags::PRESENT);
                    entry.set_address(frame.address());
                }
                FetchBehavior::Reach => return Err(FetchError::NoSuchEntry),
            }
        }

        let table = &mut *entry.table().unwrap();
        PageTable::fetch(table, level.next().unwrap(), addr, behavior)
    }

    /// # Safety
    /// The caller must ensure `page` addresses a live, exclusively
    /// owned `PageTable`.
    #[must_use]
    pub unsafe fn from_page(page: Virtual) -> &'static Self {
        assert!(page.is_page_aligned(), "page {page} is not page aligned");
        &*(page.as_ptr::<Self>())
    }

    /// # Safety
    /// See [`Self::from_page`].
    #[must_use]
    pub unsafe fn from_page_mut(page: Virtual) -> &'static mut Self {
        assert!(page.is_page_aligned(), "page is not page aligned");
        &mut *(page.as_mut_ptr::<Self>())
    }

    pub fn clear(&mut self) {
        for entry in &mut self.0 {
            entry.clear();
        }
    }
}

impl Deref for PageTable {
    type Target = [PageEntry];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for PageTable {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// The root of a page table hierarchy (a PML4), spinlock-guarded.
pub struct PageTableRoot {
    lock: AtomicBool,
    pml4: Virtual,
    frame: Frame,
}

unsafe impl Send for PageTableRoot {}
unsafe impl Sync for PageTableRoot {}

impl PageTableRoot {
    /// Allocates a fresh PML4 whose kernel half is copied from
    /// [`super::KERNEL_PML4`] and whose user half starts empty.
    ///
    /// # Panics
    /// Panics if the kernel ran out of memory.
    #[must_use]
    pub fn new() -> Self {
        unsafe {
            let frame = FRAME_ALLOCATOR.lock().alloc(false).expect("out of memory allocating a page table root");
            let dst = Virtual::from(frame.address()).as_mut_ptr::<u8>() as *mut u8;
            let src = KERNEL_PML4.pml4.as_ptr::<u8>();
            core::ptr::copy_nonoverlapping(src, dst, PAGE_SIZE);
            Self::from_page(frame.address())
        }
    }

    /// # Safety
    /// The caller transfers ownership of `page` (which must hold a
    /// valid PML4) to the returned root.
    #[must_use]
    pub unsafe fn from_page(page: Physical) -> Self {
        Self {
            frame: Frame::from_address(page),
            lock: AtomicBool::new(false),
            pml4: Virtual::from(page),
        }
    }

    pub fn lock(&self) -> PageTableRootGuard<'_> {
        while self.lock.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed).is_err() {
            core::hint::spin_loop();
        }
        PageTableRootGuard { root: self }
    }

    /// Loads this root into CR3 if it is not already current.
    ///
    /// # Safety
    /// The caller must ensure this root outlives its use as the
    /// active address space.
    pub unsafe fn set_current(&self) {
        if cpu::read_cr3() != u64::from(self.frame.address()) {
            cpu::write_cr3(u64::from(self.frame.address()));
        }
    }

    #[must_use]
    pub fn frame(&self) -> Frame {
        self.frame
    }
}

impl Default for PageTableRoot {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PageTableRoot {
    /// Recursively frees every user-space frame. Kernel-space frames
    /// are shared and are never freed here.
    fn drop(&mut self) {
        unsafe {
            debug_assert!(
                cpu::read_cr3() != u64::from(self.frame.address()),
                "cannot drop the page table root that is currently loaded"
            );
            let pml4 = PageTable::from_page_mut(self.pml4);
            deallocate_recursive(&mut pml4[0..256], Level::Pml4);
        }
        FRAME_ALLOCATOR.lock().free(self.frame);
    }
}

/// A lock guard over a [`PageTableRoot`]'s PML4.
pub struct PageTableRootGuard<'a> {
    root: &'a PageTableRoot,
}

impl<'a> PageTableRootGuard<'a> {
    /// # Safety
    /// The caller must not create overlapping mutable references to
    /// the same entry.
    ///
    /// # Errors
    /// See [`FetchError`].
    pub unsafe fn fetch_last_entry(&mut self, addr: Virtual, behavior: FetchBehavior) -> Result<&mut PageEntry, FetchError> {
        PageTable::fetch(self, Level::Pml4, addr, behavior)
    }

    pub fn clear_userspace(&mut self) {
        self.user_space_mut().iter_mut().for_each(PageEntry::clear);
    }

    pub fn kernel_space_mut(&mut self) -> &mut [PageEntry] {
        &mut self[256..512]
    }

    pub fn user_space_mut(&mut self) -> &mut [PageEntry] {
        &mut self[0..256]
    }
}

impl Drop for PageTableRootGuard<'_> {
    fn drop(&mut self) {
        self.root.lock.store(false, Ordering::Release);
    }
}

impl<'a> Deref for PageTableRootGuard<'a> {
    type Target = PageTable;
    fn deref(&self) -> &Self::Target {
        unsafe { PageTable::from_page(self.root.pml4) }
    }
}

impl<'a> DerefMut for PageTableRootGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { PageTable::from_page_mut(self.root.pml4) }
    }
}

/// # Safety
/// The caller must ensure `table` is not used after this call.
unsafe fn deallocate_recursive(table: &mut [PageEntry], level: Level) {
    table.iter().filter_map(PageEntry::address).for_each(|address| match level {
        Level::Pml4 | Level::Pdpt | Level::Pd => {
            let table = PageTable::from_page_mut(Virtual::from(address));
            deallocate_recursive(table, level.next().unwrap());
        }
        Level::Pt => {
            FRAME_ALLOCATOR.lock().free(Frame::from_address(address));
        }
    });

    let virt = Virtual::from_ptr(table.as_mut_ptr());
    let phys = Physical::from(virt.page_align_down());
    FRAME_ALLOCATOR.lock().free(Frame::from_address(phys));
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FetchBehavior {
    Allocate,
    Reach,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FetchError {
    NoSuchEntry,
    OutOfMemory,
}
