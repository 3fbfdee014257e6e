//! Virtual memory area bookkeeping and page-fault resolution: the
//! `mmap`/`munmap` surface and the entry point the trap handler would
//! call. Covers Anonymous/File/Mmf areas, wired to install real SPT
//! entries instead of eagerly zeroing every page.
//!
//! The frame table and eviction engine are process-independent (the
//! frame table tracks every user frame system-wide), so they live here
//! as globals rather than per-task state.

use core::ops::Range;

use addr::user::UserVirtual;
use alloc::vec::Vec;
use mm::traits::PhysFrameSource;
use mm::{EvictionEngine, FrameTable, LoadError};
use sync::Lazy;

pub mod area;

use self::area::{Access, Area, Flags, Type};
use super::task::{Registry, Task};
use crate::memory::frame::FRAME_ALLOCATOR;
use crate::memory::swap::SWAP;
use crate::x86_64::paging::{self, PAGE_SIZE};

/// The system-wide frame table: one entry per in-use user frame,
/// regardless of which task owns it.
pub static FRAME_TABLE: Lazy<FrameTable> = Lazy::new(FrameTable::default);

/// The system-wide eviction engine.
pub static EVICTION: Lazy<EvictionEngine> = Lazy::new(EvictionEngine::default);

/// Reserves `area`'s range in `task`'s address space and, for
/// file-backed kinds, installs the per-page SPT entries the page
/// loader expects to find at fault time. Anonymous areas get no eager
/// SPT entry: their pages are demand-zeroed on first touch.
///
/// # Errors
/// See [`MmapError`].
pub fn mmap(task: &'static Task, mut area: Area) -> Result<Range<UserVirtual>, MmapError> {
    if !valid_range(area.range()) {
        return Err(MmapError::InvalidRange);
    }
    if area.flags().contains(Flags::PERMANENT) {
        return Err(MmapError::InvalidFlags);
    }

    let mut areas = task.areas().lock();

    if area.base().is_null() || overlaps_with_existing(&areas, area.range()) {
        if area.flags().contains(Flags::FIXED) {
            return Err(MmapError::WouldOverlap);
        }
        let range = find_free_range(&areas, area.len()).ok_or(MmapError::OutOfVirtualMemory)?;
        area.set_range(range);
    }

    let range = area.range().clone();

    match *area.kind() {
        Type::Anonymous => {}
        Type::File { file, offset, writable } => install_file_backing(task, &range, file, offset, writable, false),
        Type::Mmf { file, offset } => install_file_backing(task, &range, file, offset, true, true),
    }

    areas.insert(area.base(), area);
    Ok(range)
}

/// Installs one `FILE`/`MMF` SPT entry per page of `range`, reading
/// `crate::fs::size` to decide how much of the last page is real file
/// content versus zero padding.
fn install_file_backing(task: &'static Task, range: &Range<UserVirtual>, file: mm::FileHandle, offset: usize, writable: bool, mmf: bool) {
    let file_len = crate::fs::size(file);
    let mut file_offset = offset;

    for upage in range.clone().step_by(PAGE_SIZE) {
        let remaining = file_len.saturating_sub(file_offset);
        let read_bytes = remaining.min(PAGE_SIZE);
        let zero_bytes = PAGE_SIZE - read_bytes;

        let inserted = if mmf {
            task.spt().insert_mmf(upage, file, file_offset, read_bytes)
        } else {
            task.spt().insert_file(upage, file, file_offset, read_bytes, zero_bytes, writable)
        };
        inserted.expect("mmap reserved a range that already had SPT entries");

        file_offset += PAGE_SIZE;
    }
}

/// Unmaps every page in `range`: clears its SPTE (if any) and its page
/// table mapping, freeing the frame if one was resident.
///
/// `SWAP` is locked and released once per page, never held across the
/// `FRAME_ALLOCATOR` acquisition a few lines below it, to keep lock
/// order consistent with `resolve_fault`'s.
///
/// # Errors
/// See [`UnmapError`].
pub fn munmap(task: &'static Task, range: Range<UserVirtual>) -> Result<(), UnmapError> {
    if !valid_range(&range) {
        return Err(UnmapError::InvalidRange);
    }

    let mut areas = task.areas().lock();
    let overlapping: Vec<_> = areas
        .range(..range.end)
        .map(|(base, area)| (*base, area.range().clone()))
        .filter(|(_, r)| range_overlaps(&range, r))
        .collect();

    for (base, _) in overlapping {
        areas.remove(&base);
    }
    drop(areas);

    for upage in range.step_by(PAGE_SIZE) {
        task.spt().remove(upage, &mut *SWAP.lock());

        let directory = task.directory().lock();
        if let Ok(frame) = unsafe { paging::unmap(&directory.root, upage.as_virtual()) } {
            drop(directory);
            FRAME_TABLE.remove(frame);
            FRAME_ALLOCATOR.lock().free(frame);
        }
    }

    Ok(())
}

/// Resolves a page fault at the raw `address` requesting `access`, on
/// behalf of whichever task is about to run (`task` is entered first so
/// the core's `registry.current()` agrees).
///
/// `address` is the exact faulting address, not necessarily
/// page-aligned (a fault can land anywhere inside the page its SPT
/// entry or area describes, e.g. `0x08048010` into a page loaded at
/// `0x08048000`); it is rounded down to its containing page before any
/// SPT or area lookup, since both are keyed by page.
///
/// # Errors
/// See [`FaultError`].
pub fn resolve_fault(task: &'static Task, address: addr::Virtual, access: Access) -> Result<(), FaultError> {
    task.enter();
    let registry = Registry;

    let Ok(page) = UserVirtual::try_from(address.page_align_down()) else {
        return Err(FaultError::InvalidAddress);
    };

    if let Some(spte) = task.spt().lookup(page) {
        let mut frames = FRAME_ALLOCATOR.lock();
        let mut swap = SWAP.lock();
        let mut files = crate::fs::Files;
        return mm::loader::load(&FRAME_TABLE, &registry, &EVICTION, &mut *frames, &mut *swap, &mut files, task.spt(), spte).map_err(FaultError::Load);
    }

    let mut areas = task.areas().lock();
    let area = areas.range(..=page).next_back().map(|(_, a)| a.clone()).filter(|a| a.range().contains(&page));

    match area {
        Some(area) if area.access().contains(access) => {
            drop(areas);
            let mut frames = FRAME_ALLOCATOR.lock();
            let mut swap = SWAP.lock();
            let mut files = crate::fs::Files;
            mm::loader::page_in_anonymous(&FRAME_TABLE, &registry, &EVICTION, &mut *frames, &mut *swap, &mut files, page, access.contains(Access::WRITE))
                .map_err(FaultError::Load)
        }
        Some(_) => Err(FaultError::AccessDenied),
        None => {
            let grown = grow_stack_area(&mut areas, page);
            drop(areas);
            if grown {
                mm::grow_stack(&FRAME_TABLE, &registry, &mut *FRAME_ALLOCATOR.lock(), page);
                Ok(())
            } else {
                Err(FaultError::NotMapped)
            }
        }
    }
}

/// A coarse stack-growth bound, enforced here rather than by a real
/// trap handler: any address within [`crate::config::MAX_STACK_SIZE`]
/// below the stack base is eligible to extend the stack. Real hardware
/// would additionally compare against the faulting instruction's stack
/// pointer; that would need the trap frame this crate's scope stops
/// short of (no IDT/interrupt handling — see `src/x86_64/mod.rs`).
fn plausibly_grows_stack(page: UserVirtual) -> bool {
    let addr = u64::from(page);
    let base = crate::config::STACK_BASE;
    addr < base && base - addr <= crate::config::MAX_STACK_SIZE
}

/// If `page` lies immediately below an area carrying `Flags::GROW_DOWN`
/// (the task's stack area, installed by `Task::spawn`) and
/// [`plausibly_grows_stack`] bounds the extension, grows that area
/// downward to cover `page` and returns `true`. The area is re-keyed in
/// `areas` since the map key is an area's base address, which just
/// moved.
fn grow_stack_area(areas: &mut alloc::collections::BTreeMap<UserVirtual, Area>, page: UserVirtual) -> bool {
    if !plausibly_grows_stack(page) {
        return false;
    }

    let above = page + PAGE_SIZE as u64;
    let Some(area) = areas.get(&above) else {
        return false;
    };
    if !area.flags().contains(Flags::GROW_DOWN) {
        return false;
    }

    let mut area = areas.remove(&above).expect("just looked up by the same key");
    area.set_range(page..area.range().end);
    areas.insert(page, area);
    true
}

fn find_free_range(areas: &alloc::collections::BTreeMap<UserVirtual, Area>, size: usize) -> Option<Range<UserVirtual>> {
    let gap = |start: usize, end: usize| {
        if end.saturating_sub(start) >= size {
            Some(UserVirtual::from(start)..UserVirtual::from(start + size))
        } else {
            None
        }
    };

    let between = areas.iter().zip(areas.iter().skip(1)).find_map(|((_, area), (_, next))| gap(usize::from(area.range().end), usize::from(next.range().start)));
    if between.is_some() {
        return between;
    }

    let after_last = areas.values().next_back().map_or(PAGE_SIZE, |area| usize::from(area.range().end));
    let top = usize::from(UserVirtual::last_aligned_page());
    gap(after_last, top)
}

fn overlaps_with_existing(areas: &alloc::collections::BTreeMap<UserVirtual, Area>, range: &Range<UserVirtual>) -> bool {
    areas.range(..range.end).next_back().is_some_and(|(_, area)| area.range().end > range.start)
}

fn range_overlaps(a: &Range<UserVirtual>, b: &Range<UserVirtual>) -> bool {
    let a_end = usize::from(a.end);
    let b_end = usize::from(b.end);
    usize::from(a.start) < b_end && a_end > usize::from(b.start)
}

fn valid_range(range: &Range<UserVirtual>) -> bool {
    addr::Virtual::from(range.start).is_page_aligned() && range.end <= UserVirtual::last_aligned_page() && !range.is_empty()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MmapError {
    InvalidFlags,
    InvalidRange,
    WouldOverlap,
    OutOfVirtualMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnmapError {
    InvalidRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultError {
    /// The faulting address does not lie in user space at all (not
    /// even potentially mappable), so it was rejected before any SPT
    /// or area lookup.
    InvalidAddress,
    NotMapped,
    AccessDenied,
    Load(LoadError),
}
