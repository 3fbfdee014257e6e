//! The page loader: invoked by the fault handler with an SPTE,
//! materializes its contents into a freshly allocated frame.

use addr::{frame::Frame, user::UserVirtual};

use crate::error::{EvictError, LoadError};
use crate::eviction::EvictionEngine;
use crate::frame_table::FrameTable;
use crate::spte::{BackingKind, Spte};
use crate::traits::{FileBacking, PhysFrameSource, SwapDevice, ThreadRegistry};

/// Produces a frame for the faulting task: a fresh allocation if one
/// is available, otherwise the frame reclaimed by one eviction.
///
/// # Errors
/// `OutOfMemory`/`SwapExhausted` if no frame could be produced even
/// through eviction.
///
/// # Panics
/// Panics if eviction reports `EvictError::Fatal` (empty frame table
/// or an unrecoverable write-back failure): this is unrecoverable
/// kernel state and is not retried.
fn allocate_user_frame<R: ThreadRegistry>(
    table: &FrameTable,
    registry: &R,
    eviction: &EvictionEngine,
    frames: &mut dyn PhysFrameSource,
    swap: &mut dyn SwapDevice,
    files: &mut dyn FileBacking,
    zeroed: bool,
) -> Result<Frame, LoadError> {
    if let Some(frame) = frames.alloc(zeroed) {
        table.add(frame, registry.current()).map_err(|()| LoadError::OutOfMemory)?;
        return Ok(frame);
    }

    match eviction.evict(table, registry, swap, files, frames) {
        Ok(frame) => {
            if zeroed {
                frames.zero(frame);
            }
            Ok(frame)
        }
        Err(EvictError::SwapExhausted) => Err(LoadError::SwapExhausted),
        Err(EvictError::Fatal) => panic!("eviction engine found no eligible victim or a write-back failed"),
    }
}

/// Installs `frame` at `upage` in the faulting task's page directory,
/// or releases `frame` and tears down its (still frame-table-only)
/// entry on failure.
fn install<R: ThreadRegistry>(
    table: &FrameTable,
    registry: &R,
    frames: &mut dyn PhysFrameSource,
    frame: Frame,
    upage: UserVirtual,
    writable: bool,
) -> Result<(), LoadError> {
    let tid = registry.current();
    let result = registry
        .with_page_directory(tid, |pd| pd.map(upage, frame, writable))
        .expect("current task has no page directory");

    match result {
        Ok(()) => {
            table.associate(frame, upage);
            Ok(())
        }
        Err(e) => {
            table.remove(frame);
            frames.free(frame);
            Err(LoadError::from(e))
        }
    }
}

/// Materializes a brand-new anonymous page with no prior SPTE. The
/// stack grower is one named instance of this; an `mmap`'d anonymous
/// region's first-touch fault is the same operation, generalized so it
/// goes through the same eviction-capable allocation path as every
/// other page loader rather than the stack grower's
/// silent-drop-on-failure behaviour (appropriate only for the specific
/// stack-growth heuristic that component is scoped to).
pub fn page_in_anonymous<R: ThreadRegistry>(
    table: &FrameTable,
    registry: &R,
    eviction: &EvictionEngine,
    frames: &mut dyn PhysFrameSource,
    swap: &mut dyn SwapDevice,
    files: &mut dyn FileBacking,
    upage: UserVirtual,
    writable: bool,
) -> Result<(), LoadError> {
    let frame = allocate_user_frame(table, registry, eviction, frames, swap, files, true)?;
    install(table, registry, frames, frame, upage, writable)
}

/// Materializes a `FILE` entry: a lazily-loaded executable or
/// file-backed mapping with no current swap slot.
pub fn load_file<R: ThreadRegistry>(
    table: &FrameTable,
    registry: &R,
    eviction: &EvictionEngine,
    frames: &mut dyn PhysFrameSource,
    swap: &mut dyn SwapDevice,
    files: &mut dyn FileBacking,
    spt: &crate::spt::SupplementalPageTable,
    spte: Spte,
) -> Result<(), LoadError> {
    let info = spte.file.expect("FILE entry missing file-backing payload");
    let frame = allocate_user_frame(table, registry, eviction, frames, swap, files, true)?;

    files.seek(info.file, info.offset);
    let read = files.read_into(info.file, frame, info.read_bytes);
    if read < info.read_bytes {
        table.remove(frame);
        frames.free(frame);
        return Err(LoadError::ShortRead);
    }

    install(table, registry, frames, frame, spte.vaddr, info.writable)?;

    let mut persisted = spte;
    persisted.loaded = true;
    spt.update(persisted);
    Ok(())
}

/// Materializes an `MMF` or `MMF|SWAP` entry. The mapping is always
/// writable; unread bytes past `read_bytes` are zero-padded to a full
/// page. On success, any swap slot is released and the `SWAP` bit is
/// cleared explicitly, rather than leaked until the next eviction
/// reuses it.
pub fn load_mmf<R: ThreadRegistry>(
    table: &FrameTable,
    registry: &R,
    eviction: &EvictionEngine,
    frames: &mut dyn PhysFrameSource,
    swap: &mut dyn SwapDevice,
    files: &mut dyn FileBacking,
    spt: &crate::spt::SupplementalPageTable,
    spte: Spte,
) -> Result<(), LoadError> {
    let info = spte.file.expect("MMF entry missing file-backing payload");
    let frame = allocate_user_frame(table, registry, eviction, frames, swap, files, true)?;

    files.seek(info.file, info.offset);
    let read = files.read_into(info.file, frame, info.read_bytes);
    if read < info.read_bytes {
        table.remove(frame);
        frames.free(frame);
        return Err(LoadError::ShortRead);
    }

    install(table, registry, frames, frame, spte.vaddr, true)?;

    let mut persisted = spte;
    if let Some(info) = persisted.swap.take() {
        swap.clear_slot(info.slot);
    }
    persisted.kind.remove(BackingKind::SWAP);
    persisted.loaded = true;
    spt.update(persisted);
    Ok(())
}

/// Materializes a pure `SWAP` (anonymous) entry. The SPTE is destroyed
/// after a successful fault-in, since an anonymous page has no other
/// backing once its frame is authoritative.
pub fn load_swap<R: ThreadRegistry>(
    table: &FrameTable,
    registry: &R,
    eviction: &EvictionEngine,
    frames: &mut dyn PhysFrameSource,
    swap: &mut dyn SwapDevice,
    files: &mut dyn FileBacking,
    spt: &crate::spt::SupplementalPageTable,
    spte: Spte,
) -> Result<(), LoadError> {
    let info = spte.swap.expect("SWAP entry missing swap payload");
    let frame = allocate_user_frame(table, registry, eviction, frames, swap, files, false)?;

    swap.swap_in(info.slot, frame);
    install(table, registry, frames, frame, spte.vaddr, info.writable)?;

    spt.remove(spte.vaddr, swap);
    Ok(())
}

/// Materializes a `FILE|SWAP` entry: like `SWAP`, but the entry
/// transitions back to plain `FILE` and survives (so a future clean
/// eviction can discard it without re-swapping), with its swap slot
/// explicitly released rather than leaked.
pub fn load_file_swap<R: ThreadRegistry>(
    table: &FrameTable,
    registry: &R,
    eviction: &EvictionEngine,
    frames: &mut dyn PhysFrameSource,
    swap: &mut dyn SwapDevice,
    files: &mut dyn FileBacking,
    spt: &crate::spt::SupplementalPageTable,
    spte: Spte,
) -> Result<(), LoadError> {
    let swap_info = spte.swap.expect("FILE|SWAP entry missing swap payload");
    let frame = allocate_user_frame(table, registry, eviction, frames, swap, files, false)?;

    swap.swap_in(swap_info.slot, frame);
    install(table, registry, frames, frame, spte.vaddr, swap_info.writable)?;

    swap.clear_slot(swap_info.slot);
    let mut persisted = spte;
    persisted.swap = None;
    persisted.kind.remove(BackingKind::SWAP);
    persisted.loaded = true;
    spt.update(persisted);
    Ok(())
}

/// Dispatches on `spte.kind` to the right loader. This is the single
/// entry point the fault handler calls once it has found an SPTE for
/// the faulting address.
///
/// # Panics
/// Panics if `spte.kind` is an combination this design never
/// constructs (e.g. `FILE|MMF`).
#[allow(clippy::too_many_arguments)]
pub fn load<R: ThreadRegistry>(
    table: &FrameTable,
    registry: &R,
    eviction: &EvictionEngine,
    frames: &mut dyn PhysFrameSource,
    swap: &mut dyn SwapDevice,
    files: &mut dyn FileBacking,
    spt: &crate::spt::SupplementalPageTable,
    spte: Spte,
) -> Result<(), LoadError> {
    let has_swap = spte.kind.contains(BackingKind::SWAP);
    let is_mmf = spte.kind.contains(BackingKind::MMF);
    let is_file = spte.kind.contains(BackingKind::FILE);

    match (is_file, is_mmf, has_swap) {
        (true, false, false) => load_file(table, registry, eviction, frames, swap, files, spt, spte),
        (false, true, _) => load_mmf(table, registry, eviction, frames, swap, files, spt, spte),
        (false, false, true) => load_swap(table, registry, eviction, frames, swap, files, spt, spte),
        (true, false, true) => load_file_swap(table, registry, eviction, frames, swap, files, spt, spte),
        (false, false, false) => unreachable!("an SPTE with no backing should never be faulted on directly"),
        (true, true, _) => unreachable!("FILE|MMF is never constructed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeDirectory, FakeFiles, FakeFrameSource, FakeRegistry, FakeSwap, PhysicalMemory};
    use crate::{FileHandle, ThreadId};
    use addr::user::UserVirtual;
    use addr::Virtual;

    fn upage(addr: u64) -> UserVirtual {
        UserVirtual::new_panic(Virtual::new(addr))
    }

    #[test]
    fn lazy_file_load_reads_and_zero_pads() {
        let mem = PhysicalMemory::new();
        let table = FrameTable::new();
        let mut registry = FakeRegistry::new();
        let tid = ThreadId::new(1);
        registry.spawn(tid, FakeDirectory::new());

        let mut frames = FakeFrameSource::new(mem.clone());
        let mut swap = FakeSwap::new(mem.clone(), 1);
        let mut files = FakeFiles::new(mem.clone());
        let file = FileHandle::new(1);
        let mut content = vec![0x41u8; 4000];
        content.extend(vec![0xFF; 1000]); // tail is never read
        files.put(file, content);

        registry
            .spt(tid)
            .unwrap()
            .insert_file(upage(0x0804_8000), file, 0, 4000, 96, false)
            .unwrap();
        let spte = registry.spt(tid).unwrap().lookup(upage(0x0804_8000)).unwrap();

        let eviction = EvictionEngine::new();
        load(&table, &registry, &eviction, &mut frames, &mut swap, &mut files, registry.spt(tid).unwrap(), spte).unwrap();

        let dir_frame = registry.with_page_directory(tid, |pd| pd.mapped_frame(upage(0x0804_8000))).unwrap().unwrap();
        let page = mem.read(dir_frame);
        assert_eq!(&page[0..4000], &[0x41u8; 4000][..]);
        assert_eq!(&page[4000..4096], &[0u8; 96][..]);
    }

    #[test]
    fn anonymous_round_trip_through_swap() {
        let mem = PhysicalMemory::new();
        let table = FrameTable::new();
        let mut registry = FakeRegistry::new();
        let tid = ThreadId::new(1);
        registry.spawn(tid, FakeDirectory::new());

        let mut frames = FakeFrameSource::new(mem.clone());
        let mut swap = FakeSwap::new(mem.clone(), 2);
        let mut files = FakeFiles::new(mem.clone());
        let eviction = EvictionEngine::new();

        let frame = frames.alloc(true).unwrap();
        mem.write(frame, b"the stack pattern");
        table.add(frame, tid).unwrap();
        table.associate(frame, upage(0xbfff_f000));
        registry
            .with_page_directory(tid, |pd| pd.map(upage(0xbfff_f000), frame, true).unwrap())
            .unwrap();
        registry.with_page_directory(tid, |pd| pd.set_dirty(upage(0xbfff_f000), true));

        eviction
            .evict(&table, &registry, &mut swap, &mut files, &mut frames)
            .unwrap();

        let spte = registry.spt(tid).unwrap().lookup(upage(0xbfff_f000)).unwrap();
        assert!(spte.kind.contains(BackingKind::SWAP));

        load(&table, &registry, &eviction, &mut frames, &mut swap, &mut files, registry.spt(tid).unwrap(), spte).unwrap();

        assert!(registry.spt(tid).unwrap().lookup(upage(0xbfff_f000)).is_none());
        let dir_frame = registry.with_page_directory(tid, |pd| pd.mapped_frame(upage(0xbfff_f000))).unwrap().unwrap();
        let page = mem.read(dir_frame);
        assert_eq!(&page[0..17], b"the stack pattern");
    }

    #[test]
    fn page_in_anonymous_installs_zeroed_writable_page_with_no_spte() {
        let mem = PhysicalMemory::new();
        let table = FrameTable::new();
        let mut registry = FakeRegistry::new();
        let tid = ThreadId::new(1);
        registry.spawn(tid, FakeDirectory::new());

        let mut frames = FakeFrameSource::new(mem.clone());
        let mut swap = FakeSwap::new(mem.clone(), 1);
        let mut files = FakeFiles::new(mem.clone());
        let eviction = EvictionEngine::new();

        page_in_anonymous(&table, &registry, &eviction, &mut frames, &mut swap, &mut files, upage(0x0900_0000), true).unwrap();

        let frame = registry.with_page_directory(tid, |pd| pd.mapped_frame(upage(0x0900_0000))).unwrap().unwrap();
        assert_eq!(mem.read(frame), [0u8; 4096]);
        assert!(registry.spt(tid).unwrap().lookup(upage(0x0900_0000)).is_none());
    }
}
