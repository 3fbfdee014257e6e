//! The eviction engine: chooses a victim frame, persists its contents,
//! updates the owning SPT entry, and clears its mapping. Holds
//! `EVICT_LOCK` for the entirety of one eviction so that only one
//! victim is ever being processed at a time, even when several threads
//! run out of frames simultaneously.

use addr::frame::Frame;
use sync::Spinlock;

use crate::error::EvictError;
use crate::frame_table::FrameTable;
use crate::ids::ThreadId;
use crate::spte::{BackingKind, Spte, SwapInfo};
use crate::traits::{FileBacking, PageDirectory, SwapDevice, ThreadRegistry};

#[derive(Default)]
pub struct EvictionEngine {
    lock: Spinlock<()>,
}

impl EvictionEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lock: Spinlock::new(()),
        }
    }

    /// Runs one full eviction: victim selection, persistence, SPTE
    /// update, PTE clear, and FTE re-tag to `registry.current()`.
    /// Returns the now-free (and now-owned-by-the-caller) frame.
    ///
    /// # Errors
    /// `SwapExhausted` if persisting a dirty/anonymous victim needs a
    /// swap slot and none is free. `Fatal` if the frame table has no
    /// eligible victim at all (propagated from
    /// [`FrameTable::select_victim`]); callers are expected to panic
    /// on `Fatal` rather than attempt recovery.
    pub fn evict<R: ThreadRegistry>(
        &self,
        table: &FrameTable,
        registry: &R,
        swap: &mut dyn SwapDevice,
        files: &mut dyn FileBacking,
        frames: &mut dyn crate::traits::PhysFrameSource,
    ) -> Result<Frame, EvictError> {
        let _guard = self.lock.lock();

        let victim = table.select_victim(registry)?;
        log::debug!("evict: selected frame {:?} owned by {}", victim.frame, victim.owner);
        let owner = victim.owner;
        let upage = victim.user_page.ok_or(EvictError::Fatal)?;
        let spt = registry.spt(owner).expect("evicting frame owned by a task with no SPT");

        let mut spte = spt
            .lookup(upage)
            .unwrap_or_else(|| Spte::anonymous_placeholder(upage));

        let dirty = registry
            .with_page_directory(owner, |pd| pd.is_dirty(upage))
            .unwrap_or(false);

        let is_mmf = spte.kind.contains(BackingKind::MMF);
        let already_swapped = spte.kind.contains(BackingKind::SWAP);
        let is_anonymous = spte.is_pure_anonymous();

        if dirty && is_mmf {
            let info = spte.file.expect("MMF entry missing file-backing payload");
            files.write_from(info.file, victim.frame, info.offset, info.read_bytes);
            log::trace!("evict: wrote dirty mmf page back to file {}", info.file);
        } else if is_anonymous || already_swapped || dirty {
            // Anonymous pages always need a home; MMF/FILE pages need
            // one here only if they are dirty (FILE writes never go
            // back to the read-only file, only to swap) or if they
            // already carry a swap slot that must be refreshed.
            let writable = registry
                .with_page_directory(owner, |pd| pd.is_writable(upage))
                .unwrap_or(false);
            let slot = swap.swap_out(victim.frame).map_err(|_| EvictError::SwapExhausted)?;
            spte.swap = Some(SwapInfo { slot, writable });
            spte.kind |= BackingKind::SWAP;
        }
        // Otherwise: a clean FILE or clean MMF page needs no
        // persistence, its canonical copy already matches the frame.

        spte.loaded = false;
        spt.update(spte);

        frames.zero(victim.frame);
        registry.with_page_directory(owner, |pd| pd.unmap(upage));
        table.reassign(victim.frame, registry.current());

        Ok(victim.frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeDirectory, FakeFiles, FakeFrameSource, FakeRegistry, FakeSwap, PhysicalMemory};
    use crate::FileHandle;
    use addr::user::UserVirtual;
    use addr::Virtual;

    fn upage(addr: u64) -> UserVirtual {
        UserVirtual::new_panic(Virtual::new(addr))
    }

    #[test]
    fn clean_file_page_evicts_without_touching_swap() {
        let mem = PhysicalMemory::new();
        let table = FrameTable::new();
        let mut registry = FakeRegistry::new();
        let tid = ThreadId::new(1);
        registry.spawn(tid, FakeDirectory::new());

        let mut frames = FakeFrameSource::new(mem.clone());
        let mut swap = FakeSwap::new(mem.clone(), 1);
        let mut files = FakeFiles::new(mem.clone());

        let frame = frames.alloc(true).unwrap();
        table.add(frame, tid).unwrap();
        table.associate(frame, upage(0x1000));
        registry
            .with_page_directory(tid, |pd| pd.map(upage(0x1000), frame, false).unwrap())
            .unwrap();

        registry
            .spt(tid)
            .unwrap()
            .insert_file(upage(0x1000), FileHandle::new(1), 0, 4000, 96, false)
            .unwrap();

        let engine = EvictionEngine::new();
        let evicted = engine
            .evict(&table, &registry, &mut swap, &mut files, &mut frames)
            .unwrap();

        assert_eq!(evicted, frame);
        let spte = registry.spt(tid).unwrap().lookup(upage(0x1000)).unwrap();
        assert!(!spte.kind.contains(BackingKind::SWAP));
    }

    #[test]
    fn dirty_anonymous_page_is_swapped_out() {
        let mem = PhysicalMemory::new();
        let table = FrameTable::new();
        let mut registry = FakeRegistry::new();
        let tid = ThreadId::new(1);
        registry.spawn(tid, FakeDirectory::new());

        let mut frames = FakeFrameSource::new(mem.clone());
        let mut swap = FakeSwap::new(mem.clone(), 1);
        let mut files = FakeFiles::new(mem.clone());

        let frame = frames.alloc(true).unwrap();
        mem.write(frame, b"hello stack");
        table.add(frame, tid).unwrap();
        table.associate(frame, upage(0xb000));
        registry
            .with_page_directory(tid, |pd| pd.map(upage(0xb000), frame, true).unwrap())
            .unwrap();
        registry.with_page_directory(tid, |pd| pd.set_dirty(upage(0xb000), true));

        let engine = EvictionEngine::new();
        engine
            .evict(&table, &registry, &mut swap, &mut files, &mut frames)
            .unwrap();

        let spte = registry.spt(tid).unwrap().lookup(upage(0xb000)).unwrap();
        assert!(spte.kind.contains(BackingKind::SWAP));
        assert!(spte.swap.unwrap().writable);
    }

    #[test]
    fn mmf_dirty_page_writes_back_to_file() {
        let mem = PhysicalMemory::new();
        let table = FrameTable::new();
        let mut registry = FakeRegistry::new();
        let tid = ThreadId::new(1);
        registry.spawn(tid, FakeDirectory::new());

        let mut frames = FakeFrameSource::new(mem.clone());
        let mut swap = FakeSwap::new(mem.clone(), 1);
        let mut files = FakeFiles::new(mem.clone());
        let file = FileHandle::new(7);
        files.put(file, vec![0u8; 4096]);

        let frame = frames.alloc(true).unwrap();
        mem.write(frame, &[0xAAu8; 4096]);
        table.add(frame, tid).unwrap();
        table.associate(frame, upage(0x4000));
        registry
            .with_page_directory(tid, |pd| pd.map(upage(0x4000), frame, true).unwrap())
            .unwrap();
        registry.with_page_directory(tid, |pd| pd.set_dirty(upage(0x4000), true));

        registry
            .spt(tid)
            .unwrap()
            .insert_mmf(upage(0x4000), file, 0, 4096)
            .unwrap();

        let engine = EvictionEngine::new();
        engine
            .evict(&table, &registry, &mut swap, &mut files, &mut frames)
            .unwrap();

        assert_eq!(files.get(file), &[0xAAu8; 4096][..]);
        let spte = registry.spt(tid).unwrap().lookup(upage(0x4000)).unwrap();
        assert!(!spte.kind.contains(BackingKind::SWAP));
    }

    #[test]
    fn swap_exhaustion_is_reported() {
        let mem = PhysicalMemory::new();
        let table = FrameTable::new();
        let mut registry = FakeRegistry::new();
        let tid = ThreadId::new(1);
        registry.spawn(tid, FakeDirectory::new());

        let mut frames = FakeFrameSource::new(mem.clone());
        let mut swap = FakeSwap::new(mem.clone(), 0);
        let mut files = FakeFiles::new(mem.clone());

        let frame = frames.alloc(true).unwrap();
        table.add(frame, tid).unwrap();
        table.associate(frame, upage(0xb000));
        registry
            .with_page_directory(tid, |pd| pd.map(upage(0xb000), frame, true).unwrap())
            .unwrap();
        registry.with_page_directory(tid, |pd| pd.set_dirty(upage(0xb000), true));

        let engine = EvictionEngine::new();
        let result = engine.evict(&table, &registry, &mut swap, &mut files, &mut frames);
        assert_eq!(result, Err(EvictError::SwapExhausted));
    }
}
