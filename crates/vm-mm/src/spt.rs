//! The per-process supplemental page table: a keyed map from user
//! virtual page to [`Spte`]. Guarded by its own spinlock rather than
//! relying solely on `FT_LOCK`/`EVICT_LOCK`, so one process's page-in
//! traffic never contends with another's (see `DESIGN.md`).

use addr::user::UserVirtual;
use hashbrown::HashMap;
use sync::Spinlock;

use crate::error::SptError;
use crate::ids::FileHandle;
use crate::spte::{FileBackingInfo, Spte};
use crate::traits::SwapDevice;

#[derive(Debug, Default)]
pub struct SupplementalPageTable {
    entries: Spinlock<HashMap<UserVirtual, Spte>>,
}

impl SupplementalPageTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Spinlock::new(HashMap::new()),
        }
    }

    /// Lazily-loaded executable or mapped file page.
    ///
    /// # Errors
    /// `DuplicateKey` if an entry already exists for `upage`.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_file(
        &self,
        upage: UserVirtual,
        file: FileHandle,
        offset: usize,
        read_bytes: usize,
        zero_bytes: usize,
        writable: bool,
    ) -> Result<(), SptError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&upage) {
            return Err(SptError::DuplicateKey);
        }
        let info = FileBackingInfo {
            file,
            offset,
            read_bytes,
            zero_bytes,
            writable,
        };
        entries.insert(upage, Spte::file(upage, info));
        Ok(())
    }

    /// A user memory-mapped file region. Dirty pages write back to the
    /// file on eviction or unmap; the mapping is always writable.
    ///
    /// # Errors
    /// `DuplicateKey` if an entry already exists for `upage`.
    pub fn insert_mmf(
        &self,
        upage: UserVirtual,
        file: FileHandle,
        offset: usize,
        read_bytes: usize,
    ) -> Result<(), SptError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&upage) {
            return Err(SptError::DuplicateKey);
        }
        let info = FileBackingInfo {
            file,
            offset,
            read_bytes,
            zero_bytes: 0,
            writable: true,
        };
        entries.insert(upage, Spte::mmf(upage, info));
        Ok(())
    }

    #[must_use]
    pub fn lookup(&self, upage: UserVirtual) -> Option<Spte> {
        self.entries.lock().get(&upage).copied()
    }

    /// Replaces the entry at `upage` wholesale. Used by the eviction
    /// engine and the page loader, which read a copy via `lookup`,
    /// mutate it, and write it back.
    pub fn update(&self, spte: Spte) {
        self.entries.lock().insert(spte.vaddr, spte);
    }

    /// Inserts a brand-new entry unconditionally, overwriting any
    /// existing one. Used by the eviction engine to synthesize the
    /// placeholder SPTE for a page with no prior backing.
    pub fn insert_raw(&self, spte: Spte) {
        self.entries.lock().insert(spte.vaddr, spte);
    }

    /// Removes the entry at `upage`. If it held a swap slot, the slot
    /// is released back to `swap`.
    pub fn remove(&self, upage: UserVirtual, swap: &mut dyn SwapDevice) -> Option<Spte> {
        let removed = self.entries.lock().remove(&upage);
        if let Some(entry) = &removed {
            if let Some(info) = entry.swap {
                swap.clear_slot(info.slot);
            }
        }
        removed
    }

    /// Applies `remove` semantics to every entry. Called on process
    /// exit.
    pub fn destroy(&self, swap: &mut dyn SwapDevice) {
        let drained: alloc::vec::Vec<_> = self.entries.lock().drain().collect();
        for (_, entry) in drained {
            if let Some(info) = entry.swap {
                swap.clear_slot(info.slot);
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spte::{BackingKind, SwapInfo};
    use crate::test_support::{FakeSwap, PhysicalMemory};
    use crate::FileHandle;
    use addr::frame::Frame;
    use addr::Virtual;

    fn upage(addr: u64) -> UserVirtual {
        UserVirtual::new_panic(Virtual::new(addr))
    }

    #[test]
    fn insert_file_rejects_duplicate_key() {
        let spt = SupplementalPageTable::new();
        spt.insert_file(upage(0x1000), FileHandle::new(1), 0, 4096, 0, false).unwrap();

        let err = spt.insert_file(upage(0x1000), FileHandle::new(2), 0, 4096, 0, true).unwrap_err();
        assert_eq!(err, SptError::DuplicateKey);
    }

    #[test]
    fn insert_mmf_rejects_duplicate_key() {
        let spt = SupplementalPageTable::new();
        spt.insert_mmf(upage(0x2000), FileHandle::new(1), 0, 4096).unwrap();

        let err = spt.insert_mmf(upage(0x2000), FileHandle::new(1), 4096, 4096).unwrap_err();
        assert_eq!(err, SptError::DuplicateKey);
    }

    #[test]
    fn insert_mmf_over_an_existing_file_key_is_also_rejected() {
        let spt = SupplementalPageTable::new();
        spt.insert_file(upage(0x3000), FileHandle::new(1), 0, 4096, 0, false).unwrap();

        let err = spt.insert_mmf(upage(0x3000), FileHandle::new(1), 0, 4096).unwrap_err();
        assert_eq!(err, SptError::DuplicateKey);
    }

    #[test]
    fn remove_releases_the_swap_slot() {
        let mem = PhysicalMemory::new();
        let mut swap = FakeSwap::new(mem.clone(), 1);
        let frame = Frame::new(1);
        mem.write(frame, b"anonymous page contents");
        let slot = swap.swap_out(frame).unwrap();

        let spt = SupplementalPageTable::new();
        let mut spte = Spte::anonymous_placeholder(upage(0x4000));
        spte.kind |= BackingKind::SWAP;
        spte.swap = Some(SwapInfo { slot, writable: true });
        spt.insert_raw(spte);

        spt.remove(upage(0x4000), &mut swap).unwrap();

        // The slot was released back to the pool, so it can be reused.
        assert!(swap.swap_out(frame).is_ok());
    }

    #[test]
    fn destroy_releases_swap_slots_for_every_entry() {
        let mem = PhysicalMemory::new();
        let mut swap = FakeSwap::new(mem.clone(), 2);
        let frame = Frame::new(1);
        mem.write(frame, b"evicted page contents");
        let slot_a = swap.swap_out(frame).unwrap();
        let slot_b = swap.swap_out(frame).unwrap();

        let spt = SupplementalPageTable::new();
        let mut a = Spte::anonymous_placeholder(upage(0x5000));
        a.kind |= BackingKind::SWAP;
        a.swap = Some(SwapInfo { slot: slot_a, writable: true });
        spt.insert_raw(a);

        let mut b = Spte::anonymous_placeholder(upage(0x6000));
        b.kind |= BackingKind::SWAP;
        b.swap = Some(SwapInfo { slot: slot_b, writable: false });
        spt.insert_raw(b);

        assert!(swap.swap_out(frame).is_err(), "both slots should be in use before destroy");

        spt.destroy(&mut swap);

        assert!(spt.is_empty());
        // Both slots released: the capacity-2 device can hold two more.
        assert!(swap.swap_out(frame).is_ok());
        assert!(swap.swap_out(frame).is_ok());
    }
}
