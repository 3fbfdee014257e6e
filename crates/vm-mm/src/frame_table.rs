//! The frame table: the global registry of every physical frame
//! currently handed to a user process. A plain `Vec` behind a single
//! spinlock (`FT_LOCK`), in insertion order; the linear scan is
//! acceptable because working sets in this kernel are small, and
//! ordered iteration is what the clock algorithm in
//! [`crate::eviction`] needs.

use alloc::vec::Vec;

use addr::{frame::Frame, user::UserVirtual};
use sync::Spinlock;

use crate::error::EvictError;
use crate::ids::ThreadId;
use crate::traits::ThreadRegistry;

/// One physical frame currently in use by some user process.
///
/// A raw page-table-entry pointer is deliberately not one of these
/// fields: instead, the owning PTE is looked up through `(owner,
/// user_page)` via [`ThreadRegistry::with_page_directory`] whenever it
/// is needed, which sidesteps the pointer's lifetime entirely and
/// keeps this entry free of any reference back into the page
/// directory that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTableEntry {
    pub frame: Frame,
    pub owner: ThreadId,
    pub user_page: Option<UserVirtual>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<FrameTableEntry>,
    /// Explicit clock hand, advanced on every inspection during victim
    /// selection, rather than moving the chosen victim to the tail of
    /// the table: it scans without mutating table order mid-scan,
    /// which is simpler to reason about and to test.
    hand: usize,
}

#[derive(Debug, Default)]
pub struct FrameTable {
    inner: Spinlock<Inner>,
}

impl FrameTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Spinlock::new(Inner {
                entries: Vec::new(),
                hand: 0,
            }),
        }
    }

    /// Registers `frame` as owned by `owner`. Fails only if the
    /// backing storage for the new entry cannot be allocated.
    ///
    /// # Errors
    /// Returns `Err(())` if the entry record itself cannot be
    /// allocated (out of memory).
    pub fn add(&self, frame: Frame, owner: ThreadId) -> Result<(), ()> {
        let mut inner = self.inner.lock();
        inner.entries.try_reserve(1).map_err(|_| ())?;
        inner.entries.push(FrameTableEntry {
            frame,
            owner,
            user_page: None,
        });
        Ok(())
    }

    #[must_use]
    pub fn lookup(&self, frame: Frame) -> Option<FrameTableEntry> {
        self.inner
            .lock()
            .entries
            .iter()
            .find(|e| e.frame == frame)
            .copied()
    }

    pub fn remove(&self, frame: Frame) -> Option<FrameTableEntry> {
        let mut inner = self.inner.lock();
        let index = inner.entries.iter().position(|e| e.frame == frame)?;
        Some(inner.entries.remove(index))
    }

    /// Records the page-directory slot and user virtual page that now
    /// map `frame`, once the owner has installed the mapping. Needed
    /// because the allocator hands out a frame before the
    /// page-directory install is attempted.
    pub fn associate(&self, frame: Frame, upage: UserVirtual) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.iter_mut().find(|e| e.frame == frame) {
            Some(entry) => {
                entry.user_page = Some(upage);
                true
            }
            None => false,
        }
    }

    /// Re-tags `frame` as owned by `new_owner` with no mapping yet,
    /// exactly as the eviction engine does to a victim once its
    /// contents are persisted and its old mapping cleared: the FTE
    /// stays in the table and is implicitly handed to the new holder,
    /// which calls `associate` after its own page-directory install.
    pub fn reassign(&self, frame: Frame, new_owner: ThreadId) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.iter_mut().find(|e| e.frame == frame) {
            Some(entry) => {
                entry.owner = new_owner;
                entry.user_page = None;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate clock / second-chance victim selection. Scans at
    /// most two full passes over the table: on the
    /// second pass every frame has had its accessed bit cleared by the
    /// first, so a victim is always found if the table is non-empty.
    /// Entries with no installed mapping yet (`user_page == None`,
    /// mid-fault on another thread) cannot have their accessed bit
    /// read and are skipped without being cleared.
    ///
    /// # Errors
    /// `EvictError::Fatal` if the table is empty, or if every
    /// inspectable entry stayed accessed across both passes (this
    /// cannot happen if at least one entry has `user_page.is_some()`,
    /// since the first pass clears every accessed bit it reads).
    pub fn select_victim<R: ThreadRegistry>(&self, registry: &R) -> Result<FrameTableEntry, EvictError> {
        let mut inner = self.inner.lock();
        let len = inner.entries.len();
        if len == 0 {
            return Err(EvictError::Fatal);
        }

        let max_inspections = 2 * len;
        for _ in 0..max_inspections {
            let idx = inner.hand % len;
            inner.hand = (inner.hand + 1) % len;
            let entry = inner.entries[idx];

            let Some(upage) = entry.user_page else {
                continue;
            };

            let accessed = registry
                .with_page_directory(entry.owner, |pd| pd.is_accessed(upage))
                .unwrap_or(false);

            if accessed {
                registry.with_page_directory(entry.owner, |pd| pd.set_accessed(upage, false));
            } else {
                return Ok(entry);
            }
        }

        Err(EvictError::Fatal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeDirectory, FakeRegistry};

    fn frame(i: usize) -> Frame {
        Frame::new(i)
    }

    fn upage(addr: u64) -> UserVirtual {
        UserVirtual::new_panic(addr::Virtual::new(addr))
    }

    #[test]
    fn add_lookup_remove_round_trip() {
        let table = FrameTable::new();
        table.add(frame(1), ThreadId::new(1)).unwrap();
        assert!(table.lookup(frame(1)).is_some());
        assert!(table.remove(frame(1)).is_some());
        assert!(table.lookup(frame(1)).is_none());
    }

    #[test]
    fn associate_sets_user_page() {
        let table = FrameTable::new();
        table.add(frame(1), ThreadId::new(1)).unwrap();
        assert!(table.associate(frame(1), upage(0x1000)));
        assert_eq!(table.lookup(frame(1)).unwrap().user_page, Some(upage(0x1000)));
    }

    #[test]
    fn empty_table_is_fatal() {
        let table = FrameTable::new();
        let registry = FakeRegistry::new();
        assert_eq!(table.select_victim(&registry), Err(EvictError::Fatal));
    }

    #[test]
    fn clock_picks_first_unaccessed() {
        let table = FrameTable::new();
        let registry = FakeRegistry::new();

        let tid = ThreadId::new(1);
        registry.spawn(tid, FakeDirectory::new());

        table.add(frame(1), tid).unwrap();
        table.add(frame(2), tid).unwrap();
        table.associate(frame(1), upage(0x1000));
        table.associate(frame(2), upage(0x2000));

        registry.with_page_directory(tid, |pd| pd.set_accessed(upage(0x1000), true));

        let victim = table.select_victim(&registry).unwrap();
        assert_eq!(victim.frame, frame(2));
    }

    #[test]
    fn clock_terminates_within_two_passes_when_all_accessed() {
        let table = FrameTable::new();
        let registry = FakeRegistry::new();
        let tid = ThreadId::new(1);
        registry.spawn(tid, FakeDirectory::new());

        for i in 1..=3 {
            table.add(frame(i), tid).unwrap();
            table.associate(frame(i), upage(i as u64 * 0x1000));
            registry.with_page_directory(tid, |pd| pd.set_accessed(upage(i as u64 * 0x1000), true));
        }

        // First pass clears every accessed bit; the algorithm must
        // find a victim on (at most) the second pass.
        let victim = table.select_victim(&registry);
        assert!(victim.is_ok());
    }
}
