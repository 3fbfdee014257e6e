//! The stack grower: the cheapest of the demand-paging components.
//! Called by the external fault handler once it has decided the fault
//! address plausibly extends a user stack; installs one zeroed,
//! writable page and nothing else. No SPTE is created here — the
//! eviction engine synthesizes one the first time this page is ever
//! chosen as a victim.

use addr::user::UserVirtual;

use crate::frame_table::FrameTable;
use crate::traits::{PhysFrameSource, ThreadRegistry};

/// Grows the stack of `registry.current()` by mapping a fresh zeroed
/// page at `upage`, writable.
///
/// Allocation or install failure is silently dropped, not reported as
/// an error: the fault simply re-raises on re-execution, and the
/// external fault handler terminates the process when it re-decides
/// the address is not in fact a valid stack extension (or, if it still
/// is, retries this same call).
pub fn grow_stack<R: ThreadRegistry>(table: &FrameTable, registry: &R, frames: &mut dyn PhysFrameSource, upage: UserVirtual) {
    let Some(frame) = frames.alloc(true) else {
        return;
    };

    let tid = registry.current();
    if table.add(frame, tid).is_err() {
        frames.free(frame);
        return;
    }

    let mapped = registry.with_page_directory(tid, |pd| pd.map(upage, frame, true));
    match mapped {
        Some(Ok(())) => {
            table.associate(frame, upage);
        }
        _ => {
            table.remove(frame);
            frames.free(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeDirectory, FakeFrameSource, FakeRegistry, PhysicalMemory};
    use crate::ThreadId;
    use addr::Virtual;

    fn upage(addr: u64) -> UserVirtual {
        UserVirtual::new_panic(Virtual::new(addr))
    }

    #[test]
    fn grows_stack_with_writable_zeroed_page() {
        let mem = PhysicalMemory::new();
        let table = FrameTable::new();
        let mut registry = FakeRegistry::new();
        let tid = ThreadId::new(1);
        registry.spawn(tid, FakeDirectory::new());

        let mut frames = FakeFrameSource::new(mem.clone());
        grow_stack(&table, &registry, &mut frames, upage(0xbfff_f000));

        let frame = registry
            .with_page_directory(tid, |pd| pd.mapped_frame(upage(0xbfff_f000)))
            .unwrap()
            .unwrap();
        assert_eq!(mem.read(frame), [0u8; 4096]);
        assert!(registry.with_page_directory(tid, |pd| pd.is_writable(upage(0xbfff_f000))).unwrap());
        assert_eq!(table.lookup(frame).unwrap().user_page, Some(upage(0xbfff_f000)));
    }

    #[test]
    fn allocation_failure_is_silently_dropped() {
        let mem = PhysicalMemory::new();
        let table = FrameTable::new();
        let mut registry = FakeRegistry::new();
        let tid = ThreadId::new(1);
        registry.spawn(tid, FakeDirectory::new());

        let mut frames = FakeFrameSource::with_capacity(mem, 0);
        grow_stack(&table, &registry, &mut frames, upage(0xbfff_f000));

        assert!(registry
            .with_page_directory(tid, |pd| pd.mapped_frame(upage(0xbfff_f000)))
            .unwrap()
            .is_none());
        assert!(table.is_empty());
    }
}
