//! In-memory fakes for the core's external traits, used only by
//! `#[cfg(test)]` modules across this crate so the frame table,
//! eviction engine, SPT, loader and stack grower can be exercised
//! entirely on the host.
//!
//! [`FakeFrameSource`], [`FakeSwap`] and [`FakeFiles`] all share one
//! [`PhysicalMemory`] so that bytes actually flow frame -> swap slot
//! -> frame and frame -> file -> frame the way they would through real
//! hardware, which is what round-trip tests need to actually exercise.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use addr::{frame::Frame, user::UserVirtual};

use crate::error::SwapError;
use crate::ids::{FileHandle, SwapSlot, ThreadId};
use crate::spt::SupplementalPageTable;
use crate::traits::{FileBacking, PageDirectory, PhysFrameSource, SwapDevice, ThreadRegistry};

pub type Page = [u8; 4096];

/// The backing store for every frame ever allocated by a
/// [`FakeFrameSource`], shared with the [`FakeSwap`]/[`FakeFiles`]
/// fakes that read and write frame content.
#[derive(Clone, Default)]
pub struct PhysicalMemory(Rc<RefCell<HashMap<Frame, Page>>>);

impl PhysicalMemory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, frame: Frame, bytes: &[u8]) {
        let mut mem = self.0.borrow_mut();
        let page = mem.entry(frame).or_insert([0u8; 4096]);
        page[..bytes.len()].copy_from_slice(bytes);
    }

    #[must_use]
    pub fn read(&self, frame: Frame) -> Page {
        *self.0.borrow().get(&frame).expect("frame has no content")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PteState {
    frame: Frame,
    writable: bool,
    accessed: bool,
    dirty: bool,
}

/// A fake page directory: a plain map from user page to PTE bits.
#[derive(Debug, Default)]
pub struct FakeDirectory {
    ptes: HashMap<UserVirtual, PteState>,
}

impl FakeDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_accessed(&mut self, upage: UserVirtual, value: bool) {
        if let Some(pte) = self.ptes.get_mut(&upage) {
            pte.accessed = value;
        }
    }

    pub fn set_dirty(&mut self, upage: UserVirtual, value: bool) {
        if let Some(pte) = self.ptes.get_mut(&upage) {
            pte.dirty = value;
        }
    }

    #[must_use]
    pub fn mapped_frame(&self, upage: UserVirtual) -> Option<Frame> {
        self.ptes.get(&upage).map(|p| p.frame)
    }
}

impl PageDirectory for FakeDirectory {
    fn map(&mut self, upage: UserVirtual, frame: Frame, writable: bool) -> Result<(), crate::error::MapError> {
        if self.ptes.contains_key(&upage) {
            return Err(crate::error::MapError::AlreadyMapped);
        }
        self.ptes.insert(
            upage,
            PteState {
                frame,
                writable,
                accessed: false,
                dirty: false,
            },
        );
        Ok(())
    }

    fn unmap(&mut self, upage: UserVirtual) {
        self.ptes.remove(&upage);
    }

    fn is_accessed(&self, upage: UserVirtual) -> bool {
        self.ptes.get(&upage).is_some_and(|p| p.accessed)
    }

    fn set_accessed(&mut self, upage: UserVirtual, value: bool) {
        FakeDirectory::set_accessed(self, upage, value);
    }

    fn is_dirty(&self, upage: UserVirtual) -> bool {
        self.ptes.get(&upage).is_some_and(|p| p.dirty)
    }

    fn is_writable(&self, upage: UserVirtual) -> bool {
        self.ptes.get(&upage).is_some_and(|p| p.writable)
    }
}

/// A fake thread registry: every spawned thread gets a `FakeDirectory`
/// and a `SupplementalPageTable`, both reachable by id.
#[derive(Default)]
pub struct FakeRegistry {
    tasks: RefCell<HashMap<ThreadId, RefCell<FakeDirectory>>>,
    spts: HashMap<ThreadId, SupplementalPageTable>,
    current: RefCell<ThreadId>,
}

impl FakeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: RefCell::new(HashMap::new()),
            spts: HashMap::new(),
            current: RefCell::new(ThreadId::new(0)),
        }
    }

    pub fn spawn(&mut self, tid: ThreadId, dir: FakeDirectory) {
        self.tasks.borrow_mut().insert(tid, RefCell::new(dir));
        self.spts.insert(tid, SupplementalPageTable::new());
        *self.current.borrow_mut() = tid;
    }

    pub fn set_current(&self, tid: ThreadId) {
        *self.current.borrow_mut() = tid;
    }
}

impl ThreadRegistry for FakeRegistry {
    type Dir = FakeDirectory;

    fn with_page_directory<R>(&self, tid: ThreadId, f: impl FnOnce(&mut Self::Dir) -> R) -> Option<R> {
        let tasks = self.tasks.borrow();
        tasks.get(&tid).map(|cell| f(&mut cell.borrow_mut()))
    }

    fn spt(&self, tid: ThreadId) -> Option<&SupplementalPageTable> {
        self.spts.get(&tid)
    }

    fn current(&self) -> ThreadId {
        *self.current.borrow()
    }
}

/// A fake physical frame source: a bump allocator, optionally capacity
/// bounded, whose content lives in a shared [`PhysicalMemory`].
pub struct FakeFrameSource {
    next: usize,
    cap: Option<usize>,
    mem: PhysicalMemory,
}

impl FakeFrameSource {
    #[must_use]
    pub fn new(mem: PhysicalMemory) -> Self {
        Self {
            next: 0,
            cap: None,
            mem,
        }
    }

    #[must_use]
    pub fn with_capacity(mem: PhysicalMemory, cap: usize) -> Self {
        Self {
            next: 0,
            cap: Some(cap),
            mem,
        }
    }
}

impl PhysFrameSource for FakeFrameSource {
    fn alloc(&mut self, zeroed: bool) -> Option<Frame> {
        if let Some(cap) = self.cap {
            if self.next >= cap {
                return None;
            }
        }
        let frame = Frame::new(self.next);
        self.next += 1;
        if zeroed {
            self.mem.write(frame, &[0u8; 4096]);
        }
        Some(frame)
    }

    fn free(&mut self, _frame: Frame) {}

    fn zero(&mut self, frame: Frame) {
        self.mem.write(frame, &[0u8; 4096]);
    }
}

/// A fake swap device with a fixed number of slots, backed by the same
/// [`PhysicalMemory`] as the frame source so swapped-out bytes survive
/// the round trip.
pub struct FakeSwap {
    slots: Vec<Option<Page>>,
    mem: PhysicalMemory,
}

impl FakeSwap {
    #[must_use]
    pub fn new(mem: PhysicalMemory, capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            mem,
        }
    }
}

impl SwapDevice for FakeSwap {
    fn swap_out(&mut self, frame: Frame) -> Result<SwapSlot, SwapError> {
        let index = self.slots.iter().position(Option::is_none).ok_or(SwapError)?;
        self.slots[index] = Some(self.mem.read(frame));
        Ok(SwapSlot::new(index))
    }

    fn swap_in(&mut self, slot: SwapSlot, frame: Frame) {
        let bytes = self.slots[slot.0].expect("swap_in from an empty slot");
        self.mem.write(frame, &bytes);
    }

    fn clear_slot(&mut self, slot: SwapSlot) {
        self.slots[slot.0] = None;
    }
}

/// A fake filesystem backed by an in-memory byte buffer per file,
/// reading from and writing to the shared [`PhysicalMemory`].
pub struct FakeFiles {
    files: HashMap<FileHandle, Vec<u8>>,
    cursor: HashMap<FileHandle, usize>,
    mem: PhysicalMemory,
}

impl FakeFiles {
    #[must_use]
    pub fn new(mem: PhysicalMemory) -> Self {
        Self {
            files: HashMap::new(),
            cursor: HashMap::new(),
            mem,
        }
    }

    pub fn put(&mut self, file: FileHandle, bytes: Vec<u8>) {
        self.files.insert(file, bytes);
    }

    #[must_use]
    pub fn get(&self, file: FileHandle) -> &[u8] {
        self.files.get(&file).map_or(&[], Vec::as_slice)
    }
}

impl FileBacking for FakeFiles {
    fn seek(&mut self, file: FileHandle, offset: usize) {
        self.cursor.insert(file, offset);
    }

    fn read_into(&mut self, file: FileHandle, frame: Frame, len: usize) -> usize {
        let offset = *self.cursor.get(&file).unwrap_or(&0);
        let data = self.files.get(&file).map_or(&[][..], Vec::as_slice);
        let available = data.len().saturating_sub(offset);
        let n = available.min(len);

        let mut page = self.mem.read(frame);
        page[..n].copy_from_slice(&data[offset..offset + n]);
        self.mem.write(frame, &page);
        n
    }

    fn write_from(&mut self, file: FileHandle, frame: Frame, offset: usize, len: usize) {
        let page = self.mem.read(frame);
        let buf = self.files.entry(file).or_default();
        if buf.len() < offset + len {
            buf.resize(offset + len, 0);
        }
        buf[offset..offset + len].copy_from_slice(&page[..len]);
    }
}
