//! The physical frame allocator: the `PhysFrameSource` collaborator the
//! demand-paging core allocates and frees user frames through. A flat
//! `Free`/`Used` bitmap parsed from the Limine memory map,
//! linear-scanned on allocation.
//!
//! This drops the architectural template's generic `FrameInfo<T>` +
//! reference-counted `retain`/`release` machinery: that design exists
//! so several independent subsystems can share frame ownership. Here
//! every frame has exactly one owner at a time (tracked instead by
//! `vm_mm::FrameTable` for user frames, and implicitly by the page
//! table hierarchy for kernel frames), so a plain free/used flag is
//! sufficient. See `DESIGN.md`.

use addr::frame::Frame;
use addr::Virtual;
use limine::{LimineMemmapEntry, LimineMemoryMapEntryType, NonNullPtr};
use macros::init;
use mm::traits::PhysFrameSource;
use sync::Spinlock;

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Free,
    Used,
    Reserved,
}

pub struct FrameAllocator {
    frames: &'static mut [State],
    next: usize,
}

pub static FRAME_ALLOCATOR: Spinlock<FrameAllocator> = Spinlock::new(FrameAllocator::uninitialized());

impl FrameAllocator {
    const fn uninitialized() -> Self {
        Self {
            frames: &mut [],
            next: 0,
        }
    }

    /// Parses the Limine memory map and builds the frame bitmap,
    /// placing the bitmap itself inside the first usable region large
    /// enough to hold it.
    ///
    /// # Safety
    /// Must be called exactly once, before any other memory-manager
    /// subsystem runs, and the memory map must describe the machine
    /// this kernel is actually running on.
    #[init]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub unsafe fn new(mmap: &[NonNullPtr<LimineMemmapEntry>]) -> Self {
        let last = mmap
            .iter()
            .filter(|e| {
                e.typ == LimineMemoryMapEntryType::Usable
                    || e.typ == LimineMemoryMapEntryType::KernelAndModules
                    || e.typ == LimineMemoryMapEntryType::BootloaderReclaimable
            })
            .map(|e| e.base + e.len)
            .max()
            .unwrap_or(0);

        let count = (last as usize).div_ceil(Frame::SIZE);
        let bytes = count * core::mem::size_of::<State>();

        let location = mmap
            .iter()
            .filter(|e| e.typ == LimineMemoryMapEntryType::Usable)
            .find(|e| e.len as usize >= bytes)
            .map(|e| e.base)
            .expect("no usable region large enough for the frame bitmap");

        let ptr = Virtual::from(addr::Physical::new(location)).as_mut_ptr::<State>() as *mut State;
        for i in 0..count {
            ptr.add(i).write(State::Reserved);
        }
        let frames = core::slice::from_raw_parts_mut(ptr, count);

        for entry in mmap {
            let start = (entry.base as usize) / Frame::SIZE;
            let end = ((entry.base + entry.len) as usize).div_ceil(Frame::SIZE).min(count);
            let state = match entry.typ {
                LimineMemoryMapEntryType::Usable => State::Free,
                _ => State::Reserved,
            };
            for slot in &mut frames[start.min(count)..end] {
                *slot = state;
            }
        }

        let bitmap_start = location as usize / Frame::SIZE;
        let bitmap_end = (bitmap_start + bytes.div_ceil(Frame::SIZE)).min(count);
        for slot in &mut frames[bitmap_start..bitmap_end] {
            *slot = State::Used;
        }

        Self { frames, next: 0 }
    }

    /// Finds `count` physically contiguous free frames and marks them
    /// used. Only needed to bootstrap the kernel heap, which wants a
    /// virtually (and therefore, under the direct map, physically)
    /// contiguous range.
    pub fn alloc_contiguous(&mut self, count: usize) -> Option<core::ops::Range<Frame>> {
        let len = self.frames.len();
        let mut start = 0;
        while start + count <= len {
            if self.frames[start..start + count].iter().all(|s| *s == State::Free) {
                for slot in &mut self.frames[start..start + count] {
                    *slot = State::Used;
                }
                return Some(Frame::new(start)..Frame::new(start + count));
            }
            start += 1;
        }
        None
    }
}

impl PhysFrameSource for FrameAllocator {
    fn alloc(&mut self, zeroed: bool) -> Option<Frame> {
        let len = self.frames.len();
        if len == 0 {
            return None;
        }

        for offset in 0..len {
            let index = (self.next + offset) % len;
            if self.frames[index] == State::Free {
                self.frames[index] = State::Used;
                self.next = (index + 1) % len;

                let frame = Frame::new(index);
                if zeroed {
                    unsafe {
                        let ptr = Virtual::from(frame.address()).as_mut_ptr::<u8>() as *mut u8;
                        ptr.write_bytes(0, Frame::SIZE);
                    }
                }
                return Some(frame);
            }
        }
        None
    }

    fn free(&mut self, frame: Frame) {
        let index = frame.as_usize();
        assert!(self.frames[index] == State::Used, "double free of frame {frame}");
        self.frames[index] = State::Free;
    }

    fn zero(&mut self, frame: Frame) {
        unsafe {
            let ptr = Virtual::from(frame.address()).as_mut_ptr::<u8>() as *mut u8;
            ptr.write_bytes(0, Frame::SIZE);
        }
    }
}
