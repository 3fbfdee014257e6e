//! The filesystem collaborator (`FileBacking`): the boot module image
//! handed over by the bootloader. Every module Limine loaded is copied
//! to the heap once, at boot, and the frames it used are reclaimed, so
//! the rest of the kernel never has to worry about the bootloader's
//! memory staying mapped.
//!
//! There is no notion of directories or dynamic creation here, only a
//! flat namespace of boot-time files looked up by path and addressed
//! afterwards by an opaque [`FileHandle`].

use core::ffi::CStr;

use addr::frame::Frame;
use addr::{Physical, Virtual};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use hashbrown::HashMap;
use macros::init;
use mm::traits::{FileBacking, PhysFrameSource};
use mm::FileHandle;
use sync::{Lazy, Spinlock};

use crate::memory::frame::FRAME_ALLOCATOR;

struct Entry {
    #[allow(dead_code)]
    path: String,
    data: Vec<u8>,
}

pub struct Registry {
    entries: Vec<Entry>,
    cursors: HashMap<u64, usize>,
}

pub static FILES: Lazy<Spinlock<Registry>> = Lazy::new(|| {
    Spinlock::new(Registry {
        entries: Vec::new(),
        cursors: HashMap::new(),
    })
});

/// Copies every Limine boot module to the heap and reclaims the frames
/// it occupied.
///
/// # Safety
/// Must be called exactly once, after the heap is initialized, and the
/// module data the bootloader reports must be valid.
#[init]
#[allow(clippy::cast_possible_truncation)]
pub unsafe fn setup() {
    let response = crate::limine::LIMINE_MODULES.get_response().get().expect("bootloader did not provide any modules");

    let mut registry = FILES.lock();
    for module in response.modules() {
        let path = CStr::from_ptr(module.path.as_ptr()).to_string_lossy().to_string();
        let data = core::slice::from_raw_parts(module.address.as_ptr().cast::<u8>(), module.size as usize).to_vec();

        let start = Frame::from_address(Physical::from(Virtual::new(module.address.as_ptr() as u64)));
        let end = Frame::from_address(Physical::from(Virtual::new(module.address.as_ptr() as u64 + module.size).page_align_up()));

        let mut frames = FRAME_ALLOCATOR.lock();
        for frame in start..end {
            frames.free(frame);
        }

        log::info!("fs: loaded {path} ({} bytes)", data.len());
        registry.entries.push(Entry { path, data });
    }
}

/// Looks up a boot module by its path, returning the handle later
/// `FileBacking` calls address it by.
#[must_use]
pub fn open(path: &str) -> Option<FileHandle> {
    FILES.lock().entries.iter().position(|e| e.path == path).map(|index| FileHandle::new(index as u64))
}

/// The total length of a boot file, used by `user::vmm::mmap` to work
/// out how many pages of a `File`/`Mmf` area are real content versus
/// zero padding.
#[must_use]
pub fn size(file: FileHandle) -> usize {
    FILES.lock().entries[file.0 as usize].data.len()
}

/// The zero-sized `FileBacking` adapter the rest of the kernel passes
/// to the demand-paging core. Zero-sized because all of its state
/// actually lives in [`FILES`]; this just gives the core something to
/// hold a `&mut dyn FileBacking` to.
pub struct Files;

impl FileBacking for Files {
    fn seek(&mut self, file: FileHandle, offset: usize) {
        FILES.lock().cursors.insert(file.0, offset);
    }

    fn read_into(&mut self, file: FileHandle, frame: Frame, len: usize) -> usize {
        let mut registry = FILES.lock();
        let cursor = registry.cursors.get(&file.0).copied().unwrap_or(0);
        let entry = &registry.entries[file.0 as usize];

        let available = entry.data.len().saturating_sub(cursor);
        let read = len.min(available);

        unsafe {
            let dst = Virtual::from(frame.address()).as_mut_ptr::<u8>();
            core::ptr::copy_nonoverlapping(entry.data[cursor..cursor + read].as_ptr(), dst, read);
        }

        registry.cursors.insert(file.0, cursor + read);
        read
    }

    fn write_from(&mut self, file: FileHandle, frame: Frame, offset: usize, len: usize) {
        let mut registry = FILES.lock();
        let entry = &mut registry.entries[file.0 as usize];

        if entry.data.len() < offset + len {
            entry.data.resize(offset + len, 0);
        }

        unsafe {
            let src = Virtual::from(frame.address()).as_ptr::<u8>();
            core::ptr::copy_nonoverlapping(src, entry.data[offset..offset + len].as_mut_ptr(), len);
        }
    }
}
