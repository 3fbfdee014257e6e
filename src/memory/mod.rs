//! Memory-manager setup: the physical frame allocator, the kernel
//! heap that sits on top of it, and the swap device.
//!
//! Named `memory` rather than `mm` so it does not shadow the `mm`
//! (`vm-mm`) dependency that the rest of the kernel imports
//! unqualified for the demand-paging core.

use macros::init;

pub mod frame;
pub mod heap;
pub mod swap;

use frame::FRAME_ALLOCATOR;

/// How many frames to reserve for the kernel heap at boot. Grown later
/// would require a virtually-contiguous extension scheme the allocator
/// does not implement; a flat 16 MiB has been enough for every workload
/// this kernel has been asked to run.
const HEAP_FRAME_COUNT: usize = 4096;

#[global_allocator]
static HEAP_ALLOCATOR: heap::Heap = heap::Heap::new();

/// Brings up the physical frame allocator from the bootloader's memory
/// map and carves out the kernel heap.
///
/// # Safety
/// Must be called exactly once, before any other subsystem that
/// allocates memory.
#[init]
pub unsafe fn setup() {
    let response = crate::limine::LIMINE_MEMMAP.get_response().get().expect("bootloader did not provide a memory map");
    let mmap = response.memmap();

    *FRAME_ALLOCATOR.lock() = frame::FrameAllocator::new(mmap);

    let range = FRAME_ALLOCATOR.lock().alloc_contiguous(HEAP_FRAME_COUNT).expect("not enough contiguous memory for the kernel heap");
    HEAP_ALLOCATOR.init(range);

    let size = lib::byte::ByteSize::from(HEAP_FRAME_COUNT * addr::frame::Frame::SIZE);
    log::info!("heap: {HEAP_FRAME_COUNT} frames reserved ({size})");

    swap::setup(crate::config::SWAP_SLOTS);
}
