//! The swap device: the `SwapDevice` collaborator the eviction engine
//! persists evicted anonymous pages through. A flat array of
//! page-sized slots carved out of a contiguous physical range at boot,
//! the same way [`super::heap`] carves its own range out of the frame
//! allocator.

use addr::frame::Frame;
use addr::Virtual;
use alloc::vec;
use alloc::vec::Vec;
use macros::init;
use mm::traits::SwapDevice;
use mm::{SwapError, SwapSlot};
use sync::{Lazy, Spinlock};

use super::frame::FRAME_ALLOCATOR;

pub static SWAP: Lazy<Spinlock<SwapArea>> = Lazy::new(|| Spinlock::new(SwapArea::uninitialized()));

/// A fixed number of page-sized slots backed by ordinary physical
/// frames. A real kernel would back this with a disk partition; this
/// one treats swap as just another range of memory, which is enough to
/// exercise the eviction engine without a block device driver.
pub struct SwapArea {
    base: Virtual,
    slots: usize,
    used: Vec<bool>,
}

impl SwapArea {
    const fn uninitialized() -> Self {
        Self {
            base: Virtual::null(),
            slots: 0,
            used: Vec::new(),
        }
    }

    fn slot_address(&self, slot: SwapSlot) -> Virtual {
        self.base + slot.0 * Frame::SIZE
    }
}

/// Carves `slots` contiguous frames out of the frame allocator to back
/// the swap device.
///
/// # Safety
/// Must be called exactly once, after the frame allocator is set up.
#[init]
pub unsafe fn setup(slots: usize) {
    let range = FRAME_ALLOCATOR.lock().alloc_contiguous(slots).expect("not enough contiguous memory for the swap device");

    *SWAP.lock() = SwapArea {
        base: Virtual::from(range.start.address()),
        slots,
        used: vec![false; slots],
    };

    let size = lib::byte::ByteSize::from(slots * Frame::SIZE);
    log::info!("swap: {slots} slots reserved ({size})");
}

impl SwapDevice for SwapArea {
    fn swap_out(&mut self, frame: Frame) -> Result<SwapSlot, SwapError> {
        let index = self.used.iter().position(|used| !used).ok_or(SwapError)?;
        self.used[index] = true;

        let slot = SwapSlot::new(index);
        unsafe {
            let src = Virtual::from(frame.address()).as_ptr::<u8>();
            let dst = self.slot_address(slot).as_mut_ptr::<u8>();
            core::ptr::copy_nonoverlapping(src, dst, Frame::SIZE);
        }
        Ok(slot)
    }

    fn swap_in(&mut self, slot: SwapSlot, frame: Frame) {
        unsafe {
            let src = self.slot_address(slot).as_ptr::<u8>();
            let dst = Virtual::from(frame.address()).as_mut_ptr::<u8>();
            core::ptr::copy_nonoverlapping(src, dst, Frame::SIZE);
        }
    }

    fn clear_slot(&mut self, slot: SwapSlot) {
        assert!(self.used[slot.0], "double release of swap slot {}", slot.0);
        self.used[slot.0] = false;
    }
}
