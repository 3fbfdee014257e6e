//! The external interfaces the core consumes from its environment: the
//! hardware page directory, the physical frame allocator, the swap
//! device, the filesystem, and the thread registry. Each is out of
//! scope for this crate and is only exposed through the narrow surface
//! the core actually calls, following the same `unsafe trait Allocator`
//! abstraction the kernel already uses for its physical frame
//! allocator.

use addr::{frame::Frame, user::UserVirtual};

use crate::error::{MapError, SwapError};
use crate::ids::{FileHandle, SwapSlot, ThreadId};

/// The hardware page-directory interface for a single address space:
/// map/unmap a user page and read/clear its accessed and dirty bits.
pub trait PageDirectory {
    /// Installs `frame` at `upage`, writable iff `writable`.
    ///
    /// # Errors
    /// `AlreadyMapped` if `upage` is already mapped; `OutOfMemory` if
    /// an intermediate page-table level could not be allocated.
    fn map(&mut self, upage: UserVirtual, frame: Frame, writable: bool) -> Result<(), MapError>;

    /// Clears the mapping at `upage`, if any.
    fn unmap(&mut self, upage: UserVirtual);

    #[must_use]
    fn is_accessed(&self, upage: UserVirtual) -> bool;

    fn set_accessed(&mut self, upage: UserVirtual, value: bool);

    #[must_use]
    fn is_dirty(&self, upage: UserVirtual) -> bool;

    #[must_use]
    fn is_writable(&self, upage: UserVirtual) -> bool;
}

/// The raw physical frame allocator this crate borrows from, rather
/// than owning frame allocation itself.
pub trait PhysFrameSource {
    /// Returns a fresh user frame, zeroed iff `zeroed`, or `None` if
    /// physical memory is exhausted.
    fn alloc(&mut self, zeroed: bool) -> Option<Frame>;

    fn free(&mut self, frame: Frame);

    /// Overwrites the whole frame with zero bytes. Used by the
    /// eviction engine, which must scrub a victim before handing it to
    /// its new owner.
    fn zero(&mut self, frame: Frame);
}

/// The raw swap device: a fixed-capacity array of page-sized slots.
pub trait SwapDevice {
    /// Copies `frame`'s contents into a freshly reserved slot.
    ///
    /// # Errors
    /// `SwapError` if every slot is already in use.
    fn swap_out(&mut self, frame: Frame) -> Result<SwapSlot, SwapError>;

    /// Copies `slot`'s contents into `frame`. The slot is left intact;
    /// the caller releases it explicitly with `clear_slot` once the
    /// SPTE no longer needs it.
    fn swap_in(&mut self, slot: SwapSlot, frame: Frame);

    /// Releases `slot` back to the free pool.
    fn clear_slot(&mut self, slot: SwapSlot);
}

/// The filesystem, narrowed to seek/read/write on an opaque handle.
pub trait FileBacking {
    fn seek(&mut self, file: FileHandle, offset: usize);

    /// Reads up to `len` bytes from `file` (at the offset last set by
    /// `seek`) into `frame`, starting at its first byte. Returns the
    /// number of bytes actually read.
    fn read_into(&mut self, file: FileHandle, frame: Frame, len: usize) -> usize;

    /// Writes `len` bytes from `frame`'s first byte back to `file` at
    /// `offset`.
    fn write_from(&mut self, file: FileHandle, frame: Frame, offset: usize, len: usize);
}

/// The thread/task registry: resolves a [`ThreadId`] to the page
/// directory and supplemental page table owned by that task, and
/// reports which thread is currently running.
///
/// Access to the page directory is mediated through a closure rather
/// than a borrowed reference so that implementations are free to keep
/// it behind whatever lock they already hold (the real kernel behind
/// the task's own spinlock, test fakes behind a plain `RefCell`)
/// without leaking a guard type into this crate's signatures.
pub trait ThreadRegistry {
    type Dir: PageDirectory;

    /// Runs `f` against the page directory owned by `tid`, or returns
    /// `None` if `tid` does not name a live task.
    fn with_page_directory<R>(&self, tid: ThreadId, f: impl FnOnce(&mut Self::Dir) -> R) -> Option<R>;

    /// The supplemental page table owned by `tid`, if `tid` is live.
    fn spt(&self, tid: ThreadId) -> Option<&crate::spt::SupplementalPageTable>;

    /// The thread currently executing (and therefore the one that
    /// will own any frame newly allocated during this call).
    fn current(&self) -> ThreadId;
}
