//! The kernel heap, backing `alloc::{Box, Vec, ...}` for the rest of
//! the kernel. A spinlock-guarded `linked_list_allocator::Heap`.

use core::alloc::{GlobalAlloc, Layout};
use core::ops::{Deref, Range};
use core::sync::atomic::{AtomicUsize, Ordering};

use addr::{frame::Frame, Virtual};
use sync::Spinlock;

pub struct Heap {
    inner: Spinlock<linked_list_allocator::Heap>,
    allocated: AtomicUsize,
}

impl Heap {
    /// Does not initialize the heap; the caller must call [`Self::init`]
    /// before any allocation happens.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Spinlock::new(linked_list_allocator::Heap::empty()),
            allocated: AtomicUsize::new(0),
        }
    }

    /// # Safety
    /// Must be called exactly once, with a range of frames that stays
    /// allocated and exclusively owned by the heap for the rest of the
    /// kernel's lifetime.
    pub unsafe fn init(&self, range: Range<Frame>) {
        self.inner.lock().init(
            Virtual::from(range.start.address()).as_mut_ptr::<u8>(),
            range.end.as_usize().saturating_sub(range.start.as_usize()) * Frame::SIZE,
        );
    }

    #[must_use]
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Heap {
    type Target = Spinlock<linked_list_allocator::Heap>;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

unsafe impl GlobalAlloc for Heap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocated.fetch_add(layout.size(), Ordering::SeqCst);
        self.inner.lock().allocate_first_fit(layout).ok().map_or(core::ptr::null_mut(), |p| p.as_ptr())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.inner.lock().deallocate(core::ptr::NonNull::new_unchecked(ptr), layout);
        self.allocated.fetch_sub(layout.size(), Ordering::SeqCst);
    }
}
