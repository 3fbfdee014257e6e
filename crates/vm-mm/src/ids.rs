//! Small identifier newtypes used throughout the core so that a thread
//! id, a swap slot index and a file handle can never be silently mixed
//! up with a plain `usize`/`u64`, mirroring the `Identifier` pattern
//! used for tasks elsewhere in the kernel.

/// The identity of the process (in this design, a single-threaded
/// "task") that owns a frame or an SPT. Opaque to the core; supplied by
/// the [`crate::ThreadRegistry`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

impl ThreadId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "thread#{}", self.0)
    }
}

impl From<u64> for ThreadId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// The index of a fixed-size slot on the swap device. A swap slot holds
/// exactly one evicted page's worth of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapSlot(pub usize);

impl SwapSlot {
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }
}

impl core::fmt::Display for SwapSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "swap#{}", self.0)
    }
}

/// An opaque handle identifying an open file or memory-mapped file
/// resource. The core never interprets this value; it is only ever
/// threaded back through [`crate::FileBacking`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileHandle(pub u64);

impl FileHandle {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for FileHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "file#{}", self.0)
    }
}
