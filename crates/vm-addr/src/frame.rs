//! Physical frame indices and frame ranges.
use core::{
    fmt,
    iter::Step,
    ops::{Add, AddAssign, Sub, SubAssign},
};

use crate::Physical;

/// The index of a physical page frame, i.e. a physical address shifted
/// right by 12 bits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Index(usize);

impl Index {
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Index({})", self.0)
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for Index {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl From<Index> for usize {
    fn from(index: Index) -> Self {
        index.0
    }
}

/// A count of physical frames, distinct from `Index` so that adding a
/// count to a frame reads as what it is instead of raw index arithmetic.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct FrameCount(usize);

impl FrameCount {
    #[must_use]
    pub const fn new(count: usize) -> Self {
        Self(count)
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    #[must_use]
    pub const fn to_bytes(self) -> usize {
        self.0 * 4096
    }
}

impl fmt::Debug for FrameCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameCount({})", self.0)
    }
}

impl fmt::Display for FrameCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for FrameCount {
    fn from(count: usize) -> Self {
        Self(count)
    }
}

impl From<FrameCount> for usize {
    fn from(count: FrameCount) -> Self {
        count.0
    }
}

impl Add for FrameCount {
    type Output = FrameCount;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for FrameCount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for FrameCount {
    type Output = FrameCount;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for FrameCount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

/// A physical page frame: the unit the frame allocator and frame table
/// both operate on. Always frame-aligned; `Frame::address()` gives back
/// the physical address of the first byte of the frame.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Frame(usize);

impl Frame {
    /// The size in bytes of a single physical frame.
    pub const SIZE: usize = 4096;

    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// # Panics
    /// Panics if the address is not frame-aligned.
    #[must_use]
    pub const fn from_address(address: Physical) -> Self {
        assert!(address.is_page_aligned(), "address is not frame-aligned");
        Self(address.frame_index())
    }

    #[must_use]
    pub const fn index(self) -> Index {
        Index(self.0)
    }

    #[must_use]
    pub const fn address(self) -> Physical {
        Physical::new_truncate((self.0 as u64) << 12)
    }

    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:#x})", self.0)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

impl From<usize> for Frame {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl From<Frame> for usize {
    fn from(frame: Frame) -> Self {
        frame.0
    }
}

impl From<Index> for Frame {
    fn from(index: Index) -> Self {
        Self(index.0)
    }
}

impl Add<usize> for Frame {
    type Output = Frame;
    fn add(self, rhs: usize) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl Add<FrameCount> for Frame {
    type Output = Frame;
    fn add(self, rhs: FrameCount) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub<Frame> for Frame {
    type Output = FrameCount;
    fn sub(self, rhs: Frame) -> Self::Output {
        FrameCount(self.0 - rhs.0)
    }
}

impl Sub<usize> for Frame {
    type Output = Frame;
    fn sub(self, rhs: usize) -> Self::Output {
        Self(self.0 - rhs)
    }
}

impl Step for Frame {
    fn steps_between(start: &Self, end: &Self) -> Option<usize> {
        end.0.checked_sub(start.0)
    }

    fn forward_checked(start: Self, count: usize) -> Option<Self> {
        start.0.checked_add(count).map(Self)
    }

    fn backward_checked(start: Self, count: usize) -> Option<Self> {
        start.0.checked_sub(count).map(Self)
    }
}
