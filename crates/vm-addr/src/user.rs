//! User-space virtual addresses: a `Virtual` restricted to the lower
//! canonical half, used everywhere the kernel must guarantee an address
//! cannot stray into kernel space (page faults, `mmap`, the supplemental
//! page table).
use core::{
    fmt,
    iter::Step,
    ops::{Add, Sub},
};

use crate::Virtual;

/// The highest address a user-space page can start at, one page below
/// the start of canonical kernel space.
const USER_VIRTUAL_END: u64 = 0x0000_7FFF_FFFF_F000;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct UserVirtual(u64);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InvalidUserVirtual(pub Virtual);

impl UserVirtual {
    /// # Errors
    /// Returns `Err` if the address lies outside user space or is not
    /// page-aligned.
    pub const fn new(address: Virtual) -> Result<Self, InvalidUserVirtual> {
        if address.is_user() && address.0 <= USER_VIRTUAL_END && address.is_page_aligned() {
            Ok(Self(address.0))
        } else {
            Err(InvalidUserVirtual(address))
        }
    }

    /// # Panics
    /// Panics if `address` is not a valid, page-aligned user address.
    #[must_use]
    pub const fn new_panic(address: Virtual) -> Self {
        match Self::new(address) {
            Ok(addr) => addr,
            Err(_) => panic!("address is not a valid user-space page address"),
        }
    }

    #[must_use]
    pub const fn as_virtual(self) -> Virtual {
        Virtual(self.0)
    }

    #[must_use]
    pub const fn page_offset(&self, bytes: u64) -> Self {
        Self(self.0 + bytes)
    }

    #[must_use]
    pub const fn is_page_aligned(&self) -> bool {
        self.0.trailing_zeros() >= 12
    }

    /// Rounds down to the page containing this address. Always
    /// succeeds: rounding down can only move an address toward zero,
    /// never out of the user range it already lies in.
    #[must_use]
    pub const fn page_align_down(&self) -> Self {
        Self(self.0 & !0xFFF)
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// The last page-aligned address still inside user space.
    #[must_use]
    pub const fn last_aligned_page() -> Self {
        Self(USER_VIRTUAL_END)
    }

    /// The page-aligned address one page below [`Self::last_aligned_page`].
    #[must_use]
    pub const fn second_last_aligned_page() -> Self {
        Self(USER_VIRTUAL_END - 0x1000)
    }
}

impl fmt::Debug for UserVirtual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserVirtual({:#x})", self.0)
    }
}

impl fmt::Display for UserVirtual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for InvalidUserVirtual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InvalidUserVirtual({:?})", self.0)
    }
}

impl TryFrom<Virtual> for UserVirtual {
    type Error = InvalidUserVirtual;
    fn try_from(address: Virtual) -> Result<Self, Self::Error> {
        Self::new(address)
    }
}

impl From<UserVirtual> for Virtual {
    fn from(address: UserVirtual) -> Self {
        address.as_virtual()
    }
}

impl From<UserVirtual> for u64 {
    fn from(address: UserVirtual) -> Self {
        address.0
    }
}

impl From<UserVirtual> for usize {
    fn from(address: UserVirtual) -> Self {
        address.0 as usize
    }
}

/// # Panics
/// Panics if `address` is not a valid, page-aligned user address, the
/// same way [`Virtual`]'s own `From<usize>` panics on a non-canonical
/// address.
impl From<usize> for UserVirtual {
    fn from(address: usize) -> Self {
        Self::new_panic(Virtual::from(address))
    }
}

impl Add<u64> for UserVirtual {
    type Output = UserVirtual;
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl Sub<UserVirtual> for UserVirtual {
    type Output = u64;
    fn sub(self, rhs: UserVirtual) -> Self::Output {
        self.0 - rhs.0
    }
}

impl Step for UserVirtual {
    fn steps_between(start: &Self, end: &Self) -> Option<usize> {
        end.0.checked_sub(start.0).and_then(|x| usize::try_from(x).ok())
    }

    fn forward_checked(start: Self, count: usize) -> Option<Self> {
        let new = start.0.checked_add(count as u64)?;
        (new <= USER_VIRTUAL_END).then_some(Self(new))
    }

    fn backward_checked(start: Self, count: usize) -> Option<Self> {
        let new = start.0.checked_sub(count as u64)?;
        Some(Self(new))
    }
}
