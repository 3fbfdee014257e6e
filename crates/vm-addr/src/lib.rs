//! Address types for the kernel: canonical kernel virtual addresses,
//! physical addresses, user-space virtual addresses, and physical page
//! frames. Kept as its own crate so the core VM subsystem can depend on
//! strongly typed addresses without depending on the rest of the
//! kernel.
#![cfg_attr(not(test), no_std)]
#![feature(step_trait)]

use core::{
    fmt,
    iter::Step,
    ops::{Add, AddAssign, Sub, SubAssign},
};

pub mod frame;
pub mod user;

/// A canonical 64-bit virtual memory address.
///
/// On `x86_64`, only the 48 lower bits of a virtual address can be used.
/// This type guarantees that the address is always canonical, i.e. that
/// the top 17 bits are either all 0 or all 1.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Virtual(pub(crate) u64);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct InvalidVirtual(u64);

impl Virtual {
    /// Creates a new canonical virtual address.
    ///
    /// # Panics
    /// Panics if the given address is not canonical.
    #[must_use]
    pub const fn new(address: u64) -> Self {
        match Self::try_new(address) {
            Ok(addr) => addr,
            Err(InvalidVirtual(_)) => panic!("Invalid virtual address: non canonical"),
        }
    }

    pub const fn try_new(address: u64) -> Result<Self, InvalidVirtual> {
        match (address & 0xFFFF_8000_0000_0000) >> 47 {
            0 | 0x1FFFF => Ok(Self(address)),
            1 => Ok(Self::new_truncate(address)),
            _ => Err(InvalidVirtual(address)),
        }
    }

    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub const fn new_truncate(addr: u64) -> Self {
        Self(((addr << 16) as i64 >> 16) as u64)
    }

    /// # Safety
    /// The caller must ensure `address` is canonical.
    #[must_use]
    pub const unsafe fn new_unchecked(address: u64) -> Self {
        Self(address)
    }

    #[must_use]
    pub const fn is_canonical(address: u64) -> bool {
        matches!((address & 0xFFFF_8000_0000_0000) >> 47, 0 | 0x1FFFF)
    }

    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self::new(ptr as u64)
    }

    #[must_use]
    pub const fn as_ptr<T>(&self) -> *const T {
        self.0 as *const T
    }

    #[must_use]
    pub const fn as_mut_ptr<T>(&self) -> *mut T {
        self.as_ptr::<T>() as *mut T
    }

    #[must_use]
    pub const fn null() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// # Panics
    /// Panics on overflow.
    #[must_use]
    pub const fn page_align_up(&self) -> Self {
        Self::new_truncate(match self.0.checked_add(0xFFF) {
            Some(addr) => addr & !0xFFF,
            None => panic!("Overflow during aligning up a virtual address"),
        })
    }

    #[must_use]
    pub const fn page_align_down(&self) -> Self {
        Self::new_truncate(self.0 & !0xFFF)
    }

    #[must_use]
    pub const fn is_page_aligned(&self) -> bool {
        self.0.trailing_zeros() >= 12
    }

    #[must_use]
    pub const fn page_offset(&self) -> u64 {
        self.0 & 0xFFF
    }

    #[must_use]
    pub const fn page_index(self, level: usize) -> usize {
        assert!(level >= 1 && level <= 4);
        (self.0 as usize >> 12 >> ((level - 1) * 9)) & 0x1FF
    }

    #[must_use]
    pub const fn pt_index(&self) -> usize {
        self.page_index(1)
    }

    #[must_use]
    pub const fn pd_index(&self) -> usize {
        self.page_index(2)
    }

    #[must_use]
    pub const fn pdpt_index(&self) -> usize {
        self.page_index(3)
    }

    #[must_use]
    pub const fn pml4_index(&self) -> usize {
        self.page_index(4)
    }

    #[must_use]
    pub const fn is_kernel(&self) -> bool {
        self.0 >= 0xFFFF_8000_0000_0000
    }

    #[must_use]
    pub const fn is_user(&self) -> bool {
        !self.is_kernel()
    }
}

impl Step for Virtual {
    fn steps_between(start: &Self, end: &Self) -> Option<usize> {
        let steps = end.0.checked_sub(start.0)?;
        usize::try_from(steps).ok()
    }

    fn forward_checked(start: Self, count: usize) -> Option<Self> {
        let new = start.0.checked_add(count as u64)?;
        if !Virtual::is_canonical(new) {
            return None;
        }
        Some(Self::new(new))
    }

    fn backward_checked(start: Self, count: usize) -> Option<Self> {
        let new = start.0.checked_sub(count as u64)?;
        if !Virtual::is_canonical(new) {
            return None;
        }
        Some(Self::new(new))
    }
}

impl fmt::Debug for Virtual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Virtual({:#018x})", self.0)
    }
}

impl fmt::LowerHex for Virtual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::Display for Virtual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl From<Virtual> for u64 {
    fn from(address: Virtual) -> Self {
        address.0
    }
}

impl From<Virtual> for usize {
    fn from(address: Virtual) -> Self {
        address.0 as usize
    }
}

impl From<u64> for Virtual {
    fn from(address: u64) -> Self {
        Self::new(address)
    }
}

impl From<usize> for Virtual {
    fn from(address: usize) -> Self {
        Self::new(address as u64)
    }
}

impl From<Physical> for Virtual {
    fn from(address: Physical) -> Self {
        // The kernel maps all physical memory at the higher-half direct map base.
        Self::new(0xFFFF_8000_0000_0000 + address.0)
    }
}

impl Add<u64> for Virtual {
    type Output = Virtual;
    fn add(self, rhs: u64) -> Self::Output {
        Self::new(self.0 + rhs)
    }
}

impl Add<usize> for Virtual {
    type Output = Virtual;
    fn add(self, rhs: usize) -> Self::Output {
        Self::new(self.0 + rhs as u64)
    }
}

impl AddAssign<usize> for Virtual {
    fn add_assign(&mut self, rhs: usize) {
        self.0 += rhs as u64;
    }
}

impl Sub<Virtual> for Virtual {
    type Output = u64;
    fn sub(self, rhs: Virtual) -> Self::Output {
        self.0 - rhs.0
    }
}

impl Sub<u64> for Virtual {
    type Output = Virtual;
    fn sub(self, rhs: u64) -> Self::Output {
        Self::new(self.0 - rhs)
    }
}

impl SubAssign<u64> for Virtual {
    fn sub_assign(&mut self, rhs: u64) {
        self.0 -= rhs;
    }
}

/// A physical memory address, guaranteed to fit in 52 bits (the maximum
/// physical address width supported by the architecture).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Physical(pub(crate) u64);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct InvalidPhysical(u64);

impl Physical {
    pub const MAX: usize = 0x0010_0000_0000_0000;

    /// # Panics
    /// Panics if bits 52-63 are set.
    #[must_use]
    pub const fn new(address: u64) -> Self {
        match Self::try_new(address) {
            Ok(addr) => addr,
            Err(InvalidPhysical(_)) => panic!("Physical address is not valid (must be 52 bits)"),
        }
    }

    pub const fn try_new(address: u64) -> Result<Self, InvalidPhysical> {
        if address > 0x000F_FFFF_FFFF_FFFF {
            Err(InvalidPhysical(address))
        } else {
            Ok(Self(address))
        }
    }

    #[must_use]
    pub const fn new_truncate(addr: u64) -> Self {
        Self(addr & 0x000F_FFFF_FFFF_FFFF)
    }

    #[must_use]
    pub const fn is_valid(address: u64) -> bool {
        address <= 0x000F_FFFF_FFFF_FFFF
    }

    #[must_use]
    pub const fn null() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// # Panics
    /// Panics on overflow.
    #[must_use]
    pub const fn page_align_up(&self) -> Self {
        Self::new_truncate(match self.0.checked_add(0xFFF) {
            Some(addr) => addr & !0xFFF,
            None => panic!("Overflow during aligning up a physical address"),
        })
    }

    #[must_use]
    pub const fn page_align_down(&self) -> Self {
        Self::new_truncate(self.0 & !0xFFF)
    }

    #[must_use]
    pub const fn is_page_aligned(&self) -> bool {
        self.0.trailing_zeros() >= 12
    }

    #[must_use]
    pub const fn frame_index(&self) -> usize {
        (self.0 >> 12) as usize
    }
}

impl Step for Physical {
    fn steps_between(start: &Self, end: &Self) -> Option<usize> {
        end.0.checked_sub(start.0).map(|x| x as usize)
    }

    fn forward_checked(start: Self, count: usize) -> Option<Self> {
        let new = start.0.checked_add(count as u64)?;
        Physical::is_valid(new).then(|| Self::new(new))
    }

    fn backward_checked(start: Self, count: usize) -> Option<Self> {
        let new = start.0.checked_sub(count as u64)?;
        Physical::is_valid(new).then(|| Self::new(new))
    }
}

impl fmt::Debug for Physical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Physical({:#018x})", self.0)
    }
}

impl fmt::LowerHex for Physical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::Display for Physical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl From<Physical> for u64 {
    fn from(address: Physical) -> Self {
        address.0
    }
}

impl From<Physical> for usize {
    fn from(address: Physical) -> Self {
        address.0 as usize
    }
}

impl From<u64> for Physical {
    fn from(address: u64) -> Self {
        Self::new(address)
    }
}

impl From<usize> for Physical {
    fn from(address: usize) -> Self {
        Self::new(address as u64)
    }
}

impl From<Virtual> for Physical {
    fn from(addr: Virtual) -> Self {
        if addr.0 < 0xFFFF_8000_0000_0000 || addr.0 > 0xFFFF_8FFF_FFFF_FFFF {
            panic!("Cannot convert the virtual address {addr} to a physical address");
        }
        Self::new(addr.0 - 0xFFFF_8000_0000_0000)
    }
}

impl Add<u64> for Physical {
    type Output = Physical;
    fn add(self, rhs: u64) -> Self::Output {
        Self::new(self.0 + rhs)
    }
}

impl Add<usize> for Physical {
    type Output = Physical;
    fn add(self, rhs: usize) -> Self::Output {
        Self::new(self.0 + rhs as u64)
    }
}

impl Sub<Physical> for Physical {
    type Output = u64;
    fn sub(self, rhs: Physical) -> Self::Output {
        self.0 - rhs.0
    }
}

impl Sub<u64> for Physical {
    type Output = Physical;
    fn sub(self, rhs: u64) -> Self::Output {
        Self::new(self.0 - rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_round_trip() {
        let addr = Virtual::new(0x0000_7FFF_1234_5000);
        assert!(addr.is_user());
        assert_eq!(addr.page_offset(), 0);
    }

    #[test]
    fn kernel_half_detected() {
        let addr = Virtual::new(0xFFFF_8000_0010_0000);
        assert!(addr.is_kernel());
        assert!(!addr.is_user());
    }

    #[test]
    fn page_align() {
        let addr = Virtual::new(0x1000 + 0x123);
        assert_eq!(addr.page_align_down(), Virtual::new(0x1000));
        assert_eq!(addr.page_align_up(), Virtual::new(0x2000));
    }

    #[test]
    fn physical_frame_index_round_trip() {
        let phys = Physical::new(0x40_0000);
        let frame = frame::Frame::from_address(phys);
        assert_eq!(frame.address(), phys);
    }
}
