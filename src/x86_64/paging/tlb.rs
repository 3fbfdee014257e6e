//! TLB maintenance. Single-core: a "shootdown" is just a local
//! invalidation, since there are no other cores to notify.

use addr::Virtual;

use crate::x86_64::cpu;

/// Invalidates the TLB entry for `address` on this core.
pub fn shootdown(address: Virtual) {
    unsafe {
        cpu::invlpg(address.into());
    }
}
