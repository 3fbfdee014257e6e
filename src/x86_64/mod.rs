//! Architecture-dependent code. Scoped to exactly what the virtual
//! memory subsystem needs to run on real hardware: control-register
//! access and the four-level paging hierarchy. A full kernel also
//! needs a GDT, IDT, PIC/APIC and a scheduler, but none of that is
//! part of the demand-paging core this crate hosts, so it is left out
//! rather than stubbed.

use macros::init;

pub mod cpu;
pub mod paging;

/// Architecture setup that does not need the memory manager.
///
/// # Safety
/// Touches raw control registers; must run once, early in boot.
#[init]
pub unsafe fn early_setup() {}

/// Architecture setup that needs the memory manager to already be
/// initialized.
///
/// # Safety
/// Must run once, after [`crate::memory::setup`].
#[init]
pub unsafe fn setup() {
    paging::setup();
}
