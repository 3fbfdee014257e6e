//! Requests sent to the Limine bootloader. Each `static` here is placed
//! in a section Limine scans at boot and fills in before the kernel's
//! entry point runs.

/// The request to the Limine bootloader to get a memory map.
pub static LIMINE_MEMMAP: limine::MemmapRequest = limine::MemmapRequest::new(0);

/// The request to the Limine bootloader to get a HHDM, mapping all
/// physical memory at a specific address (`0xFFFF_8000_0000_0000`).
pub static LIMINE_HHDM: limine::HhdmRequest = limine::HhdmRequest::new(0);

/// The request for bootloader-loaded modules (the root filesystem
/// image backing [`crate::fs`]).
pub static LIMINE_MODULES: limine::ModuleRequest = limine::ModuleRequest::new(0);
