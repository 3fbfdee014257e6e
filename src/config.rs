//! Kernel-wide tunables, in the style of bare `pub const` items rather
//! than a parsed configuration file (there is no persistent storage to
//! read one from at this point in boot).

/// The maximal length of a path that a task can pass to the kernel.
pub const MAX_PATH: usize = 4096;

/// The length of buffers used to transfer data.
pub const BUFFERED_LEN: usize = 256;

/// The number of page-sized slots available on the swap device.
pub const SWAP_SLOTS: usize = 4096;

/// The base virtual address of every task's initial stack. Mirrors the
/// single-address-space-per-task simplification: there is no user
/// memory manager sophisticated enough yet to place stacks
/// dynamically.
pub const STACK_BASE: u64 = 0x0000_7FFF_FFFF_0000;

/// The initial size of a task's stack area, before any growth.
pub const STACK_SIZE: u64 = 64 * 1024;

/// How far below `STACK_BASE` an unmapped fault is still plausibly a
/// stack extension rather than a wild pointer.
pub const MAX_STACK_SIZE: u64 = 8 * 1024 * 1024;
