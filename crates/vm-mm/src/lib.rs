//! Demand-paging virtual memory core: the frame table, the eviction
//! engine, the per-process supplemental page table (SPT), the page
//! loader and the stack grower.
//!
//! This crate models the hardware page directory, the physical frame
//! allocator, the swap device, the backing filesystem and the task
//! registry as narrow traits (see [`traits`]) rather than depending on
//! the real `x86_64` kernel crate, so the whole subsystem can be driven
//! against lightweight in-memory fakes in `#[cfg(test)]` without
//! hardware. The kernel crate wires the real implementations in.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod error;
pub mod eviction;
pub mod frame_table;
pub mod ids;
pub mod loader;
pub mod spt;
pub mod spte;
pub mod stack;
pub mod traits;

pub use error::{EvictError, LoadError, MapError, SptError, SwapError};
pub use eviction::EvictionEngine;
pub use frame_table::{FrameTable, FrameTableEntry};
pub use ids::{FileHandle, SwapSlot, ThreadId};
pub use spt::SupplementalPageTable;
pub use spte::{BackingKind, FileBackingInfo, Spte, SwapInfo};
pub use stack::grow_stack;
pub use traits::{FileBacking, PageDirectory, PhysFrameSource, SwapDevice, ThreadRegistry};

#[cfg(test)]
pub(crate) mod test_support;
