//! Synchronization primitives for the kernel. Currently just re-exports
//! from the `spin` crate under names that match the kernel's lock
//! vocabulary (`FT_LOCK`, `EVICT_LOCK`, per-task SPT locks); kept as its
//! own crate so the implementation can later be swapped for something
//! ticket-based without touching call sites.
#![no_std]

pub use spin::*;

pub type Spinlock<T> = spin::Mutex<T>;
pub type Lazy<T> = spin::Lazy<T>;
pub type Once<T> = spin::Once<T>;
