//! Emulator-only escape hatches, compiled in behind the `qemu` feature
//! so a real-hardware build never links code that pokes a debug-exit
//! port.

pub mod qemu;
