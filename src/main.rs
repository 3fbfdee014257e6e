#![no_std]
#![no_main]
#![allow(dead_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

#[cfg(not(target_arch = "x86_64"))]
compile_error!("this kernel only supports x86_64 computers");

extern crate alloc;

use macros::init;

#[cfg(feature = "qemu")]
pub mod emulator;
pub mod config;
pub mod fs;
pub mod io;
pub mod limine;
pub mod logger;
pub mod memory;
pub mod panic;
pub mod serial;
pub mod user;
pub mod x86_64;

/// Why the kernel stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stop {
    Success = 1,
    Failure = 2,
}

/// Stops the kernel. Under the `qemu` feature this exits the emulator
/// with `code`; otherwise it halts the CPU, since there is nothing to
/// report the exit code to.
///
/// # Safety
/// Exiting QEMU this way is only valid when actually running under
/// QEMU with the matching debug-exit device configured.
#[allow(unused_variables)]
pub unsafe fn stop(code: Stop) -> ! {
    cfg_if::cfg_if! {
        if #[cfg(feature = "qemu")] {
            emulator::qemu::exit(code as u32);
        } else {
            x86_64::cpu::freeze();
        }
    }
}

/// The kernel's entry point, called directly by the bootloader with no
/// libc startup in between.
///
/// Brings up just enough of a full kernel to exercise demand paging
/// end to end: a logger, the physical frame allocator and heap, the
/// boot-module filesystem, paging, and one bootstrap task with its own
/// address space. There is no scheduler, no syscalls and no SMP
/// bring-up here — this crate's scope stops at the virtual memory
/// subsystem.
///
/// # Safety
/// Runs once, in ring 0, before any other kernel code, with nothing
/// else touching memory concurrently.
#[init]
#[no_mangle]
pub unsafe extern "C" fn _start() -> ! {
    logger::setup();

    x86_64::early_setup();
    memory::setup();
    fs::setup();
    x86_64::setup();
    user::setup();

    log::info!("kernel booted successfully");

    user::enter_userland();

    stop(Stop::Success);
}
