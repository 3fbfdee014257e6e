//! The userland bring-up: tasks and their virtual memory areas. This
//! crate's scope stops at the demand-paging subsystem, so there is no
//! scheduler, no syscall dispatch and no ELF loader here — `setup`
//! brings up exactly enough of a single task to exercise
//! `vmm::mmap`/`resolve_fault` end to end.

use macros::init;

pub mod task;
pub mod vmm;

/// Creates the kernel's one bootstrap task and switches to its address
/// space.
///
/// # Safety
/// Must run once, after [`crate::x86_64::setup`].
#[init]
pub unsafe fn setup() {
    let bootstrap = task::Task::spawn();
    bootstrap.enter();
    bootstrap.directory().lock().root.set_current();
    log::info!("user: bootstrap task {} created", bootstrap.id());
}

/// Where a full kernel would load and jump to the init program's ELF
/// image in ring 3. Out of scope here (no ELF loader, no ring
/// transition); left as the named hook so `main.rs`'s boot sequence
/// still reads top to bottom as a real one would.
pub fn enter_userland() {
    log::info!("user: no ELF loader in this build, staying in ring 0");
}
