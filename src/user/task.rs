//! The task registry: the `ThreadRegistry` collaborator the
//! demand-paging core resolves thread ids through. An `Identifier` +
//! global task-list pattern, simplified to this kernel's
//! single-address-space-per-task scope (no scheduler, no task states,
//! no kernel-only tasks).
//!
//! Tasks are `Box::leak`'d to `&'static Task` rather than kept behind
//! `Arc`: `ThreadRegistry::spt` must hand back a `&SupplementalPageTable`
//! that outlives the registry call without borrowing through a lock
//! guard, and a `&'static` reference satisfies that for free. The
//! tradeoff is that a task's memory is never reclaimed; this crate has
//! no process-exit path to reclaim it from anyway (see `DESIGN.md`).

use core::sync::atomic::{AtomicU64, Ordering};

use addr::user::UserVirtual;
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use mm::traits::ThreadRegistry;
use mm::{SupplementalPageTable, ThreadId};
use sync::Spinlock;

use super::vmm::area::{Access, Area, Flags, Type};
use crate::x86_64::paging::{Directory, PAGE_SIZE};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static TASKS: Spinlock<Vec<&'static Task>> = Spinlock::new(Vec::new());
static CURRENT: Spinlock<ThreadId> = Spinlock::new(ThreadId::new(0));

/// A single-threaded task: one page directory, one supplemental page
/// table, one set of mmap'd areas.
pub struct Task {
    id: ThreadId,
    directory: Spinlock<Directory>,
    spt: SupplementalPageTable,
    areas: Spinlock<BTreeMap<UserVirtual, Area>>,
}

impl Task {
    /// Creates a new task with a fresh address space and registers it.
    ///
    /// Every task starts with three areas already reserved: a
    /// null-pointer guard at the bottom of the address space and an
    /// "end of the world" guard at the top, both `Flags::PERMANENT` and
    /// zero-access (mirroring the teacher's own null-deref / SYSRET-bug
    /// mitigation — see `DESIGN.md`), and a `Flags::GROW_DOWN` stack
    /// area so `vmm::resolve_fault`'s stack-growth path has a real area
    /// to extend instead of a bare address heuristic.
    #[must_use]
    pub fn spawn() -> &'static Task {
        let id = ThreadId::new(NEXT_ID.fetch_add(1, Ordering::Relaxed));

        let null_guard = Area::builder()
            .range(UserVirtual::zero()..UserVirtual::from(PAGE_SIZE))
            .access(Access::empty())
            .flags(Flags::PERMANENT)
            .kind(Type::Anonymous)
            .build();
        let end_guard = Area::builder()
            .range(UserVirtual::second_last_aligned_page()..UserVirtual::last_aligned_page())
            .access(Access::empty())
            .flags(Flags::PERMANENT)
            .kind(Type::Anonymous)
            .build();
        let stack = Area::builder()
            .range(UserVirtual::from((crate::config::STACK_BASE - crate::config::STACK_SIZE) as usize)..UserVirtual::from(crate::config::STACK_BASE as usize))
            .access(Access::READ | Access::WRITE)
            .flags(Flags::GROW_DOWN)
            .kind(Type::Anonymous)
            .build();

        let mut areas = BTreeMap::new();
        areas.insert(null_guard.base(), null_guard);
        areas.insert(end_guard.base(), end_guard);
        areas.insert(stack.base(), stack);

        let task: &'static Task = Box::leak(Box::new(Task {
            id,
            directory: Spinlock::new(Directory::new()),
            spt: SupplementalPageTable::new(),
            areas: Spinlock::new(areas),
        }));
        TASKS.lock().push(task);
        task
    }

    #[must_use]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    #[must_use]
    pub fn spt(&self) -> &SupplementalPageTable {
        &self.spt
    }

    #[must_use]
    pub fn areas(&self) -> &Spinlock<BTreeMap<UserVirtual, Area>> {
        &self.areas
    }

    #[must_use]
    pub fn directory(&self) -> &Spinlock<Directory> {
        &self.directory
    }

    /// Marks this task as the one currently running, so any frame
    /// allocated or fault resolved from here on is attributed to it.
    pub fn enter(&'static self) {
        *CURRENT.lock() = self.id;
    }
}

/// Removes `tid` from the registry. Does not reclaim the task's
/// memory (see the module-level note) or tear down its SPT/swap
/// slots; a caller that needs that must do it before calling this.
pub fn remove(tid: ThreadId) {
    TASKS.lock().retain(|t| t.id() != tid);
}

/// Finds a live task by id.
#[must_use]
pub fn find(tid: ThreadId) -> Option<&'static Task> {
    TASKS.lock().iter().copied().find(|t| t.id() == tid)
}

/// The `ThreadRegistry` adapter handed to the demand-paging core. Unit
/// struct: all of its state lives in the module statics above.
pub struct Registry;

impl ThreadRegistry for Registry {
    type Dir = Directory;

    fn with_page_directory<R>(&self, tid: ThreadId, f: impl FnOnce(&mut Directory) -> R) -> Option<R> {
        find(tid).map(|task| f(&mut task.directory.lock()))
    }

    fn spt(&self, tid: ThreadId) -> Option<&SupplementalPageTable> {
        find(tid).map(Task::spt)
    }

    fn current(&self) -> ThreadId {
        *CURRENT.lock()
    }
}
