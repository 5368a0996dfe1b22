//! Execution backend abstraction.
//!
//! This module provides a unified interface over the native execution
//! facilities of each supported target class. Everything else in the crate
//! is written against [`Backend`] only; the concrete variant is chosen when
//! the board names its runtime type.

use crate::errors::SpawnError;
use crate::time::TimeSource;
use alloc::boxed::Box;
use core::fmt::Debug;
use core::time::Duration;

pub mod bare;
#[cfg(feature = "std-shim")]
pub mod host;
pub mod scheduled;

pub use bare::Bare;
#[cfg(feature = "std-shim")]
pub use host::HostThreads;
pub use scheduled::{Port, Scheduled, IDLE_TASK_NAME, TIMER_TASK_NAME};

/// Work handed to a native unit. Returns when the unit's entry function does.
pub type UnitBody = Box<dyn FnOnce() + Send + 'static>;

/// Target class of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Preemptive priority scheduler with suspend-all critical sections
    Scheduled,
    /// Native host threads (desktop simulation)
    HostThreads,
    /// No threads, no scheduler
    Bare,
}

/// Whether a scheduler is dispatching units right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Static construction time: no concurrency can exist yet
    NotStarted,
    /// Units are being dispatched
    Running,
    /// A suspend-all critical section is active
    Suspended,
}

/// Opaque handle of a native execution unit.
pub trait NativeHandle: Copy + Eq + Debug + Send + Sync + 'static {
    /// Raw value recorded in diagnostics.
    fn as_raw(self) -> usize;
}

impl NativeHandle for usize {
    fn as_raw(self) -> usize {
        self
    }
}

/// Normalized parameters for native unit creation.
#[derive(Debug, Clone, Copy)]
pub struct NativeSpawn<'a> {
    /// Unit name, already bounded to [`crate::config::MAX_NAME_LEN`]
    pub name: &'a str,
    /// Priority in `1..max_priorities()`
    pub priority: u8,
    /// Stack size in bytes, never zero
    pub stack_size: usize,
}

/// Execution backend trait.
///
/// Each target class implements this once. The backend is also the time
/// source the process-wide monotonic clock reads after bootstrap.
pub trait Backend: TimeSource + Send + Sync + 'static {
    /// Native unit handle type.
    type Native: NativeHandle;

    /// Target class of this backend.
    fn kind(&self) -> BackendKind;

    /// Number of priority levels; valid unit priorities are `1..max`.
    fn max_priorities(&self) -> u8;

    /// Current scheduler state.
    fn scheduler_state(&self) -> SchedulerState;

    /// Enter the global critical section.
    ///
    /// On scheduled targets this halts every other unit. Must be paired with
    /// [`Backend::resume_all`]; prefer [`crate::runtime::CriticalSection`].
    fn suspend_all(&self);

    /// Leave the global critical section.
    fn resume_all(&self);

    /// Create a detached native unit running `body`.
    ///
    /// The native unit ends when `body` returns; it is never joined.
    fn create_unit(&self, spawn: &NativeSpawn<'_>, body: UnitBody) -> Result<Self::Native, SpawnError>;

    /// Bytes of stack the unit has never touched, if the backend can tell.
    fn stack_unused(&self, _unit: Self::Native) -> Option<usize> {
        None
    }

    /// Put the calling unit to sleep.
    fn sleep(&self, duration: Duration);

    /// Let other ready units run.
    fn yield_now(&self) {}

    /// Units the backend creates on its own (idle task, timer daemon).
    fn system_units(&self) -> heapless::Vec<(Self::Native, &'static str), 2> {
        heapless::Vec::new()
    }

    /// Platform setup done before the application runs on unscheduled paths.
    fn platform_setup(&self) {}

    /// Hand the boot context over to the scheduler.
    ///
    /// Backends without a scheduler to start just keep the caller asleep.
    fn start_scheduler(&self) -> ! {
        loop {
            self.sleep(Duration::from_secs(1));
        }
    }
}
