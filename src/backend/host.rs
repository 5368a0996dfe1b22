//! Host-threaded backend for the desktop simulation build.
//!
//! Units map onto detached native threads. The host kernel is always
//! scheduling, so there is no "not started" phase; the global critical
//! section is a process-wide mutex rather than a real scheduler suspend.

use super::{Backend, BackendKind, NativeSpawn, SchedulerState, UnitBody};
use crate::errors::SpawnError;
use crate::time::{SteadyClock, TimeSource};
use core::time::Duration;
use portable_atomic::{AtomicUsize, Ordering};
use spin::mutex::SpinMutex;
use std::thread;

/// Smallest stack requested from the host, whatever the unit asked for.
///
/// Embedded stack budgets are far too small for host library code.
pub const HOST_MIN_STACK: usize = 64 * 1024;

/// Priority levels reported to the portable layer.
pub const HOST_PRIORITIES: u8 = 32;

/// Native host threads.
pub struct HostThreads {
    critical: SpinMutex<()>,
    next_handle: AtomicUsize,
}

impl HostThreads {
    /// Create the host backend.
    pub const fn new() -> Self {
        Self {
            critical: SpinMutex::new(()),
            next_handle: AtomicUsize::new(1),
        }
    }
}

impl Default for HostThreads {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for HostThreads {
    fn raw_nanos(&self) -> i64 {
        SteadyClock::new().raw_nanos()
    }
}

impl Backend for HostThreads {
    type Native = usize;

    fn kind(&self) -> BackendKind {
        BackendKind::HostThreads
    }

    fn max_priorities(&self) -> u8 {
        HOST_PRIORITIES
    }

    fn scheduler_state(&self) -> SchedulerState {
        SchedulerState::Running
    }

    fn suspend_all(&self) {
        // Held until resume_all; the guard cannot outlive this call.
        core::mem::forget(self.critical.lock());
    }

    fn resume_all(&self) {
        // SAFETY: only called to close a section opened by suspend_all,
        // whose guard was forgotten while still holding the lock.
        unsafe { self.critical.force_unlock() };
    }

    fn create_unit(&self, spawn: &NativeSpawn<'_>, body: UnitBody) -> Result<Self::Native, SpawnError> {
        log::trace!(
            "host unit {}: priority hint {} ignored by host scheduler",
            spawn.name,
            spawn.priority
        );

        let stack = spawn.stack_size.max(HOST_MIN_STACK);
        let result = thread::Builder::new()
            .name(spawn.name.into())
            .stack_size(stack)
            .spawn(body);

        match result {
            // Dropping the join handle detaches the thread.
            Ok(_detached) => Ok(self.next_handle.fetch_add(1, Ordering::Relaxed)),
            Err(err) => Err(SpawnError::Native(err.raw_os_error().unwrap_or(11))),
        }
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }

    fn yield_now(&self) {
        thread::yield_now();
    }

    fn start_scheduler(&self) -> ! {
        loop {
            thread::park();
        }
    }
}
