//! One-time initialization that works before and after the scheduler starts.

use crate::backend::{Backend, SchedulerState};
use crate::config::ONCE_POLL_INTERVAL;
use crate::errors::FatalReason;
use crate::fatal;
use spin::Mutex;

/// Progress of a [`OnceGuard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OnceState {
    /// The routine has not been started
    Never = 0,
    /// Some caller is running the routine
    InProgress = 1,
    /// The routine has finished
    Done = 2,
}

/// Guard for a routine that must run exactly once.
///
/// Usually declared as a `static` next to the singleton it initializes.
///
/// ```ignore
/// static DCC_TABLES: OnceGuard = OnceGuard::new();
///
/// DCC_TABLES.run(runtime.backend(), build_tables);
/// ```
pub struct OnceGuard {
    state: Mutex<OnceState>,
}

impl OnceGuard {
    /// A guard whose routine has never run.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(OnceState::Never),
        }
    }

    /// Current state.
    pub fn state(&self) -> OnceState {
        *self.state.lock()
    }

    /// Whether the routine has completed.
    pub fn is_done(&self) -> bool {
        self.state() == OnceState::Done
    }

    /// Run `routine` unless it has already run or is running.
    ///
    /// Returns once the routine has completed, whichever caller ran it. With a
    /// running scheduler, callers that find the routine in progress sleep in
    /// [`ONCE_POLL_INTERVAL`] steps. Before the scheduler starts there can be
    /// no concurrent callers, so the routine runs inline; re-entering the
    /// same guard from inside its own routine is then fatal.
    pub fn run<B, F>(&self, backend: &B, routine: F)
    where
        B: Backend + ?Sized,
        F: FnOnce(),
    {
        if backend.scheduler_state() == SchedulerState::Running {
            self.run_scheduled(backend, routine);
        } else {
            self.run_unscheduled(routine);
        }
    }

    fn run_scheduled<B: Backend + ?Sized, F: FnOnce()>(&self, backend: &B, routine: F) {
        let mut state = self.state.lock();
        if *state == OnceState::Never {
            *state = OnceState::InProgress;
            // The routine runs unlocked so it may use other guarded services.
            drop(state);
            routine();
            state = self.state.lock();
            *state = OnceState::Done;
        }

        while *state == OnceState::InProgress {
            drop(state);
            backend.sleep(ONCE_POLL_INTERVAL);
            state = self.state.lock();
        }
    }

    fn run_unscheduled<F: FnOnce()>(&self, routine: F) {
        let current = self.state();
        match current {
            OnceState::Never => {
                *self.state.lock() = OnceState::InProgress;
                routine();
                *self.state.lock() = OnceState::Done;
            }
            OnceState::InProgress => fatal::die(FatalReason::RecursiveOnce),
            OnceState::Done => {}
        }
    }
}

impl Default for OnceGuard {
    fn default() -> Self {
        Self::new()
    }
}
