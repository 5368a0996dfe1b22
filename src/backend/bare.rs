//! Backend for targets with no threads at all.
//!
//! There is exactly one flow of control, so critical sections are empty and
//! unit creation is refused. Time comes from whatever counter the board
//! polls.

use super::{Backend, BackendKind, NativeSpawn, SchedulerState, UnitBody};
use crate::errors::SpawnError;
use crate::time::TimeSource;
use core::time::Duration;

/// Single-threaded backend over a board time source.
pub struct Bare<S: TimeSource> {
    source: S,
}

impl<S: TimeSource> Bare<S> {
    /// Create the backend around a time source.
    pub const fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: TimeSource + Send + 'static> TimeSource for Bare<S> {
    fn raw_nanos(&self) -> i64 {
        self.source.raw_nanos()
    }
}

impl<S: TimeSource + Send + 'static> Backend for Bare<S> {
    type Native = usize;

    fn kind(&self) -> BackendKind {
        BackendKind::Bare
    }

    fn max_priorities(&self) -> u8 {
        2
    }

    fn scheduler_state(&self) -> SchedulerState {
        SchedulerState::NotStarted
    }

    fn suspend_all(&self) {}

    fn resume_all(&self) {}

    fn create_unit(&self, spawn: &NativeSpawn<'_>, _body: UnitBody) -> Result<Self::Native, SpawnError> {
        log::warn!("bare target cannot run unit {}", spawn.name);
        Err(SpawnError::NotSupported)
    }

    fn sleep(&self, duration: Duration) {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        let deadline = self.source.raw_nanos().saturating_add(nanos);
        while self.source.raw_nanos() < deadline {
            core::hint::spin_loop();
        }
    }
}
