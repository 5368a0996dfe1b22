//! Health monitoring from the idle task.
//!
//! Each cycle first removes the entries of units that have exited, then
//! refreshes the unused-stack figure of every unit still running. Every entry gets
//! its own short critical section so the scheduler resumes between entries.

use crate::backend::Backend;
use crate::errors::FatalReason;
use crate::fatal;
use crate::runtime::Runtime;

/// Outcome of one health cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Exited units removed from the registry
    pub reclaimed: usize,
    /// Entries whose unused stack was refreshed
    pub scanned: usize,
}

/// Registry maintenance run by the idle task.
pub struct HealthMonitor;

impl HealthMonitor {
    /// Run one sweep and stack-usage pass over `runtime`'s registry.
    pub fn run_cycle<B: Backend>(runtime: &Runtime<B>) -> CycleReport {
        let reclaimed = runtime.with_registry(|registry| registry.sweep());
        if reclaimed > 0 {
            log::debug!("health: reclaimed {} exited unit(s)", reclaimed);
        }

        let backend = runtime.backend();
        let slots = runtime.with_registry(|registry| registry.slot_count());
        let mut scanned = 0;
        for index in 0..slots {
            let updated = runtime.with_registry(|registry| {
                registry.update_unused(index, |native| backend.stack_unused(native))
            });
            if updated {
                scanned += 1;
            }
        }

        CycleReport { reclaimed, scanned }
    }
}

/// Handle a stack overflow reported by the scheduler.
///
/// Records the offending unit's raw handle and name, then stops the system.
#[track_caller]
pub fn stack_overflow(raw_handle: usize, name: &str) -> ! {
    fatal::die_in_unit(FatalReason::StackOverflow, raw_handle, name)
}
