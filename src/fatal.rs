//! Fatal-stop path.
//!
//! Heap exhaustion, stack overflow and a returning application all end here.
//! The minimal diagnostic state is recorded first so a debugger (or the host
//! test harness) can see what happened, then the installed halt routine runs
//! and never comes back.

use crate::errors::FatalReason;
use crate::thread::{bounded_name, UnitName};
use core::panic::Location;
use portable_atomic::{AtomicUsize, Ordering};
use spin::Mutex;

/// What killed the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Death {
    /// Why the system stopped
    pub reason: FatalReason,
    /// Raw native handle of the offending unit, if one is known
    pub unit_handle: Option<usize>,
    /// Name of the offending unit, if one is known
    pub unit_name: Option<UnitName>,
    /// Source file of the point of death
    pub file: &'static str,
    /// Source line of the point of death
    pub line: u32,
}

/// Routine that stops the system. Boards typically blink an error code.
pub type HaltFn = fn(&Death) -> !;

static LAST_DEATH: Mutex<Option<Death>> = Mutex::new(None);
static DEATHS: AtomicUsize = AtomicUsize::new(0);
static HALT: Mutex<HaltFn> = Mutex::new(default_halt as HaltFn);

/// Replace the halt routine, returning the one it replaces.
pub fn set_halt(halt: HaltFn) -> HaltFn {
    core::mem::replace(&mut *HALT.lock(), halt)
}

/// Most recent death record.
pub fn last_death() -> Option<Death> {
    LAST_DEATH.lock().clone()
}

/// Number of times the fatal path has been entered in this process.
pub fn death_count() -> usize {
    DEATHS.load(Ordering::Acquire)
}

/// Stop the system with no particular unit to blame.
#[track_caller]
pub fn die(reason: FatalReason) -> ! {
    let location = Location::caller();
    halt(Death {
        reason,
        unit_handle: None,
        unit_name: None,
        file: location.file(),
        line: location.line(),
    })
}

/// Stop the system, blaming one unit.
#[track_caller]
pub fn die_in_unit(reason: FatalReason, unit_handle: usize, unit_name: &str) -> ! {
    let location = Location::caller();
    halt(Death {
        reason,
        unit_handle: Some(unit_handle),
        unit_name: Some(bounded_name(unit_name)),
        file: location.file(),
        line: location.line(),
    })
}

fn halt(death: Death) -> ! {
    log::error!(
        "fatal: {} (unit {:?}) at {}:{}",
        death.reason,
        death.unit_name.as_deref(),
        death.file,
        death.line
    );

    *LAST_DEATH.lock() = Some(death.clone());
    DEATHS.fetch_add(1, Ordering::AcqRel);

    let halt = *HALT.lock();
    halt(&death)
}

#[cfg(feature = "std-shim")]
fn default_halt(death: &Death) -> ! {
    panic!("fatal: {}", death.reason)
}

#[cfg(not(feature = "std-shim"))]
fn default_halt(_death: &Death) -> ! {
    loop {
        core::hint::spin_loop();
    }
}
