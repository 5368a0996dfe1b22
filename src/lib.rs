#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![forbid(unreachable_pub)]

//! Portable runtime shim for the command station firmware.
//!
//! The same application logic runs unmodified on three classes of target:
//!
//! - **Scheduled**: a preemptive priority RTOS reached through a [`Port`]
//!   (static memory pools, scheduler-suspend critical sections, idle hook).
//! - **Host threads**: the desktop simulation build, mapping units onto
//!   native OS threads (`std-shim` feature).
//! - **Bare**: single-threaded targets with no scheduler at all.
//!
//! # Features
//!
//! - `std-shim`: host-threaded backend and std clock sources (default)
//!
//! # Quick Start
//!
//! ```ignore
//! use station_rt::{Bootstrap, HostThreads, NoHooks, Runtime, RuntimeConfig};
//!
//! fn appl_main(args: &[&str]) -> i32 {
//!     let _ = args;
//!     0
//! }
//!
//! fn main() {
//!     let runtime = Runtime::leak(HostThreads::new(), RuntimeConfig::default());
//!     std::process::exit(Bootstrap::new(runtime, &NoHooks).run(appl_main));
//! }
//! ```
//!
//! # Layering
//!
//! The clock and the heap are stateless services any unit may call. The
//! runtime owns the unit registry; the health monitor consumes it from the
//! idle task. Everything above [`backend`] is written against the
//! [`Backend`] trait only.

pub mod backend;
pub mod boot;
pub mod config;
pub mod errors;
pub mod fatal;
pub mod health;
pub mod mem;
pub mod runtime;
pub mod sync;
pub mod thread;
pub mod time;

#[cfg(test)]
mod tests;

#[cfg(all(feature = "std-shim", not(test)))]
extern crate std;

// `serial_test`'s `#[serial]` expands to `vec!`, which needs std's macros in scope.
#[cfg(test)]
#[macro_use]
extern crate std;

extern crate alloc;

// Panic handler for bare-metal
#[cfg(all(not(test), not(feature = "std-shim"), target_os = "none"))]
use core::panic::PanicInfo;

#[cfg(all(not(test), not(feature = "std-shim"), target_os = "none"))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    log::error!("panic: {}", info);
    loop {
        core::hint::spin_loop();
    }
}

// ============================================================================
// Public API
// ============================================================================

// Execution backends
pub use backend::{Backend, BackendKind, Bare, NativeHandle, Port, Scheduled, SchedulerState};
#[cfg(feature = "std-shim")]
pub use backend::HostThreads;

// Bootstrap
pub use boot::{AppMain, BoardHooks, BootPhase, Bootstrap, NoHooks};

// Configuration
pub use config::RuntimeConfig;

// Errors
pub use errors::{FatalReason, SpawnError, ThreadResult};

// Diagnostics
pub use fatal::Death;
pub use health::{CycleReport, HealthMonitor};

// Memory
pub use mem::{HeapLock, HeapRegion, HeapStats, RegionHeap, SpinHeapLock, SuspendLock};

// Runtime and threads
pub use runtime::{CriticalSection, Runtime};
pub use thread::{UnitBuilder, UnitContext, UnitId, UnitName, UnitParams, UnitReport};

// One-time initialization
pub use sync::{OnceGuard, OnceState};

// Time
pub use time::{now_nanoseconds, MonotonicClock, TimeSource};
