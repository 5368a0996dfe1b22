//! Bootstrap sequencing.
//!
//! On scheduled targets the process entry point initializes the hardware,
//! launches the main unit and hands control to the scheduler for good; the
//! application runs inside the main unit and must never return. Host and
//! bare targets have no scheduler to start: the application runs on the
//! calling thread and its exit status is handed back.

use crate::backend::{Backend, BackendKind};
use crate::config::MAIN_THREAD_NAME;
use crate::errors::{FatalReason, SpawnError};
use crate::fatal;
use crate::runtime::Runtime;
use crate::time;

/// Application entry point: `argv` in, exit status out.
pub type AppMain = fn(&[&str]) -> i32;

/// Board-specific hooks called during bootstrap and from the idle task.
///
/// Every hook defaults to doing nothing.
pub trait BoardHooks: Sync {
    /// Bring up clocks, pins and peripherals. Runs before anything else.
    fn hw_init(&self) {}

    /// Late initialization, once the scheduler and library units run.
    fn hw_postinit(&self) {}

    /// Called from the idle task before each health cycle.
    fn idle(&self) {}
}

/// Board without hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl BoardHooks for NoHooks {}

/// Progress of the bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum BootPhase {
    HardwareInit = 0,
    RuntimeStart = 1,
    MainThreadLaunch = 2,
    HardwarePostInit = 3,
    ApplicationRunning = 4,
}

impl BootPhase {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => BootPhase::HardwareInit,
            1 => BootPhase::RuntimeStart,
            2 => BootPhase::MainThreadLaunch,
            3 => BootPhase::HardwarePostInit,
            _ => BootPhase::ApplicationRunning,
        }
    }
}

/// Runs the bootstrap sequence for one runtime.
pub struct Bootstrap<B: Backend, H: BoardHooks + 'static> {
    runtime: &'static Runtime<B>,
    hooks: &'static H,
}

impl<B: Backend, H: BoardHooks + 'static> Bootstrap<B, H> {
    pub fn new(runtime: &'static Runtime<B>, hooks: &'static H) -> Self {
        Self { runtime, hooks }
    }

    /// Phase reached so far.
    pub fn phase(&self) -> BootPhase {
        self.runtime.boot_phase()
    }

    /// Boot and run `app` with `argv` set to the configured `argv0`.
    ///
    /// Never returns on scheduled targets.
    pub fn run(&self, app: AppMain) -> i32 {
        let argv0 = self.runtime.config().argv0;
        self.run_with_args(app, &[argv0])
    }

    /// Boot and run `app` with the given arguments.
    ///
    /// Scheduled targets ignore `args` and pass `argv0` alone, as there is no
    /// command line on the device.
    pub fn run_with_args(&self, app: AppMain, args: &[&str]) -> i32 {
        self.runtime.install_hooks(self.hooks);
        match self.runtime.backend().kind() {
            BackendKind::Scheduled => self.run_scheduled(app),
            BackendKind::HostThreads | BackendKind::Bare => self.run_direct(app, args),
        }
    }

    fn run_scheduled(&self, app: AppMain) -> ! {
        let runtime = self.runtime;
        let hooks = self.hooks;

        hooks.hw_init();

        runtime.set_phase(BootPhase::RuntimeStart);
        time::install_source(runtime.backend());

        runtime.set_phase(BootPhase::MainThreadLaunch);
        let config = *runtime.config();
        let launched = runtime.spawn(
            Some(MAIN_THREAD_NAME),
            config.main_priority.unwrap_or(0),
            config.main_stack_size,
            move |_| main_unit(runtime, hooks, app),
        );
        if let Err(err) = launched {
            log::error!("boot: cannot launch {}: {}", MAIN_THREAD_NAME, err);
            fatal::die(match err {
                SpawnError::OutOfMemory => FatalReason::OutOfMemory {
                    requested: config.main_stack_size,
                },
                other => FatalReason::MainLaunchFailed(other),
            });
        }

        runtime.backend().start_scheduler()
    }

    fn run_direct(&self, app: AppMain, args: &[&str]) -> i32 {
        let runtime = self.runtime;
        runtime.set_phase(BootPhase::RuntimeStart);
        runtime.backend().platform_setup();
        time::install_source(runtime.backend());

        runtime.set_phase(BootPhase::ApplicationRunning);
        let status = app(args);
        log::debug!("boot: application exited with status {}", status);
        status
    }
}

fn main_unit<B: Backend, H: BoardHooks>(runtime: &'static Runtime<B>, hooks: &'static H, app: AppMain) {
    runtime.register_system_units();

    // Library units spawned during init get to run ahead of main.
    runtime.backend().yield_now();

    runtime.set_phase(BootPhase::HardwarePostInit);
    hooks.hw_postinit();

    runtime.set_phase(BootPhase::ApplicationRunning);
    let argv0 = runtime.config().argv0;
    let status = app(&[argv0]);

    log::error!("boot: application returned {} on a scheduled target", status);
    fatal::die(FatalReason::ApplicationReturned)
}
