//! Backend for targets with a preemptive priority scheduler.
//!
//! The RTOS itself lives outside this crate. A board connects it through
//! [`Port`], which exposes the handful of kernel calls the shim needs: task
//! creation, suspend-all, stack high-water marks, the tick counter and
//! delays.

use super::{Backend, BackendKind, NativeHandle, NativeSpawn, SchedulerState, UnitBody};
use crate::errors::SpawnError;
use crate::time::TimeSource;
use core::time::Duration;

/// Native kernel interface of a scheduled target.
///
/// # Contract
///
/// - `suspend_all`/`resume_all` nest and must be callable before the scheduler
///   starts (they are then no-ops).
/// - A task created by `create_task` runs `body` once and deletes itself when
///   `body` returns.
/// - `start_scheduler` never returns.
pub trait Port: Send + Sync + 'static {
    /// Kernel task handle.
    type Task: NativeHandle;

    /// Number of priority levels (`configMAX_PRIORITIES` style).
    const MAX_PRIORITIES: u8;

    /// Scheduler tick rate in Hz.
    const TICK_RATE_HZ: u32;

    /// Size of one stack word in bytes.
    const STACK_WORD: usize = 4;

    /// Current scheduler state.
    fn scheduler_state(&self) -> SchedulerState;

    /// Suspend all other tasks.
    fn suspend_all(&self);

    /// Resume tasks suspended by [`Port::suspend_all`].
    fn resume_all(&self);

    /// Create a task with a stack of `stack_words` words.
    fn create_task(
        &self,
        name: &str,
        priority: u8,
        stack_words: usize,
        body: UnitBody,
    ) -> Result<Self::Task, SpawnError>;

    /// Minimum number of free stack words the task has had so far.
    fn stack_high_water_mark(&self, task: Self::Task) -> usize;

    /// Ticks since the scheduler started.
    fn tick_count(&self) -> u64;

    /// Sub-tick correction from a hardware counter, in nanoseconds.
    fn partial_tick_nanos(&self) -> i64 {
        0
    }

    /// Block the calling task for at least `ticks` ticks.
    fn delay(&self, ticks: u64);

    /// Yield to other ready tasks of the same priority.
    fn yield_now(&self);

    /// Start dispatching tasks.
    fn start_scheduler(&self) -> !;

    /// The kernel's idle task, once it exists.
    fn idle_task(&self) -> Option<Self::Task> {
        None
    }

    /// The kernel's timer daemon task, if timers are enabled.
    fn timer_task(&self) -> Option<Self::Task> {
        None
    }

    /// Name the kernel gave a task, when it keeps one.
    fn task_name(&self, _task: Self::Task) -> Option<&'static str> {
        None
    }
}

/// Timer daemon name for kernels that do not report one.
pub const TIMER_TASK_NAME: &str = "Tmr Svc";

/// Idle task name for kernels that do not report one.
pub const IDLE_TASK_NAME: &str = "IDLE";

/// Execution backend over an RTOS [`Port`].
pub struct Scheduled<P: Port> {
    port: P,
}

impl<P: Port> Scheduled<P> {
    /// Nanoseconds per scheduler tick.
    pub const NANOS_PER_TICK: i64 = 1_000_000_000 / P::TICK_RATE_HZ as i64;

    /// Wrap a kernel port.
    pub const fn new(port: P) -> Self {
        Self { port }
    }

    /// The wrapped port.
    pub fn port(&self) -> &P {
        &self.port
    }

    fn duration_to_ticks(duration: Duration) -> u64 {
        let nanos = duration.as_nanos();
        let per_tick = Self::NANOS_PER_TICK as u128;
        // Round up so a sleep never returns early.
        let ticks = (nanos + per_tick - 1) / per_tick;
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }
}

impl<P: Port> TimeSource for Scheduled<P> {
    fn raw_nanos(&self) -> i64 {
        let ticks = self.port.tick_count() as i64;
        ticks
            .wrapping_mul(Self::NANOS_PER_TICK)
            .wrapping_add(self.port.partial_tick_nanos())
    }
}

impl<P: Port> Backend for Scheduled<P> {
    type Native = P::Task;

    fn kind(&self) -> BackendKind {
        BackendKind::Scheduled
    }

    fn max_priorities(&self) -> u8 {
        P::MAX_PRIORITIES
    }

    fn scheduler_state(&self) -> SchedulerState {
        self.port.scheduler_state()
    }

    fn suspend_all(&self) {
        self.port.suspend_all();
    }

    fn resume_all(&self) {
        self.port.resume_all();
    }

    fn create_unit(&self, spawn: &NativeSpawn<'_>, body: UnitBody) -> Result<Self::Native, SpawnError> {
        let words = spawn.stack_size / P::STACK_WORD;
        self.port.create_task(spawn.name, spawn.priority, words, body)
    }

    fn stack_unused(&self, unit: Self::Native) -> Option<usize> {
        Some(self.port.stack_high_water_mark(unit) * P::STACK_WORD)
    }

    fn sleep(&self, duration: Duration) {
        self.port.delay(Self::duration_to_ticks(duration));
    }

    fn yield_now(&self) {
        self.port.yield_now();
    }

    fn system_units(&self) -> heapless::Vec<(Self::Native, &'static str), 2> {
        let mut units = heapless::Vec::new();
        if let Some(task) = self.port.timer_task() {
            let _ = units.push((task, self.port.task_name(task).unwrap_or(TIMER_TASK_NAME)));
        }
        if let Some(task) = self.port.idle_task() {
            let _ = units.push((task, self.port.task_name(task).unwrap_or(IDLE_TASK_NAME)));
        }
        units
    }

    fn start_scheduler(&self) -> ! {
        self.port.start_scheduler()
    }
}
