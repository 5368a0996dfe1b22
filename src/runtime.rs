//! Runtime handle that owns the unit registry.
//!
//! This module provides the `Runtime` struct that coordinates unit creation,
//! reclamation and diagnostics on top of one execution backend.

use crate::backend::{Backend, BackendKind, NativeSpawn, UnitBody};
use crate::boot::{BoardHooks, BootPhase};
use crate::config::RuntimeConfig;
use crate::errors::ThreadResult;
use crate::health::{CycleReport, HealthMonitor};
use crate::thread::{
    auto_name, bounded_name, normalize_priority, normalize_stack, Registry, UnitContext, UnitId, UnitName,
    UnitParams, UnitReport,
};
use alloc::boxed::Box;
use alloc::vec::Vec;
use portable_atomic::{AtomicU8, AtomicUsize, Ordering};

/// Guard for the backend's global critical section.
///
/// Suspends on creation and resumes on drop. Not reentrant on every
/// backend, so never hold two at once.
pub struct CriticalSection<'a, B: Backend> {
    backend: &'a B,
}

impl<'a, B: Backend> CriticalSection<'a, B> {
    /// Enter the critical section of `backend`.
    pub fn enter(backend: &'a B) -> Self {
        backend.suspend_all();
        Self { backend }
    }
}

impl<B: Backend> Drop for CriticalSection<'_, B> {
    fn drop(&mut self) {
        self.backend.resume_all();
    }
}

/// Main runtime handle.
///
/// Units capture a `&'static Runtime` so they can deregister themselves on
/// exit; declare it as a `static` on embedded boards or use
/// [`Runtime::leak`] on the host.
///
/// # Type Parameters
///
/// * `B` - Execution backend of the target
pub struct Runtime<B: Backend> {
    /// Execution backend
    backend: B,
    /// Unit registry, only touched inside a critical section
    registry: spin::Mutex<Registry<B::Native>>,
    /// Counter behind auto-generated names
    name_counter: AtomicUsize,
    /// Board configuration
    config: RuntimeConfig,
    /// Board hooks, installed by the bootstrap
    hooks: spin::Once<&'static dyn BoardHooks>,
    /// Current bootstrap phase
    phase: AtomicU8,
}

impl<B: Backend> Runtime<B> {
    /// Create a runtime over `backend`.
    pub const fn new(backend: B, config: RuntimeConfig) -> Self {
        Self {
            backend,
            registry: spin::Mutex::new(Registry::new()),
            name_counter: AtomicUsize::new(0),
            config,
            hooks: spin::Once::new(),
            phase: AtomicU8::new(BootPhase::HardwareInit as u8),
        }
    }

    /// Create a runtime that lives for the rest of the program.
    pub fn leak(backend: B, config: RuntimeConfig) -> &'static Self {
        Box::leak(Box::new(Self::new(backend, config)))
    }

    /// The execution backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The board configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Enter the global critical section.
    pub fn critical_section(&self) -> CriticalSection<'_, B> {
        CriticalSection::enter(&self.backend)
    }

    /// Run `f` on the registry inside a critical section.
    pub fn with_registry<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut Registry<B::Native>) -> R,
    {
        let _cs = self.critical_section();
        let mut registry = self.registry.lock();
        f(&mut registry)
    }

    pub(crate) fn install_hooks(&self, hooks: &'static dyn BoardHooks) {
        self.hooks.call_once(|| hooks);
    }

    pub(crate) fn set_phase(&self, phase: BootPhase) {
        log::debug!("boot: {:?}", phase);
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Bootstrap phase reached so far.
    pub fn boot_phase(&self) -> BootPhase {
        BootPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn next_auto_name(&self, registry: &Registry<B::Native>) -> UnitName {
        loop {
            let n = self.name_counter.fetch_add(1, Ordering::Relaxed);
            let name = auto_name(n);
            if !registry.contains_live_name(&name) {
                return name;
            }
        }
    }

    /// Spawn a new unit.
    ///
    /// # Arguments
    ///
    /// * `name` - Unit name; `None` generates a unique `thread.NN`
    /// * `priority` - 0 for the middle of the range, clamped to `1..max`
    /// * `stack_size` - Bytes; 0 for [`crate::config::DEFAULT_STACK_SIZE`]
    /// * `entry` - Runs on the new unit with its private context
    ///
    /// # Returns
    ///
    /// The unit's registry id, or the error the backend reported. A failed
    /// spawn leaves no registry entry behind.
    pub fn spawn<F>(&'static self, name: Option<&str>, priority: u8, stack_size: usize, entry: F) -> ThreadResult<UnitId>
    where
        F: FnOnce(&mut UnitContext) + Send + 'static,
    {
        let priority = normalize_priority(priority, self.backend.max_priorities());
        let stack_size = normalize_stack(stack_size);
        let unused_stack = match self.backend.kind() {
            BackendKind::Scheduled => Some(stack_size),
            BackendKind::HostThreads | BackendKind::Bare => None,
        };

        let params = self.with_registry(|registry| {
            let name = match name {
                Some(name) => bounded_name(name),
                None => self.next_auto_name(registry),
            };
            let params = UnitParams {
                name,
                priority,
                stack_size,
            };
            registry.register(&params, unused_stack).map(|id| (id, params))
        });
        let (id, params) = match params {
            Ok(registered) => registered,
            Err(err) => {
                log::warn!("spawn: registry refused a unit: {}", err);
                return Err(err);
            }
        };

        let context = Box::new(UnitContext::new(id, params.name.clone()));
        let body: UnitBody = Box::new(move || self.trampoline(context, entry));
        let native = NativeSpawn {
            name: &params.name,
            priority: params.priority,
            stack_size: params.stack_size,
        };

        match self.backend.create_unit(&native, body) {
            Ok(handle) => {
                self.with_registry(|registry| registry.bind_native(id, handle));
                log::debug!(
                    "spawn: {} as {} (priority {}, {} bytes)",
                    params.name,
                    id,
                    params.priority,
                    params.stack_size
                );
                Ok(id)
            }
            Err(err) => {
                self.with_registry(|registry| registry.remove(id));
                log::warn!("spawn: {} failed: {}", params.name, err);
                Err(err)
            }
        }
    }

    fn trampoline<F>(&self, context: Box<UnitContext>, entry: F)
    where
        F: FnOnce(&mut UnitContext),
    {
        let mut unit = ExitGuard { runtime: self, context };
        entry(&mut *unit.context);
    }

    /// Add the backend's own units (idle task, timer daemon) to the registry.
    ///
    /// Called by the main unit once the scheduler runs.
    pub fn register_system_units(&self) {
        let kind = self.backend.kind();
        for (native, name) in self.backend.system_units() {
            let params = UnitParams {
                name: bounded_name(name),
                priority: 0,
                stack_size: 0,
            };
            let unused = match kind {
                BackendKind::Scheduled => self.backend.stack_unused(native),
                BackendKind::HostThreads | BackendKind::Bare => None,
            };
            let registered = self.with_registry(|registry| {
                registry
                    .register(&params, unused)
                    .map(|id| registry.bind_native(id, native))
            });
            if let Err(err) = registered {
                log::warn!("cannot register system unit {}: {}", name, err);
            }
        }
    }

    /// Entry point for the scheduler's idle task.
    ///
    /// Runs the board idle hook, then one health cycle.
    pub fn idle_hook(&self) -> CycleReport {
        if let Some(hooks) = self.hooks.get() {
            hooks.idle();
        }
        HealthMonitor::run_cycle(self)
    }

    /// Reports on every registered unit.
    pub fn units(&self) -> Vec<UnitReport> {
        self.with_registry(|registry| registry.snapshot())
    }

    /// Units whose entry function has not returned.
    pub fn live_units(&self) -> usize {
        self.with_registry(|registry| registry.live_count())
    }

    /// Registry entries, exited-but-unswept ones included.
    pub fn registered(&self) -> usize {
        self.with_registry(|registry| registry.len())
    }

    /// Report on one unit.
    pub fn unit(&self, id: UnitId) -> Option<UnitReport> {
        self.with_registry(|registry| registry.get(id))
    }
}

/// Marks a unit reclaimable when its entry function is left, returning or
/// unwinding.
struct ExitGuard<'a, B: Backend> {
    runtime: &'a Runtime<B>,
    context: Box<UnitContext>,
}

impl<B: Backend> Drop for ExitGuard<'_, B> {
    fn drop(&mut self) {
        let id = self.context.id();
        self.runtime.with_registry(|registry| registry.mark_reclaimable(id));
        log::debug!("unit {} ({}) exited", self.context.name(), id);
    }
}
