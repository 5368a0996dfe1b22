//! Integration tests for complete unit lifecycles and bootstrap sequences.

#[cfg(test)]
mod lifecycle_tests {
    use crate::backend::{HostThreads, Scheduled};
    use crate::config::RuntimeConfig;
    use crate::errors::SpawnError;
    use crate::runtime::Runtime;
    use crate::tests::sim::{SimPort, IDLE_TASK, TIMER_TASK};
    use crate::thread::UnitBuilder;
    use crate::time;
    use alloc::vec::Vec;
    use std::sync::mpsc;
    use std::sync::{Arc, Barrier};
    use std::time::{Duration, Instant};

    fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn sim_runtime() -> &'static Runtime<Scheduled<SimPort>> {
        Runtime::leak(Scheduled::new(SimPort::new()), RuntimeConfig::default())
    }

    #[test]
    fn test_three_units_on_host_threads() {
        let runtime = Runtime::leak(HostThreads::new(), RuntimeConfig::default());
        let (tx, rx) = mpsc::channel();
        let release = Arc::new(Barrier::new(4));

        for _ in 0..3 {
            let tx = tx.clone();
            let release = release.clone();
            runtime
                .spawn(None, 0, 0, move |_| {
                    tx.send(time::now_nanoseconds()).unwrap();
                    release.wait();
                })
                .unwrap();
        }

        let mut readings: Vec<i64> = (0..3).map(|_| rx.recv_timeout(Duration::from_secs(10)).unwrap()).collect();
        assert_eq!(runtime.live_units(), 3);

        readings.sort_unstable();
        readings.dedup();
        assert_eq!(readings.len(), 3, "clock readings must be distinct");

        release.wait();
        wait_until("units to exit", || runtime.live_units() == 0);

        let report = runtime.idle_hook();
        assert_eq!(report.reclaimed, 3);
        assert_eq!(runtime.registered(), 0);
    }

    #[test]
    fn test_scheduled_units_wait_for_scheduler() {
        let runtime = sim_runtime();
        let (tx, rx) = mpsc::channel();

        let id = UnitBuilder::new()
            .name("dcc.refresh")
            .priority(200)
            .stack_size(1024)
            .spawn(runtime, move |ctx| tx.send(std::string::String::from(ctx.name())).unwrap())
            .unwrap();

        let report = runtime.unit(id).unwrap();
        assert_eq!(report.priority, 7);
        assert_eq!(report.unused_stack, Some(1024));
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        runtime.backend().port().start();
        assert_eq!(rx.recv_timeout(Duration::from_secs(10)).unwrap(), "dcc.refresh");
    }

    #[test]
    fn test_health_cycle_on_scheduled_target() {
        let runtime = sim_runtime();
        let port = runtime.backend().port();
        port.start();

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let resident = runtime
            .spawn(Some("resident"), 3, 0, move |_| {
                let _ = stop_rx.recv();
            })
            .unwrap();
        let transient: Vec<_> = (0..4).map(|_| runtime.spawn(None, 3, 0, |_| {}).unwrap()).collect();

        wait_until("transient units to exit", || runtime.live_units() == 1);
        assert_eq!(runtime.registered(), 5);

        let report = runtime.idle_hook();
        assert_eq!(report.reclaimed, 4);
        assert_eq!(report.scanned, 1);
        for id in transient {
            assert!(runtime.unit(id).is_none());
        }

        let resident = runtime.unit(resident).unwrap();
        let native = resident.native.unwrap();
        assert_eq!(resident.unused_stack, Some(SimPort::high_water_mark(native) * 4));

        stop_tx.send(()).unwrap();
    }

    #[test]
    fn test_system_units_are_registered() {
        let runtime = sim_runtime();
        runtime.register_system_units();

        let units = runtime.units();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].name.as_str(), "Tmr Svc");
        assert_eq!(units[0].native, Some(TIMER_TASK));
        assert_eq!(units[1].name.as_str(), "IDLE");
        assert_eq!(units[1].unused_stack, Some(SimPort::high_water_mark(IDLE_TASK) * 4));
    }

    #[test]
    fn test_failed_creation_leaves_no_entry() {
        let runtime = sim_runtime();
        runtime.backend().port().fail_creation(true);

        assert_eq!(runtime.spawn(Some("doomed"), 0, 0, |_| {}), Err(SpawnError::OutOfMemory));
        assert_eq!(runtime.registered(), 0);
        assert_eq!(runtime.backend().port().created(), 0);

        runtime.backend().port().fail_creation(false);
        assert!(runtime.spawn(Some("fine"), 0, 0, |_| {}).is_ok());
        assert_eq!(runtime.registered(), 1);
    }
}

#[cfg(test)]
mod boot_tests {
    use crate::backend::{HostThreads, Scheduled};
    use crate::boot::{BoardHooks, BootPhase, Bootstrap, NoHooks};
    use crate::config::{RuntimeConfig, MAIN_THREAD_NAME};
    use crate::errors::{FatalReason, SpawnError};
    use crate::fatal;
    use crate::runtime::Runtime;
    use crate::tests::sim::SimPort;
    use crate::time;
    use alloc::vec::Vec;
    use portable_atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
    use serial_test::serial;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::time::{Duration, Instant};

    static RUNTIME: spin::Once<&'static Runtime<Scheduled<SimPort>>> = spin::Once::new();
    static READINGS: spin::Mutex<Vec<i64>> = spin::Mutex::new(Vec::new());
    static WORKERS_GO: AtomicBool = AtomicBool::new(false);
    static APP_RETURN: AtomicBool = AtomicBool::new(false);
    static POSTINIT_CALLS: AtomicUsize = AtomicUsize::new(0);
    static ARGV_OK: AtomicBool = AtomicBool::new(false);

    struct TestBoard;

    impl BoardHooks for TestBoard {
        fn hw_postinit(&self) {
            POSTINIT_CALLS.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn appl_main(args: &[&str]) -> i32 {
        ARGV_OK.store(args == ["station"], Ordering::SeqCst);
        let runtime = *RUNTIME.get().unwrap();

        for _ in 0..3 {
            runtime
                .spawn(None, 0, 0, |_| {
                    READINGS.lock().push(time::now_nanoseconds());
                    while !WORKERS_GO.load(Ordering::SeqCst) {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                })
                .unwrap();
        }

        while !APP_RETURN.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }
        0
    }

    fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn workers(runtime: &Runtime<Scheduled<SimPort>>) -> usize {
        runtime
            .units()
            .iter()
            .filter(|u| u.name.starts_with("thread.") && u.name.as_str() != MAIN_THREAD_NAME)
            .filter(|u| !u.reclaimable)
            .count()
    }

    #[test]
    #[serial]
    fn test_scheduled_bootstrap_end_to_end() {
        let runtime = Runtime::leak(Scheduled::new(SimPort::new()), RuntimeConfig::default());
        RUNTIME.call_once(|| runtime);

        std::thread::spawn(move || {
            Bootstrap::new(runtime, &TestBoard).run(appl_main);
        });

        wait_until("three clock readings", || READINGS.lock().len() == 3);
        assert_eq!(runtime.boot_phase(), BootPhase::ApplicationRunning);
        assert_eq!(POSTINIT_CALLS.load(Ordering::SeqCst), 1);
        assert!(ARGV_OK.load(Ordering::SeqCst));

        let mut readings = READINGS.lock().clone();
        readings.sort_unstable();
        readings.dedup();
        assert_eq!(readings.len(), 3);
        assert_eq!(workers(runtime), 3);

        let names: Vec<_> = runtime.units().into_iter().map(|u| u.name).collect();
        assert!(names.iter().any(|n| n.as_str() == MAIN_THREAD_NAME));
        assert!(names.iter().any(|n| n.as_str() == "IDLE"));
        assert!(names.iter().any(|n| n.as_str() == "Tmr Svc"));

        WORKERS_GO.store(true, Ordering::SeqCst);
        wait_until("workers to exit", || workers(runtime) == 0);
        let report = runtime.idle_hook();
        assert_eq!(report.reclaimed, 3);

        // The application returning on a scheduled target is fatal.
        let before = fatal::death_count();
        APP_RETURN.store(true, Ordering::SeqCst);
        wait_until("fatal stop", || fatal::death_count() > before);
        assert_eq!(
            fatal::last_death().map(|d| d.reason),
            Some(FatalReason::ApplicationReturned)
        );
    }

    #[test]
    #[serial]
    fn test_clock_keeps_running_across_host_boot() {
        static APP_ELAPSED: AtomicI64 = AtomicI64::new(0);

        fn app(_args: &[&str]) -> i32 {
            let start = time::now_nanoseconds();
            std::thread::sleep(Duration::from_millis(100));
            APP_ELAPSED.store(time::now_nanoseconds() - start, Ordering::SeqCst);
            0
        }

        let early = time::now_nanoseconds();
        std::thread::sleep(Duration::from_millis(300));
        let before_boot = time::now_nanoseconds();
        assert!(before_boot - early >= 300_000_000);

        let runtime = Runtime::leak(HostThreads::new(), RuntimeConfig::default());
        assert_eq!(Bootstrap::new(runtime, &NoHooks).run(app), 0);

        assert!(APP_ELAPSED.load(Ordering::SeqCst) >= 100_000_000);
        assert!(time::now_nanoseconds() - before_boot >= 100_000_000);
    }

    fn boot_with_failing_main(failure: SpawnError) -> Option<FatalReason> {
        fn app(_args: &[&str]) -> i32 {
            0
        }

        let config = RuntimeConfig::default().main_stack_size(8192);
        let runtime = Runtime::leak(Scheduled::new(SimPort::new()), config);
        runtime.backend().port().fail_creation_with(Some(failure));

        let before = fatal::death_count();
        let result = catch_unwind(AssertUnwindSafe(|| Bootstrap::new(runtime, &NoHooks).run(app)));
        assert!(result.is_err());
        assert_eq!(fatal::death_count(), before + 1);
        assert_eq!(runtime.boot_phase(), BootPhase::MainThreadLaunch);
        assert_eq!(runtime.registered(), 0);
        fatal::last_death().map(|d| d.reason)
    }

    #[test]
    #[serial]
    fn test_main_launch_out_of_memory() {
        assert_eq!(
            boot_with_failing_main(SpawnError::OutOfMemory),
            Some(FatalReason::OutOfMemory { requested: 8192 })
        );
    }

    #[test]
    #[serial]
    fn test_main_launch_failure_keeps_its_cause() {
        for failure in [SpawnError::RegistryFull, SpawnError::Native(11), SpawnError::NotSupported] {
            assert_eq!(
                boot_with_failing_main(failure),
                Some(FatalReason::MainLaunchFailed(failure))
            );
        }
    }
}
