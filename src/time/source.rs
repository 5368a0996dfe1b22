//! Raw time sources for targets that are not driven by a scheduler tick.

use super::TimeSource;
use spin::Mutex;

/// Epoch shared by every [`SteadyClock`], taken on the first reading.
#[cfg(feature = "std-shim")]
static STEADY_EPOCH: spin::Once<std::time::Instant> = spin::Once::new();

/// Steady host clock.
///
/// All instances count from one process-wide epoch, so the pre-boot fallback
/// and a backend installed later read the same timeline.
#[cfg(feature = "std-shim")]
#[derive(Debug, Default, Clone, Copy)]
pub struct SteadyClock;

#[cfg(feature = "std-shim")]
impl SteadyClock {
    /// Create a clock handle.
    pub const fn new() -> Self {
        Self
    }
}

#[cfg(feature = "std-shim")]
impl TimeSource for SteadyClock {
    fn raw_nanos(&self) -> i64 {
        let epoch = STEADY_EPOCH.call_once(std::time::Instant::now);
        i64::try_from(epoch.elapsed().as_nanos()).unwrap_or(i64::MAX)
    }
}

/// Wall clock, for hosts without a usable steady clock.
///
/// Can step backwards when the system time is adjusted; the monotonic layer
/// absorbs that.
#[cfg(feature = "std-shim")]
#[derive(Debug, Default, Clone, Copy)]
pub struct WallClock;

#[cfg(feature = "std-shim")]
impl TimeSource for WallClock {
    fn raw_nanos(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |since| i64::try_from(since.as_nanos()).unwrap_or(i64::MAX))
    }
}

#[derive(Debug, Default)]
struct WrapState {
    last_millis: u32,
    wraps: u32,
}

/// Polled 32-bit millisecond counter, extended to 64 bits.
///
/// Constrained boards with no OS clock expose a free-running counter that
/// wraps every ~49 days. Each reading smaller than the previous one counts as
/// a wrap, so the source must be polled at least once per wrap period.
pub struct WrappingMillis<F: Fn() -> u32 + Sync> {
    read: F,
    state: Mutex<WrapState>,
}

impl<F: Fn() -> u32 + Sync> WrappingMillis<F> {
    /// Wrap a counter read function.
    pub const fn new(read: F) -> Self {
        Self {
            read,
            state: Mutex::new(WrapState { last_millis: 0, wraps: 0 }),
        }
    }
}

impl<F: Fn() -> u32 + Sync> TimeSource for WrappingMillis<F> {
    fn raw_nanos(&self) -> i64 {
        let mut state = self.state.lock();
        let now = (self.read)();
        if now < state.last_millis {
            state.wraps = state.wraps.wrapping_add(1);
        }
        state.last_millis = now;

        let millis = (i64::from(state.wraps) << 32) | i64::from(now);
        millis.wrapping_mul(1_000_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portable_atomic::{AtomicU32, Ordering};

    #[test]
    fn test_wrapping_millis_extends_past_wrap() {
        static COUNTER: AtomicU32 = AtomicU32::new(u32::MAX - 1);
        let source = WrappingMillis::new(|| COUNTER.load(Ordering::Relaxed));

        let before = source.raw_nanos();
        COUNTER.store(3, Ordering::Relaxed);
        let after = source.raw_nanos();

        assert_eq!(before, i64::from(u32::MAX - 1) * 1_000_000);
        assert_eq!(after, ((1i64 << 32) + 3) * 1_000_000);
        assert!(after > before);
    }

    #[cfg(feature = "std-shim")]
    #[test]
    fn test_steady_clocks_share_one_epoch() {
        let early = SteadyClock::new().raw_nanos();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let late = SteadyClock::new().raw_nanos();
        assert!(early >= 0);
        assert!(late - early >= 20_000_000);
    }

    #[cfg(feature = "std-shim")]
    #[test]
    fn test_wall_clock_is_after_epoch() {
        // 2020-01-01 in nanoseconds.
        assert!(WallClock.raw_nanos() > 1_577_836_800 * 1_000_000_000);
    }
}
