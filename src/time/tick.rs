//! Time source driven by a periodic interrupt.

use super::TimeSource;
use portable_atomic::{AtomicU64, Ordering};

/// Tick count advanced from a timer interrupt.
///
/// For boards with a periodic interrupt but no readable free-running counter:
/// the interrupt handler calls [`TickCounter::tick`], and a `Bare` backend
/// built over the counter reads time from it. Resolution is one period;
/// the monotonic layer turns repeated readings into unique timestamps.
pub struct TickCounter {
    ticks: AtomicU64,
    rate_hz: u32,
    period_ns: u64,
}

impl TickCounter {
    /// Counter for an interrupt firing `rate_hz` times per second.
    ///
    /// A rate of zero is treated as 1 Hz.
    pub const fn new(rate_hz: u32) -> Self {
        let rate_hz = if rate_hz == 0 { 1 } else { rate_hz };
        Self {
            ticks: AtomicU64::new(0),
            rate_hz,
            period_ns: 1_000_000_000 / rate_hz as u64,
        }
    }

    /// Record one interrupt.
    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::AcqRel);
    }

    /// Interrupts recorded so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Interrupt rate in Hz.
    pub fn rate_hz(&self) -> u32 {
        self.rate_hz
    }

    /// Length of one period in nanoseconds.
    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }
}

impl TimeSource for TickCounter {
    fn raw_nanos(&self) -> i64 {
        let nanos = self.ticks().saturating_mul(self.period_ns);
        i64::try_from(nanos).unwrap_or(i64::MAX)
    }
}
