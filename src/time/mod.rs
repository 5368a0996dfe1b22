//! Strictly monotonic nanosecond clock.
//!
//! Every target reads the best time source it has: the scheduler tick count
//! plus a sub-tick correction, a steady host clock, the wall clock, or a
//! polled hardware counter. Whatever the source does, the value handed out is
//! strictly greater than every value handed out before it. When the source
//! does not advance (coarse resolution, a wrap, a step backwards) the clock
//! returns `last + 1`, so it doubles as a unique timestamp generator.

use portable_atomic::{AtomicI64, Ordering};

pub mod source;
pub mod tick;

#[cfg(feature = "std-shim")]
pub use source::{SteadyClock, WallClock};
pub use source::WrappingMillis;
pub use tick::TickCounter;

/// A raw time source in nanoseconds.
///
/// Readings may repeat, jump backwards or wrap; [`MonotonicClock`] hides that.
pub trait TimeSource: Sync {
    /// Current reading converted to nanoseconds.
    fn raw_nanos(&self) -> i64;
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn raw_nanos(&self) -> i64 {
        (**self).raw_nanos()
    }
}

/// Value to hand out after `last` given a fresh `raw` reading.
#[inline]
const fn next_after(last: i64, raw: i64) -> i64 {
    if raw > last {
        raw
    } else {
        last.wrapping_add(1)
    }
}

/// Advance `last` past `raw` atomically and return the new value.
///
/// Concurrent callers each get a distinct value, and the values are ordered
/// the same way the updates of `last` are.
fn advance(last: &AtomicI64, raw: i64) -> i64 {
    let prev = match last.fetch_update(Ordering::AcqRel, Ordering::Acquire, |l| Some(next_after(l, raw))) {
        Ok(prev) | Err(prev) => prev,
    };
    next_after(prev, raw)
}

/// Shift that puts a new source's `raw` reading just past `last`.
#[inline]
const fn catch_up(last: i64, raw: i64) -> i64 {
    let behind = last.saturating_sub(raw);
    if behind > 0 {
        behind.saturating_add(1)
    } else {
        0
    }
}

/// Monotonic clock over a specific source.
pub struct MonotonicClock<S: TimeSource> {
    source: S,
    last: AtomicI64,
}

impl<S: TimeSource> MonotonicClock<S> {
    /// Create a clock that has not handed out any value yet.
    pub const fn new(source: S) -> Self {
        Self {
            source,
            last: AtomicI64::new(0),
        }
    }

    /// Read the clock. Never fails and never repeats.
    pub fn now_nanoseconds(&self) -> i64 {
        advance(&self.last, self.source.raw_nanos())
    }

    /// Last value handed out (0 before the first read).
    pub fn last(&self) -> i64 {
        self.last.load(Ordering::Acquire)
    }

    /// The underlying source.
    pub fn source(&self) -> &S {
        &self.source
    }
}

static SOURCE: spin::Once<&'static dyn TimeSource> = spin::Once::new();
static OFFSET: AtomicI64 = AtomicI64::new(0);
static LAST: AtomicI64 = AtomicI64::new(0);

/// Install the process-wide time source.
///
/// The first installation wins; returns `false` if a source was already
/// installed. Bootstrap installs the backend here.
///
/// A source whose epoch lies behind the values already handed out is shifted
/// forward so its first reading lands past them, and time keeps moving at the
/// source's rate instead of stalling until it catches up.
pub fn install_source(source: &'static dyn TimeSource) -> bool {
    let mut installed = false;
    SOURCE.call_once(|| {
        installed = true;
        let offset = catch_up(LAST.load(Ordering::Acquire), source.raw_nanos());
        OFFSET.store(offset, Ordering::Release);
        source
    });
    installed
}

/// Process-wide monotonic time in nanoseconds.
///
/// Before a source is installed this reads a steady host clock under
/// `std-shim`, and otherwise acts as a pure logical counter.
pub fn now_nanoseconds() -> i64 {
    let raw = match SOURCE.get() {
        Some(source) => source.raw_nanos().saturating_add(OFFSET.load(Ordering::Acquire)),
        None => fallback_raw(),
    };
    advance(&LAST, raw)
}

#[cfg(feature = "std-shim")]
fn fallback_raw() -> i64 {
    SteadyClock::new().raw_nanos()
}

#[cfg(not(feature = "std-shim"))]
fn fallback_raw() -> i64 {
    i64::MIN
}
