//! Execution unit identity and parameters.
//!
//! A unit is the runtime's view of a thread: a registry slot plus the native
//! unit the backend created for it. This module holds the pieces that do not
//! depend on a backend: ids, bounded names, priority and stack normalization,
//! and the private context every unit receives.

use crate::config::{AUTO_NAME_PREFIX, DEFAULT_STACK_SIZE, MAX_NAME_LEN};
use core::fmt::{self, Write};

pub mod builder;
pub mod registry;

pub use builder::UnitBuilder;
pub use registry::Registry;

/// Bounded unit name.
pub type UnitName = heapless::String<MAX_NAME_LEN>;

/// Handle of a registry slot.
///
/// The generation changes whenever the slot is reused, so a stale id never
/// refers to a newer unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId {
    index: u32,
    generation: u32,
}

impl UnitId {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the registry.
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Reuse generation of the slot.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Copy `name` into a [`UnitName`], truncating at a char boundary.
pub fn bounded_name(name: &str) -> UnitName {
    let mut bounded = UnitName::new();
    for ch in name.chars() {
        if bounded.push(ch).is_err() {
            log::warn!("unit name {:?} truncated to {:?}", name, bounded.as_str());
            break;
        }
    }
    bounded
}

/// Auto-generated name for the `n`th anonymous unit: `thread.00`, `thread.01`, ...
pub fn auto_name(n: usize) -> UnitName {
    let mut name = UnitName::new();
    // Counters wider than nine digits do not fit and leave just the prefix.
    let _ = write!(name, "{}{:02}", AUTO_NAME_PREFIX, n);
    name
}

/// Map a requested priority into the backend's valid range `1..max_priorities`.
///
/// Zero asks for the middle of the range; anything at or above the top is
/// clamped to `max_priorities - 1`.
pub fn normalize_priority(requested: u8, max_priorities: u8) -> u8 {
    let max = max_priorities.max(2);
    let priority = if requested == 0 { max / 2 } else { requested };
    priority.clamp(1, max - 1)
}

/// Stack size in bytes, substituting the default for zero.
pub fn normalize_stack(requested: usize) -> usize {
    if requested == 0 {
        DEFAULT_STACK_SIZE
    } else {
        requested
    }
}

/// Normalized creation parameters of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitParams {
    /// Final unit name
    pub name: UnitName,
    /// Priority in the backend's valid range
    pub priority: u8,
    /// Stack size in bytes
    pub stack_size: usize,
}

/// Private per-unit state, handed to the entry function by `&mut`.
///
/// Allocated before the native unit starts and dropped when its entry
/// function returns.
#[derive(Debug)]
pub struct UnitContext {
    id: UnitId,
    name: UnitName,
    errno: i32,
    event_bit: u32,
}

impl UnitContext {
    pub(crate) fn new(id: UnitId, name: UnitName) -> Self {
        Self {
            id,
            name,
            errno: 0,
            event_bit: 0,
        }
    }

    /// Registry id of this unit.
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Name of this unit.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last error number recorded by this unit.
    pub fn errno(&self) -> i32 {
        self.errno
    }

    /// Record an error number.
    pub fn set_errno(&mut self, errno: i32) {
        self.errno = errno;
    }

    /// Notification bit this unit waits on in select-style calls.
    pub fn event_bit(&self) -> u32 {
        self.event_bit
    }

    /// Assign the notification bit.
    pub fn set_event_bit(&mut self, bit: u32) {
        self.event_bit = bit;
    }
}

/// Diagnostic view of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    /// Registry id
    pub id: UnitId,
    /// Unit name
    pub name: UnitName,
    /// Normalized priority
    pub priority: u8,
    /// Stack size in bytes
    pub stack_size: usize,
    /// Bytes of stack never used so far; `None` if the backend cannot tell
    pub unused_stack: Option<usize>,
    /// Raw native handle, once the native unit exists
    pub native: Option<usize>,
    /// The unit's entry function has returned
    pub reclaimable: bool,
}
