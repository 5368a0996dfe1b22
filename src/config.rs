//! Runtime configuration.
//!
//! Everything here is fixed at build time. Boards override the main unit's
//! parameters through [`RuntimeConfig`]; the rest are constants shared by all
//! backends.

use core::time::Duration;

/// Stack size used when a unit is spawned with `stack_size == 0`.
pub const DEFAULT_STACK_SIZE: usize = 2048;

/// Maximum length of a unit name in bytes.
pub const MAX_NAME_LEN: usize = 16;

/// How long a caller waiting on an in-progress once guard sleeps per poll.
pub const ONCE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Prefix of auto-generated unit names.
pub const AUTO_NAME_PREFIX: &str = "thread.";

/// Name of the unit that runs the application entry point.
pub const MAIN_THREAD_NAME: &str = "thread.main";

/// Maximum number of units the registry tracks at once.
pub const MAX_UNITS: usize = 64;

/// Stack size of the main unit unless the board says otherwise.
pub const DEFAULT_MAIN_STACK_SIZE: usize = 4096;

/// Parameters the bootstrap uses for the main unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Main unit priority; `None` picks the mid-range default.
    pub main_priority: Option<u8>,
    /// Main unit stack size in bytes.
    pub main_stack_size: usize,
    /// `argv[0]` handed to the application on scheduled targets.
    pub argv0: &'static str,
}

impl RuntimeConfig {
    /// Default configuration, usable in `const` and `static` contexts.
    pub const fn new() -> Self {
        Self {
            main_priority: None,
            main_stack_size: DEFAULT_MAIN_STACK_SIZE,
            argv0: "station",
        }
    }

    /// Override the main unit priority.
    pub const fn main_priority(mut self, priority: u8) -> Self {
        self.main_priority = Some(priority);
        self
    }

    /// Override the main unit stack size.
    pub const fn main_stack_size(mut self, size: usize) -> Self {
        self.main_stack_size = size;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}
