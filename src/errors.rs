//! Error types for the runtime shim.
//!
//! Errors come in three tiers. Recoverable ones ([`SpawnError`]) are
//! returned to the caller. Fatal ones ([`FatalReason`]) are never returned:
//! they go straight to [`crate::fatal::die`]. Non-monotonic clock readings are
//! corrected in place and are not errors at all.

use thiserror::Error;

/// Result type for unit lifecycle operations.
pub type ThreadResult<T> = Result<T, SpawnError>;

/// Errors that can occur while creating an execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SpawnError {
    /// The active backend has no notion of threads
    #[error("execution backend cannot create units")]
    NotSupported,
    /// Not enough memory for the unit's stack or control block
    #[error("out of memory for unit creation")]
    OutOfMemory,
    /// The registry has no free slot left
    #[error("unit registry is full")]
    RegistryFull,
    /// The native thread facility reported an error code
    #[error("native thread creation failed with code {0}")]
    Native(i32),
}

impl SpawnError {
    /// Error number in the convention of the native thread API (0 = success).
    pub fn code(self) -> i32 {
        match self {
            SpawnError::NotSupported => 38, // ENOSYS
            SpawnError::OutOfMemory => 12,  // ENOMEM
            SpawnError::RegistryFull => 11, // EAGAIN
            SpawnError::Native(code) => code,
        }
    }
}

/// Conditions the system cannot continue after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FatalReason {
    /// Both heap regions are exhausted
    #[error("out of memory: {requested} bytes requested with both heap regions exhausted")]
    OutOfMemory {
        /// Size of the allocation that failed
        requested: usize,
    },
    /// The scheduler detected a stack boundary violation
    #[error("stack overflow")]
    StackOverflow,
    /// The application entry point returned on a scheduled target
    #[error("application entry point returned")]
    ApplicationReturned,
    /// A once routine re-entered its own guard with no scheduler running
    #[error("recursive call to a once guard")]
    RecursiveOnce,
    /// The main unit could not be created for a reason other than memory
    #[error("cannot launch the main unit: {0}")]
    MainLaunchFailed(SpawnError),
}

impl FatalReason {
    /// Blink code for boards that signal death on an LED.
    pub fn blink_code(self) -> u32 {
        match self {
            FatalReason::OutOfMemory { .. } => 0x8000_CCCA,
            FatalReason::StackOverflow => 0x8000_CCC2,
            FatalReason::ApplicationReturned => 0x8000_CCCC,
            FatalReason::RecursiveOnce => 0x8000_CA2C,
            FatalReason::MainLaunchFailed(_) => 0x8000_C2CA,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_spawn_error_codes() {
        assert_eq!(SpawnError::Native(22).code(), 22);
        assert_eq!(SpawnError::OutOfMemory.code(), 12);
        assert_ne!(SpawnError::NotSupported.code(), 0);
    }

    #[test]
    fn test_fatal_messages() {
        let msg = FatalReason::OutOfMemory { requested: 64 }.to_string();
        assert!(msg.contains("64 bytes"));
        assert_eq!(FatalReason::StackOverflow.to_string(), "stack overflow");
        assert_eq!(
            FatalReason::MainLaunchFailed(SpawnError::RegistryFull).to_string(),
            "cannot launch the main unit: unit registry is full"
        );
    }
}
