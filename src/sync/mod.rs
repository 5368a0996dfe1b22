//! Synchronization primitives built on the execution backend.

pub mod once;

pub use once::{OnceGuard, OnceState};
