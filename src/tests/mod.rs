//! Cross-module test scenarios.
//!
//! Most of these drive real threads, so they need the host shim.



#[cfg(feature = "std-shim")]
mod integration;
