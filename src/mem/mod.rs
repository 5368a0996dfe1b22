//! Memory management.
//!
//! Provides the region heap that backs the global allocator on embedded
//! targets, and the locks that serialize it.

pub mod heap;

pub use heap::{HeapLock, HeapRegion, HeapStats, RegionHeap, SpinHeapLock, SuspendLock};
#[cfg(target_os = "none")]
pub use heap::linker_regions;
