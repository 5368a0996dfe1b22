//! Bump allocator over up to two disjoint memory regions.
//!
//! Requests are carved from the primary region; once it cannot satisfy a
//! request, the secondary region is tried. When neither can, the system
//! dies with [`FatalReason::OutOfMemory`]: a constrained target has no safe
//! way to continue after heap exhaustion.
//!
//! Memory is never returned to a region: `dealloc` is a no-op. Firmware with
//! a fixed topology allocates at start-up and rarely frees afterwards.

use crate::backend::{Backend, SchedulerState};
use crate::errors::FatalReason;
use crate::fatal;
use core::alloc::{GlobalAlloc, Layout};
use core::cell::UnsafeCell;
use core::ops::Range;
use core::ptr::NonNull;
use spin::mutex::SpinMutex;

/// A contiguous `[start, end)` byte range with a bump cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapRegion {
    start: usize,
    end: usize,
    cursor: usize,
}

impl HeapRegion {
    /// A region that does not exist.
    pub const fn absent() -> Self {
        Self { start: 0, end: 0, cursor: 0 }
    }

    /// A region covering `range`.
    pub const fn new(range: Range<usize>) -> Self {
        Self {
            start: range.start,
            end: range.end,
            cursor: range.start,
        }
    }

    /// A region with `start == end` is absent.
    pub fn is_present(&self) -> bool {
        self.start != self.end
    }

    /// Total size in bytes.
    pub fn capacity(&self) -> usize {
        self.end - self.start
    }

    /// Bytes handed out so far, including alignment padding.
    pub fn used(&self) -> usize {
        self.cursor - self.start
    }

    /// Bytes still available before the end of the region.
    pub fn remaining(&self) -> usize {
        self.end - self.cursor
    }

    fn bump(&mut self, size: usize, align: usize) -> Option<usize> {
        if !self.is_present() {
            return None;
        }
        let aligned = self.cursor.checked_add(align - 1)? & !(align - 1);
        let next = aligned.checked_add(size)?;
        if next > self.end {
            return None;
        }
        self.cursor = next;
        Some(aligned)
    }
}

/// Usage of both regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes used in the primary region
    pub primary_used: usize,
    /// Size of the primary region
    pub primary_capacity: usize,
    /// Bytes used in the secondary region
    pub secondary_used: usize,
    /// Size of the secondary region (0 when absent)
    pub secondary_capacity: usize,
}

/// Serializes access to the heap.
///
/// `lock` and `unlock` bracket every allocation entry point.
pub trait HeapLock: Sync {
    /// Enter the heap critical section.
    fn lock(&self);
    /// Leave the heap critical section.
    fn unlock(&self);
}

/// Narrow mutual exclusion for host-threaded targets.
pub struct SpinHeapLock {
    inner: SpinMutex<()>,
}

impl SpinHeapLock {
    /// Create an unlocked lock.
    pub const fn new() -> Self {
        Self { inner: SpinMutex::new(()) }
    }
}

impl Default for SpinHeapLock {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapLock for SpinHeapLock {
    fn lock(&self) {
        core::mem::forget(self.inner.lock());
    }

    fn unlock(&self) {
        // SAFETY: paired with the forgotten guard taken in `lock`.
        unsafe { self.inner.force_unlock() };
    }
}

/// Scheduler-suspending lock for scheduled targets.
///
/// Suspend-all is the only primitive available there; before the scheduler
/// starts there is nothing to exclude.
pub struct SuspendLock<B: Backend> {
    backend: &'static B,
}

impl<B: Backend> SuspendLock<B> {
    /// Lock through `backend`'s global critical section.
    pub const fn new(backend: &'static B) -> Self {
        Self { backend }
    }
}

impl<B: Backend> HeapLock for SuspendLock<B> {
    fn lock(&self) {
        if self.backend.scheduler_state() != SchedulerState::NotStarted {
            self.backend.suspend_all();
        }
    }

    fn unlock(&self) {
        if self.backend.scheduler_state() != SchedulerState::NotStarted {
            self.backend.resume_all();
        }
    }
}

/// Bump heap over a primary and an optional secondary region.
pub struct RegionHeap<L: HeapLock> {
    lock: L,
    regions: UnsafeCell<[HeapRegion; 2]>,
}

// SAFETY: `regions` is only touched between `lock.lock()` and `lock.unlock()`.
unsafe impl<L: HeapLock> Sync for RegionHeap<L> {}

impl<L: HeapLock> RegionHeap<L> {
    /// An empty heap; every allocation fails until [`RegionHeap::init`].
    pub const fn new(lock: L) -> Self {
        Self {
            lock,
            regions: UnsafeCell::new([HeapRegion::absent(), HeapRegion::absent()]),
        }
    }

    /// Hand the heap its memory.
    ///
    /// # Safety
    ///
    /// Both ranges must be valid, writable, mutually disjoint memory that
    /// nothing else uses for the rest of the program, and no allocation may be
    /// in flight.
    pub unsafe fn init(&self, primary: Range<usize>, secondary: Option<Range<usize>>) {
        self.lock.lock();
        // SAFETY: exclusive access under the heap lock.
        let regions = unsafe { &mut *self.regions.get() };
        regions[0] = HeapRegion::new(primary);
        regions[1] = secondary.map_or(HeapRegion::absent(), HeapRegion::new);
        let capacities = (regions[0].capacity(), regions[1].capacity());
        self.lock.unlock();
        log::debug!("heap: primary {} bytes, secondary {} bytes", capacities.0, capacities.1);
    }

    fn try_allocate(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        self.lock.lock();
        // SAFETY: exclusive access under the heap lock.
        let regions = unsafe { &mut *self.regions.get() };
        let addr = match regions[0].bump(size, align) {
            Some(addr) => Some(addr),
            None => regions[1].bump(size, align),
        };
        self.lock.unlock();
        addr.and_then(|addr| NonNull::new(addr as *mut u8))
    }

    /// Allocate `size` bytes aligned to `align` (a power of two).
    ///
    /// Never returns on exhaustion of both regions.
    pub fn allocate(&self, size: usize, align: usize) -> NonNull<u8> {
        match self.try_allocate(size, align) {
            Some(ptr) => ptr,
            None => fatal::die(FatalReason::OutOfMemory { requested: size }),
        }
    }

    /// Current usage of both regions.
    pub fn stats(&self) -> HeapStats {
        self.lock.lock();
        // SAFETY: exclusive access under the heap lock.
        let [primary, secondary] = unsafe { *self.regions.get() };
        self.lock.unlock();
        HeapStats {
            primary_used: primary.used(),
            primary_capacity: primary.capacity(),
            secondary_used: secondary.used(),
            secondary_capacity: secondary.capacity(),
        }
    }
}

unsafe impl<L: HeapLock> GlobalAlloc for RegionHeap<L> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocate(layout.size(), layout.align()).as_ptr()
    }

    unsafe fn dealloc(&self, _ptr: *mut u8, _layout: Layout) {}
}

/// Heap regions placed by the linker script.
///
/// Boards without a second heap define `__heap2_start == __heap2_end`.
#[cfg(target_os = "none")]
pub fn linker_regions() -> (Range<usize>, Option<Range<usize>>) {
    extern "C" {
        static __heap_start: u8;
        static __heap_end: u8;
        static __heap2_start: u8;
        static __heap2_end: u8;
    }

    // SAFETY: only the addresses of the linker symbols are taken.
    let (start, end, start2, end2) = unsafe {
        (
            core::ptr::addr_of!(__heap_start) as usize,
            core::ptr::addr_of!(__heap_end) as usize,
            core::ptr::addr_of!(__heap2_start) as usize,
            core::ptr::addr_of!(__heap2_end) as usize,
        )
    };
    let secondary = (start2 != end2).then_some(start2..end2);
    (start..end, secondary)
}
