//! Allocation accounting global allocator.
//!
//! Wraps another allocator and keeps byte counters that the runtime sampler
//! reports as memory gauges. The process-wide counters behind
//! [`allocation_stats`] are only fed by the allocator that
//! [`counting_allocator!`](crate::counting_allocator) installs; other
//! instances count into counters of their own.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

static PROCESS_COUNTERS: AllocationCounters = AllocationCounters::new();

/// Byte counters kept by [`CountingAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationStats {
    /// Bytes currently allocated and not yet freed.
    pub allocated: u64,
    /// Bytes allocated since process start, frees ignored.
    pub total_allocated: u64,
}

/// Counters one or more [`CountingAllocator`]s write to.
#[derive(Debug)]
pub struct AllocationCounters {
    allocated: AtomicUsize,
    total_allocated: AtomicU64,
    active: AtomicBool,
}

impl AllocationCounters {
    pub const fn new() -> Self {
        Self {
            allocated: AtomicUsize::new(0),
            total_allocated: AtomicU64::new(0),
            active: AtomicBool::new(false),
        }
    }

    /// Current values, or `None` before the first counted allocation.
    pub fn snapshot(&self) -> Option<AllocationStats> {
        if !self.active.load(Ordering::Relaxed) {
            return None;
        }
        Some(AllocationStats {
            allocated: self.allocated.load(Ordering::Relaxed) as u64,
            total_allocated: self.total_allocated.load(Ordering::Relaxed),
        })
    }

    #[inline]
    fn record_alloc(&self, size: usize) {
        self.active.store(true, Ordering::Relaxed);
        self.allocated.fetch_add(size, Ordering::Relaxed);
        self.total_allocated.fetch_add(size as u64, Ordering::Relaxed);
    }

    #[inline]
    fn record_dealloc(&self, size: usize) {
        self.allocated.fetch_sub(size, Ordering::Relaxed);
    }
}

impl Default for AllocationCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Process heap counters, or `None` when [`counting_allocator!`](crate::counting_allocator)
/// is not the global allocator of this process.
pub fn allocation_stats() -> Option<AllocationStats> {
    PROCESS_COUNTERS.snapshot()
}

/// Allocator wrapper that counts bytes into an [`AllocationCounters`].
pub struct CountingAllocator<A = System> {
    inner: A,
    counters: &'static AllocationCounters,
}

impl CountingAllocator<System> {
    /// System allocator counting into the process-wide counters. Meant for
    /// the `#[global_allocator]` static declared by
    /// [`counting_allocator!`](crate::counting_allocator).
    #[doc(hidden)]
    pub const fn process() -> Self {
        Self {
            inner: System,
            counters: &PROCESS_COUNTERS,
        }
    }
}

impl<A> CountingAllocator<A> {
    pub const fn new(inner: A, counters: &'static AllocationCounters) -> Self {
        Self { inner, counters }
    }
}

unsafe impl<A: GlobalAlloc> GlobalAlloc for CountingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            self.counters.record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc_zeroed(layout);
        if !ptr.is_null() {
            self.counters.record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.inner.dealloc(ptr, layout);
        self.counters.record_dealloc(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = self.inner.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            self.counters.record_dealloc(layout.size());
            self.counters.record_alloc(new_size);
        }
        new_ptr
    }
}

/// Install [`CountingAllocator`] over the system allocator as the global
/// allocator of the calling crate, feeding [`allocation_stats`].
#[macro_export]
macro_rules! counting_allocator {
    () => {
        #[global_allocator]
        static GLOBAL: $crate::observability::runtime::CountingAllocator =
            $crate::observability::runtime::CountingAllocator::process();
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    static LOCAL: AllocationCounters = AllocationCounters::new();

    #[test]
    fn local_instance_counts_into_its_own_counters() {
        let allocator = CountingAllocator::new(System, &LOCAL);
        let layout = Layout::from_size_align(64, 8).unwrap();
        assert_eq!(LOCAL.snapshot(), None);

        unsafe {
            let ptr = allocator.alloc(layout);
            assert!(!ptr.is_null());
            let ptr = allocator.realloc(ptr, layout, 128);
            assert!(!ptr.is_null());
            allocator.dealloc(ptr, Layout::from_size_align(128, 8).unwrap());
        }

        assert_eq!(
            LOCAL.snapshot(),
            Some(AllocationStats {
                allocated: 0,
                total_allocated: 192,
            })
        );
        // the test binary has no counting global allocator
        assert_eq!(allocation_stats(), None);
    }
}
