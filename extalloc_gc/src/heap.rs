//! Heap - allocation API, growth policy, and the mark-sweep driver.
//!
//! Design:
//! - Every region comes from an [`ExtAllocator`]; the heap only tracks them
//! - A registry of `[start, end]` records stands in for object metadata
//! - Marking is conservative: any pointer-aligned word that lands inside a
//!   tracked region keeps that region alive
//! - A soft usage limit triggers collection; after an unproductive cycle
//!   the limit doubles until the allocation fits
//!
//! The runtime provides:
//! - `GcContext::visit_stack` - the native stack extent
//! - `GcContext::visit_globals` - the global data ranges
//!
//! Strictly single-threaded; the one guard (`in_progress`) protects against
//! re-entry within a call stack, not against concurrent access.

use core::mem;
use core::ptr::{self, NonNull};

use crate::{
    adapter::ExtAllocator,
    registry::{Allocation, AllocationRegistry, NO_INDEX},
    scan_queue::ScanQueue,
    stats::MemStats,
    visitor::{GcContext, RootVisitor},
};

/// Size of a pointer-sized word on the target.
pub(crate) const WORD_SIZE: usize = mem::size_of::<*const ()>();

/// Pointer alignment on the target; the scanner's stride.
const WORD_ALIGN: usize = mem::align_of::<*const ()>();

/// Linear-memory page size on WebAssembly targets.
const WASM_PAGE_SIZE: usize = 64 * 1024;

/// Boot value for the soft usage limit. Any small value works; crossing it
/// just triggers the first collection earlier or later.
const INITIAL_USAGE_LIMIT: usize = 2 * WASM_PAGE_SIZE * WORD_SIZE;

// Returned for zero-sized allocations so `alloc` never returns null. Never
// registered and never scanned.
static ZERO_SIZED_ALLOC: u8 = 0;

/// Operational variant of a heap.
///
/// Both variants share the whole allocation and accounting path; they are
/// meant to be comparable call for call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GcMode {
    /// Full mark-sweep with reclamation.
    Tracing,
    /// Collection is a no-op and nothing is ever freed. Used as a baseline
    /// for performance comparisons and as a debugging aid.
    Leaking,
}

/// A garbage-collected heap over an external allocator.
pub struct Heap<A: ExtAllocator> {
    adapter: A,
    mode: GcMode,

    /// Table of live allocations, sorted only at cycle boundaries.
    registry: AllocationRegistry,

    /// Worklist of marked-but-unscanned allocations.
    queue: ScanQueue,

    /// Re-entry guard for `alloc` and `collect`.
    in_progress: bool,

    /// Bytes currently tracked, header prefixes included. Recomputed by
    /// sweep.
    total_alloc: u64,

    /// Monotonic counters of allocator traffic.
    mallocs: u64,
    frees: u64,

    /// Soft ceiling that triggers a collection when crossed.
    usage_limit: usize,

    /// Linear-memory extent reported as `sys`; recorded by the embedder.
    heap_start: usize,
    heap_end: usize,
}

impl<A: ExtAllocator> Heap<A> {
    /// Create a tracing heap over `adapter`.
    pub const fn new(adapter: A) -> Heap<A> {
        Self::with_mode(adapter, GcMode::Tracing)
    }

    /// Create a leaking heap over `adapter`.
    pub const fn leaking(adapter: A) -> Heap<A> {
        Self::with_mode(adapter, GcMode::Leaking)
    }

    pub const fn with_mode(adapter: A, mode: GcMode) -> Heap<A> {
        Heap {
            adapter,
            mode,
            registry: AllocationRegistry::new(),
            queue: ScanQueue::new(),
            in_progress: false,
            total_alloc: 0,
            mallocs: 0,
            frees: 0,
            usage_limit: INITIAL_USAGE_LIMIT,
            heap_start: 0,
            heap_end: 0,
        }
    }

    #[inline]
    pub fn mode(&self) -> GcMode {
        self.mode
    }

    /// Override the boot usage limit. Meant for embedders and tests; calling
    /// this after allocations exist merely moves the next trigger point.
    pub fn set_usage_limit(&mut self, limit: usize) {
        self.usage_limit = limit;
    }

    #[inline]
    pub fn usage_limit(&self) -> usize {
        self.usage_limit
    }

    /// Record the linear-memory extent reported by stats as `sys`.
    pub fn set_heap_extent(&mut self, start: usize, end: usize) {
        self.heap_start = start;
        self.heap_end = end;
    }

    /// Number of allocations currently tracked by the registry.
    #[inline]
    pub fn tracked_allocations(&self) -> usize {
        self.registry.len()
    }

    /// Bytes currently tracked, header prefixes included.
    #[inline]
    pub fn heap_in_use(&self) -> u64 {
        self.total_alloc
    }

    /// The fixed address returned for zero-sized allocations.
    pub fn zero_sized_sentinel() -> NonNull<u8> {
        NonNull::from(&ZERO_SIZED_ALLOC)
    }

    /// Access the underlying adapter.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    /// Allocate `size` zeroed bytes, collecting or growing the heap as
    /// needed.
    ///
    /// Never returns null: zero-sized requests share one static sentinel
    /// byte. A pointer-sized header prefix is added to every other request
    /// so the embedder can store layout metadata ahead of the user data;
    /// the conservative scanner does not distinguish the two.
    ///
    /// Fatal when called during a collection, when the adapter stays
    /// exhausted after a collection has already run, or when the byte
    /// accounting would overflow.
    pub fn alloc(&mut self, ctx: &mut impl GcContext, size: usize) -> NonNull<u8> {
        if self.in_progress {
            gc_running_fatal();
        }

        self.mallocs += 1;

        if size == 0 {
            return Self::zero_sized_sentinel();
        }

        // Reserve the header prefix, rounded to the pointer alignment.
        let size = match size.checked_add(align_word(WORD_SIZE)) {
            Some(total) => total,
            None => overflow_fatal(),
        };
        if self.total_alloc.checked_add(size as u64).is_none() {
            overflow_fatal();
        }

        // Retry until the allocation succeeds or the collector has already
        // had its one chance to free up room.
        let mut gc_ran = false;
        loop {
            // Make room under the soft limit: collect once, then grow.
            if self.total_alloc + size as u64 > self.usage_limit as u64 {
                if !gc_ran {
                    self.collect(ctx);
                    gc_ran = true;
                } else {
                    self.grow_usage_limit(size);
                }
                continue;
            }

            // Make room in the registry before touching the adapter for the
            // user region, so a half-done allocation can never be dropped.
            if self.registry.is_full() && !self.grow_registry() {
                if !gc_ran {
                    self.collect(ctx);
                    gc_ran = true;
                    continue;
                }
                oom_fatal();
            }

            let region = self.adapter.extalloc(size);
            if region.is_null() {
                if !gc_ran {
                    self.collect(ctx);
                    gc_ran = true;
                    continue;
                }
                oom_fatal();
            }

            self.registry.push(Allocation::new(region as usize, size));
            self.total_alloc += size as u64;

            unsafe { ptr::write_bytes(region, 0, size) };
            return unsafe { NonNull::new_unchecked(region) };
        }
    }

    /// Explicitly release a region obtained from [`alloc`](Self::alloc).
    ///
    /// Advisory fast path: the region is also unregistered so that a later
    /// reuse of the address by the adapter cannot leave two overlapping
    /// records behind. The zero-sized sentinel is accepted and counted but
    /// never forwarded. No-op in the leaking variant.
    pub fn free(&mut self, ptr: *mut u8) {
        if let GcMode::Leaking = self.mode {
            return;
        }

        self.frees += 1;

        let addr = ptr as usize;
        if addr == &ZERO_SIZED_ALLOC as *const u8 as usize {
            return;
        }

        if let Some(index) = self
            .registry
            .entries()
            .iter()
            .position(|entry| entry.start == addr)
        {
            let removed = self.registry.swap_remove(index);
            self.total_alloc -= removed.size() as u64;
        }

        self.adapter.extfree(ptr);
    }

    /// Run a full collection cycle: prepare, mark roots, drain the scan
    /// queue, sweep.
    ///
    /// Fatal when re-entered. No-op in the leaking variant (the re-entry
    /// guard is still honored).
    pub fn collect(&mut self, ctx: &mut impl GcContext) {
        if self.in_progress {
            gc_running_fatal();
        }
        if let GcMode::Leaking = self.mode {
            return;
        }

        self.in_progress = true;

        if self.registry.is_empty() {
            self.in_progress = false;
            return;
        }

        self.prepare();

        {
            let mut marker = Marker {
                registry: &mut self.registry,
                queue: &mut self.queue,
            };
            ctx.visit_stack(&mut marker);
            ctx.visit_globals(&mut marker);
            marker.finish_marking();
        }

        self.sweep();

        self.in_progress = false;
    }

    /// Accepted for source compatibility; finalizers are recorded nowhere
    /// and never run.
    pub fn set_finalizer(&mut self, _obj: *mut u8, _finalizer: *mut u8) {}

    /// Populate `m` with the current counters.
    pub fn read_mem_stats(&self, m: &mut MemStats) {
        m.heap_idle = 0;
        m.heap_inuse = self.total_alloc;
        m.heap_released = 0; // memory is never returned to the host
        m.sys = self.heap_end.saturating_sub(self.heap_start) as u64;
        m.heap_sys = m.heap_inuse + m.heap_idle;
        m.gc_sys = 0;
        m.total_alloc = self.total_alloc;
        m.mallocs = self.mallocs;
        m.frees = match self.mode {
            GcMode::Tracing => self.frees,
            GcMode::Leaking => 0,
        };
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &AllocationRegistry {
        &self.registry
    }

    /// Sort the registry and reset all per-cycle state.
    fn prepare(&mut self) {
        self.registry.sort_by_start();
        for entry in self.registry.entries_mut() {
            entry.marked = false;
            entry.next = NO_INDEX;
        }
        self.queue.clear();

        debug_assert!(
            self.registry.is_sorted(),
            "allocation registry is not sorted"
        );
    }

    /// Drop every unmarked allocation and recompute the byte accounting.
    fn sweep(&mut self) {
        let adapter = &mut self.adapter;
        let frees = &mut self.frees;
        let mut total: u64 = 0;

        self.registry.compact(|entry| {
            if entry.marked {
                total += entry.size() as u64;
                return true;
            }
            *frees += 1;
            adapter.extfree(entry.start as *mut u8);
            false
        });

        self.total_alloc = total;
    }

    /// Double the usage limit until the allocation fits, saturating at
    /// all-ones when doubling would wrap.
    fn grow_usage_limit(&mut self, size: usize) {
        while self.usage_limit != 0 && self.total_alloc + size as u64 > self.usage_limit as u64 {
            self.usage_limit <<= 1;
        }
        if self.usage_limit == 0 {
            self.usage_limit = usize::MAX;
        }
    }

    /// Install a doubled registry buffer obtained from the adapter.
    ///
    /// Returns false when the adapter is exhausted. The replaced buffer is
    /// handed straight back to the adapter and accounted through the free
    /// counter only; registry storage is never a registry record.
    fn grow_registry(&mut self) -> bool {
        let new_cap = self.registry.grown_capacity();
        let new_buf = self
            .adapter
            .extalloc(AllocationRegistry::buffer_bytes(new_cap));
        if new_buf.is_null() {
            return false;
        }

        let (old_buf, old_cap) = unsafe {
            self.registry
                .replace_buffer(new_buf as *mut Allocation, new_cap)
        };
        if old_cap != 0 {
            self.frees += 1;
            self.adapter.extfree(old_buf as *mut u8);
        }
        true
    }
}

impl<A: ExtAllocator> Drop for Heap<A> {
    fn drop(&mut self) {
        // The deployed heap lives for the whole program; this path exists
        // so hosted embedders and tests stay leak-clean.
        for index in 0..self.registry.len() {
            let start = self.registry.entries()[index].start;
            self.adapter.extfree(start as *mut u8);
        }
        let (buffer, cap) = self.registry.take_buffer();
        if cap != 0 {
            self.adapter.extfree(buffer as *mut u8);
        }
    }
}

/// Marking front end for one collection cycle.
///
/// Borrows the registry and the scan queue for the duration of the root
/// walk, and implements [`RootVisitor`] so runtimes can feed it raw byte
/// ranges.
pub struct Marker<'a> {
    registry: &'a mut AllocationRegistry,
    queue: &'a mut ScanQueue,
}

impl RootVisitor for Marker<'_> {
    fn visit_range(&mut self, start: usize, end: usize) {
        self.scan_range(start, end);
    }
}

impl Marker<'_> {
    /// Conservatively scan the byte range `[start, end)`.
    ///
    /// Every pointer-aligned word fully contained in the range is loaded
    /// and treated as a candidate address. One extra load covers the final
    /// pointer-sized window ending exactly at `end`, catching pointers
    /// stored flush against an unaligned range end.
    fn scan_range(&mut self, start: usize, end: usize) {
        let aligned = (start + WORD_ALIGN - 1) & !(WORD_ALIGN - 1);

        let mut addr = aligned;
        while addr + WORD_SIZE <= end {
            let word = unsafe { *(addr as *const usize) };
            self.mark(word);
            addr += WORD_ALIGN;
        }

        if end >= aligned + WORD_SIZE {
            let word = unsafe { ptr::read_unaligned((end - WORD_SIZE) as *const usize) };
            self.mark(word);
        }
    }

    /// Mark the allocation containing `addr`, if any.
    ///
    /// Returns true iff the allocation transitioned from unmarked to
    /// marked; marked allocations are enqueued for scanning exactly once.
    fn mark(&mut self, addr: usize) -> bool {
        let entries = self.registry.entries();
        if entries.is_empty() {
            return false;
        }

        // Cheap rejection for addresses outside the allocated bounds.
        if addr < entries[0].start || addr > entries[entries.len() - 1].end {
            return false;
        }

        match self.registry.search(addr) {
            Some(index) => {
                let entries = self.registry.entries_mut();
                if entries[index].marked {
                    return false;
                }
                entries[index].marked = true;
                self.queue.push(entries, index);
                true
            }
            None => false,
        }
    }

    /// Drain the scan queue.
    ///
    /// Scanning an allocation may enqueue more allocations; the loop
    /// terminates because each record can be pushed at most once per cycle.
    fn finish_marking(&mut self) {
        while let Some(index) = self.queue.pop(self.registry.entries_mut()) {
            let entry = self.registry.entries()[index];
            self.scan_range(entry.start, entry.end);
        }
    }
}

/// Round `size` up to the pointer alignment.
#[inline]
const fn align_word(size: usize) -> usize {
    (size + WORD_ALIGN - 1) & !(WORD_ALIGN - 1)
}

#[cold]
fn gc_running_fatal() -> ! {
    panic!("garbage collector is running");
}

#[cold]
fn oom_fatal() -> ! {
    panic!("out of memory");
}

#[cold]
fn overflow_fatal() -> ! {
    panic!("total allocation size overflow");
}
