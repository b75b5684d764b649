//! Memory statistics snapshot.

/// Counters describing the heap, in the fixed shape the embedder consumes.
///
/// Populated by [`Heap::read_mem_stats`](crate::Heap::read_mem_stats).
/// Memory is never released back to the host, so `heap_released` and
/// `heap_idle` are always zero and `heap_sys` equals `heap_inuse`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemStats {
    /// Bytes of tracked heap allocations, header prefixes included.
    pub heap_inuse: u64,
    /// Always zero.
    pub heap_idle: u64,
    /// Always zero.
    pub heap_released: u64,
    /// `heap_inuse + heap_idle`.
    pub heap_sys: u64,
    /// Always zero.
    pub gc_sys: u64,
    /// Equal to `heap_inuse`.
    pub total_alloc: u64,
    /// Extent of the linear memory, as recorded by the embedder.
    pub sys: u64,
    /// Successful calls to `alloc`.
    pub mallocs: u64,
    /// Calls forwarded to the external allocator's free, explicit and swept.
    /// Constant zero in the leaking variant.
    pub frees: u64,
}
