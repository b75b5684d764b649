//! Conservative mark-sweep garbage collection over a host-provided allocator.
//!
//! The collector owns no memory of its own: every byte, including the
//! bookkeeping table, comes from an external allocator reached through the
//! [`ExtAllocator`] trait. The collector owns only policy (when to collect,
//! when to grow the heap) and the structures that make conservative tracing
//! possible when the allocator provides no object metadata.
//!
//! Key types:
//! - `Heap`: the allocation API, growth controller, and collector driver
//! - `MemStats`: snapshot of the allocator and collector counters
//! - `Marker`: the per-cycle marking front end handed to root enumerators
//!
//! Key traits:
//! - `ExtAllocator`: implemented over the host's malloc/free primitives
//! - `GcContext`: implemented by the runtime, provides stack and global roots
//! - `RootVisitor`: implemented by the collector, consumes root byte ranges

#![no_std]

#[cfg(test)]
extern crate alloc;

mod adapter;
mod heap;
mod registry;
mod scan_queue;
mod stats;
#[cfg(feature = "system")]
mod system;
mod visitor;

pub use adapter::ExtAllocator;
pub use heap::{GcMode, Heap, Marker};
pub use stats::MemStats;
#[cfg(feature = "system")]
pub use system::SystemExtAllocator;
pub use visitor::{GcContext, RootVisitor};
