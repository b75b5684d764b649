//! Scan queue for the mark phase.
//!
//! A LIFO worklist of marked-but-not-yet-scanned allocations, threaded
//! through the `next` field of the registry records themselves. Using the
//! records avoids allocating during a collection, which would be incorrect
//! while the registry is being mutated. Links are registry indices rather
//! than references; the registry never grows during a cycle, so indices
//! stay stable for the whole mark phase.

use crate::registry::{Allocation, NO_INDEX};

/// Queue of allocations waiting to be scanned.
pub(crate) struct ScanQueue {
    head: usize,
}

impl ScanQueue {
    pub const fn new() -> ScanQueue {
        ScanQueue { head: NO_INDEX }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.head = NO_INDEX;
    }

    /// Push `entries[index]` onto the queue.
    ///
    /// Only unmarked records may be pushed, and the caller marks them at
    /// the instant of the push; that is what bounds the drain loop.
    #[inline]
    pub fn push(&mut self, entries: &mut [Allocation], index: usize) {
        entries[index].next = self.head;
        self.head = index;
    }

    /// Pop the most recently pushed record, resetting its link.
    #[inline]
    pub fn pop(&mut self, entries: &mut [Allocation]) -> Option<usize> {
        if self.head == NO_INDEX {
            return None;
        }
        let index = self.head;
        self.head = entries[index].next;
        entries[index].next = NO_INDEX;
        Some(index)
    }
}
