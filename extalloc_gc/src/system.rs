//! Hosted adapter over the process allocator.
//!
//! Stands in for the wasm host imports when the collector runs on an
//! ordinary target: demos, benchmarks, and the test suite. The host
//! primitive frees by address alone, so the adapter remembers the layout
//! of every region it hands out.

use core::alloc::Layout;
use core::mem;
use core::ptr::{self, NonNull};

use allocator_api2::alloc::{Allocator, Global};
use hashbrown::HashMap;

use crate::adapter::ExtAllocator;

/// External allocator backed by the process allocator.
pub struct SystemExtAllocator {
    layouts: HashMap<usize, Layout>,
    /// Remaining successful requests before the adapter reports
    /// exhaustion; `None` never fails.
    fail_after: Option<usize>,
}

impl SystemExtAllocator {
    pub fn new() -> SystemExtAllocator {
        SystemExtAllocator {
            layouts: HashMap::new(),
            fail_after: None,
        }
    }

    /// Report exhaustion after `requests` further successful requests.
    pub fn fail_after(requests: usize) -> SystemExtAllocator {
        SystemExtAllocator {
            layouts: HashMap::new(),
            fail_after: Some(requests),
        }
    }

    /// Number of regions currently outstanding.
    pub fn outstanding(&self) -> usize {
        self.layouts.len()
    }
}

impl Default for SystemExtAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtAllocator for SystemExtAllocator {
    fn extalloc(&mut self, size: usize) -> *mut u8 {
        if let Some(budget) = self.fail_after.as_mut() {
            if *budget == 0 {
                return ptr::null_mut();
            }
            *budget -= 1;
        }

        let layout = match Layout::from_size_align(size, mem::align_of::<*const ()>()) {
            Ok(layout) => layout,
            Err(_) => return ptr::null_mut(),
        };

        match Global.allocate(layout) {
            Ok(region) => {
                let region = region.cast::<u8>().as_ptr();
                self.layouts.insert(region as usize, layout);
                region
            }
            Err(_) => ptr::null_mut(),
        }
    }

    fn extfree(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        if let Some(layout) = self.layouts.remove(&(ptr as usize)) {
            unsafe { Global.deallocate(NonNull::new_unchecked(ptr), layout) };
        }
    }
}
