//! Bindings to the embedder's allocator imports.

use extalloc_gc::ExtAllocator;

#[link(wasm_import_module = "env")]
extern "C" {
    #[link_name = "ext_allocator_malloc_version_1"]
    fn ext_allocator_malloc(size: usize) -> *mut u8;

    #[link_name = "ext_allocator_free_version_1"]
    fn ext_allocator_free(ptr: *mut u8);
}

/// Adapter over the host's allocator imports.
pub struct HostAllocator;

impl ExtAllocator for HostAllocator {
    fn extalloc(&mut self, size: usize) -> *mut u8 {
        unsafe { ext_allocator_malloc(size) }
    }

    fn extfree(&mut self, ptr: *mut u8) {
        unsafe { ext_allocator_free(ptr) }
    }
}
