//! Process-wide heap and the module's exported surface.
//!
//! The heap lives in a static for the lifetime of the module; there is no
//! teardown. The target exposes no parallelism, so the one wasm thread is
//! the only accessor of the statics below.

use core::ptr::addr_of_mut;

use extalloc_gc::{GcContext, Heap, MemStats, RootVisitor};

use crate::debug::DebugRing;
use crate::host::HostAllocator;

const WASM_PAGE_SIZE: usize = 64 * 1024;

// Memory-layout symbols provided by the linker.
extern "C" {
    static __heap_base: u8;
    static __data_end: u8;
    static __global_base: u8;
    static __stack_high: u8;
}

#[cfg(not(feature = "leaking"))]
static mut HEAP: Heap<HostAllocator> = Heap::new(HostAllocator);
#[cfg(feature = "leaking")]
static mut HEAP: Heap<HostAllocator> = Heap::leaking(HostAllocator);

static mut DEBUG_RING: DebugRing = DebugRing::new();

fn heap() -> &'static mut Heap<HostAllocator> {
    unsafe { &mut *addr_of_mut!(HEAP) }
}

fn debug_ring() -> &'static mut DebugRing {
    unsafe { &mut *addr_of_mut!(DEBUG_RING) }
}

/// Stack and data-segment roots of the running module.
struct WasmRoots;

impl GcContext for WasmRoots {
    fn visit_stack(&mut self, visitor: &mut impl RootVisitor) {
        // The scan is conservative, so the address of any local bounds the
        // live stack extent from below.
        let anchor = 0u8;
        let low = &anchor as *const u8 as usize;
        let high = unsafe { &__stack_high as *const u8 as usize };
        if low < high {
            visitor.visit_range(low, high);
        }
    }

    fn visit_globals(&mut self, visitor: &mut impl RootVisitor) {
        let low = unsafe { &__global_base as *const u8 as usize };
        let high = unsafe { &__data_end as *const u8 as usize };
        if low < high {
            visitor.visit_range(low, high);
        }
    }
}

extern "C" {
    // Provided by the embedding program.
    fn program_main();
}

/// Module entry: record the linear-memory extent, then run the program.
#[no_mangle]
pub extern "C" fn _start() {
    let start = unsafe { &__heap_base as *const u8 as usize };
    let end = core::arch::wasm32::memory_size::<0>() * WASM_PAGE_SIZE;
    heap().set_heap_extent(start, end);

    unsafe { program_main() };
}

/// Allocate `size` zeroed bytes.
///
/// The layout argument is accepted for ABI compatibility and ignored;
/// conservative scanning needs no layout information.
#[no_mangle]
pub extern "C" fn alloc(size: usize, _layout: *mut u8) -> *mut u8 {
    if cfg!(feature = "gc-debug") {
        let ring = debug_ring();
        ring.write_str("alloc(");
        ring.write_num(size as u64);
        ring.write_str(")\n\tused memory ");
        ring.write_num(heap().heap_in_use());
        ring.write_str("\n");
    }

    heap().alloc(&mut WasmRoots, size).as_ptr()
}

#[no_mangle]
pub extern "C" fn free(ptr: *mut u8) {
    heap().free(ptr);
}

/// Run a full collection cycle against the module's roots.
#[export_name = "GC"]
pub extern "C" fn collect_garbage() {
    heap().collect(&mut WasmRoots);
}

/// Accepted and ignored; finalizers are never run.
#[export_name = "SetFinalizer"]
pub extern "C" fn set_finalizer(obj: *mut u8, finalizer: *mut u8) {
    heap().set_finalizer(obj, finalizer);
}

#[export_name = "ReadMemStats"]
pub extern "C" fn read_mem_stats(stats: *mut MemStats) {
    if let Some(stats) = unsafe { stats.as_mut() } {
        heap().read_mem_stats(stats);
    }
}

/// Base address of the debug ring, for the host to read back.
#[export_name = "_debug_buf"]
pub extern "C" fn debug_buf() -> *const u8 {
    debug_ring().base()
}

/// One-line statistics dump into the debug ring.
#[export_name = "_write_debug_info"]
pub extern "C" fn write_debug_info() {
    if !cfg!(feature = "gc-debug") {
        return;
    }

    let mut stats = MemStats::default();
    heap().read_mem_stats(&mut stats);

    let ring = debug_ring();
    ring.write_str("gc: mallocs=");
    ring.write_num(stats.mallocs);
    ring.write_str(" frees=");
    ring.write_num(stats.frees);
    ring.write_str(" heap_inuse=");
    ring.write_num(stats.heap_inuse);
    ring.write_str("\n");
}

// The module's failure mode is a host-observable trap.
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    core::arch::wasm32::unreachable()
}
