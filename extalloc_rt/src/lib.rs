//! Hosted-wasm runtime shell for the collector.
//!
//! Binds the collector core to an embedder that grants and reclaims memory
//! through two imports, `ext_allocator_malloc_version_1` and
//! `ext_allocator_free_version_1`, and exports the module entry point, the
//! allocation surface, and the debug ring the host reads back.
//!
//! Build-time selectors:
//! - `leaking`: the process heap becomes the leaking variant
//! - `gc-debug`: the debug ring records allocation traffic and stats dumps
//!
//! The wasm-only surface is compiled for `wasm32` targets; the debug ring
//! itself is target-independent so it can be exercised on the host.

#![no_std]

pub mod debug;

#[cfg(target_arch = "wasm32")]
mod host;
#[cfg(target_arch = "wasm32")]
mod runtime;

pub use debug::DebugRing;
#[cfg(target_arch = "wasm32")]
pub use host::HostAllocator;
