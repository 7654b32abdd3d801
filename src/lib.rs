//! Lumo runtime memory core
//!
//! This crate provides the memory-safety core statically linked into
//! embeddings of the Lumo interpreter: a block-based heap with an
//! integrated mark-sweep collector, an explicit root stack for values the
//! tracing phase cannot otherwise discover, and a recovery-point stack for
//! non-local error transfer.
//!
//! The object model and interpreter live outside this crate; they consume
//! the heap, root and unwind primitives and inject object-graph knowledge
//! as closures where collection needs it.

pub mod error;
pub mod logging;

pub mod gc;
pub mod heap;
pub mod roots;
pub mod unwind;

/// Opaque object pointer exchanged with the object system.
pub type ObjPtr = *mut u8;

// Re-export core types
pub use error::{HeapError, HeapResult};
pub use heap::{BlockId, BlockState, Heap, HeapSummary, SweepStats, BYTES_PER_BLOCK};
pub use roots::{RootEntry, RootGuard, RootStack};
pub use unwind::{FrameHandle, Protected, Thrown, UnwindStack};

/// Runtime initialization for C-hosted embeddings: logging plus the
/// process-wide heap. Returns false if the region is too small to hold a
/// table byte's worth of blocks.
#[no_mangle]
pub extern "C" fn lumo_runtime_init(heap_bytes: usize) -> bool {
    logging::init_runtime_logging();
    logging::log_runtime_init();
    heap::init(heap_bytes).is_ok()
}

/// Final shutdown hook. The heap region itself lives for the process.
#[no_mangle]
pub extern "C" fn lumo_runtime_shutdown() {
    logging::log_runtime_shutdown();
}
