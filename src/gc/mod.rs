//! Collection orchestration - mark worklist and sweep driver
//!
//! The object graph stays outside this crate: the caller injects a
//! `trace_children` closure that reports each child pointer of a live
//! object. This module owns the loop mechanics: seeding the worklist from
//! root pointers, draining it, then sweeping unreached allocations.
//!
//! Collection is stop-the-world with respect to heap mutation; the caller
//! holds the heap for the duration (`&mut Heap`, or the global heap's
//! mutex), and a re-entrant lock lets table-sensitive critical sections
//! suppress collection entirely.


use crate::heap::{BlockId, BlockState, Heap};
use crate::logging::{debug, log_gc_complete, log_gc_mark, log_gc_start};
use crate::ObjPtr;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Statistics from one collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Objects proven reachable during the mark phase.
    pub marked_objects: usize,
    /// Unreached allocations freed by the sweep.
    pub swept_objects: usize,
    /// Bytes returned to the free pool.
    pub reclaimed_bytes: usize,
    /// Allocations that survived.
    pub live_objects: usize,
    /// Wall-clock duration of the pass.
    pub duration_us: u64,
}

static LOCK_DEPTH: AtomicUsize = AtomicUsize::new(0);
static COLLECTIONS: AtomicUsize = AtomicUsize::new(0);

/// Prevent collection while the returned guard lives. Re-entrant.
pub fn lock() -> GcLockGuard {
    LOCK_DEPTH.fetch_add(1, Ordering::AcqRel);
    GcLockGuard { _priv: () }
}

/// Whether collection is currently suppressed.
#[inline]
pub fn is_locked() -> bool {
    LOCK_DEPTH.load(Ordering::Acquire) > 0
}

/// Number of collection passes completed since process start.
pub fn collections_run() -> usize {
    COLLECTIONS.load(Ordering::Relaxed)
}

/// RAII guard holding the collection lock.
pub struct GcLockGuard {
    _priv: (),
}

impl Drop for GcLockGuard {
    fn drop(&mut self) {
        LOCK_DEPTH.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Run one full mark-sweep pass.
///
/// `roots` is every pointer that must be treated as reachable: the root
/// stack snapshot chained with whatever the embedding's native-stack scan
/// produced. `trace_children` receives each live object and a sink to
/// report its child pointers into. Pointers that do not resolve into the
/// pool, or land on tail or free blocks, are ignored.
///
/// Returns `None` when the collection lock is held.
pub fn collect<R, F>(heap: &mut Heap, roots: R, mut trace_children: F) -> Option<GcStats>
where
    R: IntoIterator<Item = ObjPtr>,
    F: FnMut(ObjPtr, &mut dyn FnMut(ObjPtr)),
{
    if is_locked() {
        debug!(target: "gc", "collection suppressed by gc lock");
        return None;
    }

    let start = Instant::now();
    log_gc_start();

    // Mark phase: seed from the roots, then drain the worklist.
    let mut pending: VecDeque<BlockId> = VecDeque::new();
    let mut marked = 0usize;
    for ptr in roots {
        mark_candidate(heap, ptr, &mut pending, &mut marked);
    }
    while let Some(block) = pending.pop_front() {
        let object = heap.block_ptr(block);
        let mut sink = |child: ObjPtr| mark_candidate(heap, child, &mut pending, &mut marked);
        trace_children(object, &mut sink);
    }
    log_gc_mark(marked);

    // Sweep phase: everything still unmarked goes back to the free pool.
    let swept = heap.sweep();

    COLLECTIONS.fetch_add(1, Ordering::Relaxed);
    let duration_us = start.elapsed().as_micros() as u64;
    log_gc_complete(duration_us, swept.reclaimed_bytes, swept.live_objects);

    Some(GcStats {
        marked_objects: marked,
        swept_objects: swept.swept_objects,
        reclaimed_bytes: swept.reclaimed_bytes,
        live_objects: swept.live_objects,
        duration_us,
    })
}

/// Collect using the process-wide heap and root stack.
pub fn collect_global<F>(trace_children: F) -> Option<GcStats>
where
    F: FnMut(ObjPtr, &mut dyn FnMut(ObjPtr)),
{
    let roots = crate::roots::snapshot();
    crate::heap::with_heap(|heap| collect(heap, roots, trace_children))
}

/// Resolve a candidate pointer and mark it if it is an unvisited object
/// start. Marked blocks have already been queued once.
fn mark_candidate(
    heap: &mut Heap,
    ptr: ObjPtr,
    pending: &mut VecDeque<BlockId>,
    marked: &mut usize,
) {
    if ptr.is_null() {
        return;
    }
    let Some(block) = heap.block_for_ptr(ptr) else {
        return;
    };
    if heap.block_state(block) == BlockState::Head {
        heap.mark(block);
        pending.push_back(block);
        *marked += 1;
    }
}
