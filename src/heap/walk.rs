//! Collector walk - table-driven live-object enumeration and marking
//!
//! The tracing phase lives outside this crate; what it needs from the heap
//! is the ability to enumerate live allocations, measure them, and flip
//! heads between `Head` and `Mark`. Sweep is the one pass that consumes the
//! marks: everything still `Head` afterward was unreached and goes back to
//! the free pool.

use super::table::{BlockId, BlockState};
use super::{Heap, BYTES_PER_BLOCK};
use crate::logging::log_gc_sweep;

/// Result of a sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Unreached allocations returned to the free pool.
    pub swept_objects: usize,
    /// Bytes those allocations occupied.
    pub reclaimed_bytes: usize,
    /// Marked allocations that survived the pass.
    pub live_objects: usize,
}

impl Heap {
    /// First live block (head or marked head) in the pool.
    pub fn first_live(&self) -> Option<BlockId> {
        self.live_from(0)
    }

    /// Next live block strictly after `id`.
    pub fn next_live(&self, id: BlockId) -> Option<BlockId> {
        self.live_from(id.0 + 1)
    }

    fn live_from(&self, start: usize) -> Option<BlockId> {
        (start..self.table.len())
            .find(|&block| matches!(self.table.get(block), BlockState::Head | BlockState::Mark))
            .map(BlockId)
    }

    /// Iterator over every live allocation, in address order.
    pub fn live_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        let mut next = self.first_live();
        std::iter::from_fn(move || {
            let current = next?;
            next = self.next_live(current);
            Some(current)
        })
    }

    /// Storage footprint of a live allocation in bytes: the head block plus
    /// its contiguous tail run.
    pub fn run_length(&self, id: BlockId) -> usize {
        let state = self.table.get(id.0);
        if !matches!(state, BlockState::Head | BlockState::Mark) {
            self.protocol_violation("run_length of non-head block", id.0, state);
            return 0;
        }
        self.run_blocks(id.0) * BYTES_PER_BLOCK
    }

    /// Flag a head block as reachable for the current collection pass.
    ///
    /// Marking anything but a plain `Head` (including a block already
    /// marked) is a protocol violation by the tracing phase.
    pub fn mark(&mut self, id: BlockId) {
        let state = self.table.get(id.0);
        if state != BlockState::Head {
            self.protocol_violation("mark of non-head block", id.0, state);
            return;
        }
        self.table.set(id.0, BlockState::Mark);
    }

    /// Exact inverse of [`mark`](Self::mark), valid only on marked blocks.
    pub fn unmark(&mut self, id: BlockId) {
        let state = self.table.get(id.0);
        if state != BlockState::Mark {
            self.protocol_violation("unmark of non-marked block", id.0, state);
            return;
        }
        self.table.set(id.0, BlockState::Head);
    }

    /// Whether the block is flagged reachable in the current pass.
    #[inline]
    pub fn is_marked(&self, id: BlockId) -> bool {
        self.table.get(id.0) == BlockState::Mark
    }

    /// Sweep pass: free every allocation still unmarked, restore every
    /// marked head, and reset the allocation-pressure counter. One linear
    /// walk over the table.
    pub fn sweep(&mut self) -> SweepStats {
        let mut stats = SweepStats::default();
        let mut block = 0;
        while block < self.table.len() {
            match self.table.get(block) {
                BlockState::Head => {
                    let run = self.free_run(block);
                    if block < self.scan_start {
                        self.scan_start = block;
                    }
                    stats.swept_objects += 1;
                    stats.reclaimed_bytes += run * BYTES_PER_BLOCK;
                    block += run;
                }
                BlockState::Mark => {
                    self.table.set(block, BlockState::Head);
                    stats.live_objects += 1;
                    block += 1;
                }
                _ => block += 1,
            }
        }
        self.alloc_since_sweep = 0;
        log_gc_sweep(stats.swept_objects, stats.reclaimed_bytes);
        stats
    }
}
