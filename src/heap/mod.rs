//! Block heap - allocation table plus first-fit block allocator
//!
//! Design: one contiguous region split at init into a packed 2-bit
//! allocation table and a pool of fixed-size blocks, with every pool block
//! governed by exactly one table entry. Allocation is a first-fit scan for
//! a run of free table lanes; free and resize rewrite the run in place.
//! A cursor remembers the lowest index that may still be free, bounding
//! rescans without ever being required for correctness.

mod region;
mod report;
mod table;
mod walk;


pub use report::{HeapSummary, TableDump};
pub use table::{BlockId, BlockState, BLOCKS_PER_TABLE_BYTE};
pub use walk::SweepStats;

use crate::error::{HeapError, HeapResult};
use crate::logging::{debug, log_allocation, log_free, log_protocol_violation, warn};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use region::Region;
use std::ptr::NonNull;
use table::AllocTable;

/// Machine words per pool block.
pub const WORDS_PER_BLOCK: usize = 4;

/// Bytes per pool block - the allocation granularity.
pub const BYTES_PER_BLOCK: usize = WORDS_PER_BLOCK * std::mem::size_of::<usize>();

/// Block-based heap with an integrated mark-sweep state machine.
///
/// All mutating operations run to completion under a single mutator; the
/// process-wide instance behind [`init`]/[`with_heap`] is serialized by a
/// mutex, and an embedding holding its own `Heap` must serialize access
/// itself.
pub struct Heap {
    region: Region,
    table: AllocTable,
    pool: NonNull<u8>,
    /// Lowest block index not yet proven non-free; a scan-avoidance hint.
    scan_start: usize,
    /// Bytes handed out since the last sweep, for collection pressure.
    alloc_since_sweep: usize,
    collect_threshold: Option<usize>,
}

// Safety: the table and pool pointers target the uniquely owned region;
// access is serialized by &mut self (or the global mutex).
unsafe impl Send for Heap {}

impl Heap {
    /// Create a heap over a fresh region of `total_bytes`.
    ///
    /// The table is sized so that every one of its lanes is backed by a
    /// pool block: one table byte governs four blocks, so the split solves
    /// `table_bytes * (1 + 4 * BYTES_PER_BLOCK) <= total_bytes`, with the
    /// pool start aligned up and the pool end rounded down to a block
    /// boundary. Fails only if the region cannot hold one table byte's
    /// worth of blocks.
    pub fn new(total_bytes: usize) -> HeapResult<Self> {
        let mut table_bytes = total_bytes / (1 + BLOCKS_PER_TABLE_BYTE * BYTES_PER_BLOCK);
        // Aligning the pool start can consume pool space; give back table
        // bytes until the table's capacity is fully backed.
        while table_bytes > 0 {
            let pool_offset = ceil_to(table_bytes, BYTES_PER_BLOCK);
            if pool_offset + table_bytes * BLOCKS_PER_TABLE_BYTE * BYTES_PER_BLOCK <= total_bytes {
                break;
            }
            table_bytes -= 1;
        }
        if table_bytes == 0 {
            return Err(HeapError::RegionTooSmall { total_bytes });
        }

        let num_blocks = table_bytes * BLOCKS_PER_TABLE_BYTE;
        let pool_offset = ceil_to(table_bytes, BYTES_PER_BLOCK);
        debug_assert!(pool_offset % BYTES_PER_BLOCK == 0);
        debug_assert!(pool_offset + num_blocks * BYTES_PER_BLOCK <= total_bytes);

        let region = Region::new(total_bytes, BYTES_PER_BLOCK).ok_or(HeapError::OutOfMemory)?;
        let base = region.base();
        // Safety: table and pool are disjoint slices of the zero-filled
        // region, which the returned heap keeps alive.
        let (table, pool) = unsafe {
            (
                AllocTable::from_raw(base, num_blocks),
                NonNull::new_unchecked(base.as_ptr().add(pool_offset)),
            )
        };

        debug!(
            target: "heap",
            total_bytes,
            table_bytes,
            num_blocks,
            block_size = BYTES_PER_BLOCK,
            "heap initialized"
        );

        Ok(Self {
            region,
            table,
            pool,
            scan_start: 0,
            alloc_since_sweep: 0,
            collect_threshold: None,
        })
    }

    /// Number of pool blocks.
    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.table.len()
    }

    /// Pool capacity in bytes.
    #[inline]
    pub fn capacity_bytes(&self) -> usize {
        self.num_blocks() * BYTES_PER_BLOCK
    }

    /// Total region size, table included.
    #[inline]
    pub fn region_bytes(&self) -> usize {
        self.region.len()
    }

    /// Current table state of a block.
    #[inline]
    pub fn block_state(&self, id: BlockId) -> BlockState {
        self.table.get(id.0)
    }

    /// Allocate at least `n_bytes`, rounded up to whole blocks.
    ///
    /// Zero bytes is "no allocation", not a zero-length run. On failure
    /// the table is untouched and `OutOfMemory` is returned for the caller
    /// to translate (typically: collect and retry).
    pub fn allocate(&mut self, n_bytes: usize) -> HeapResult<Option<BlockId>> {
        if n_bytes == 0 {
            return Ok(None);
        }
        let n_blocks = n_bytes.div_ceil(BYTES_PER_BLOCK);

        let Some(head) = self.find_free_run(n_blocks) else {
            debug!(target: "heap", n_bytes, n_blocks, "allocation failed");
            return Err(HeapError::OutOfMemory);
        };

        self.table.set(head, BlockState::Head);
        for block in head + 1..head + n_blocks {
            self.table.set(block, BlockState::Tail);
        }

        // A single consumed block proves everything below head+1 non-free
        // for the next scan; a multi-block run may have skipped free
        // singles behind it, so the cursor must not move.
        if n_blocks == 1 {
            self.scan_start = head + 1;
        }

        self.alloc_since_sweep += n_blocks * BYTES_PER_BLOCK;
        log_allocation(n_bytes, head, n_blocks);
        Ok(Some(BlockId(head)))
    }

    /// First-fit search for `n_blocks` consecutive free lanes, starting at
    /// the cursor. Runs may span table byte boundaries; whole zero bytes
    /// are skipped four lanes at a time.
    fn find_free_run(&self, n_blocks: usize) -> Option<usize> {
        let total = self.table.len();
        let mut run_start = self.scan_start;
        let mut run = 0usize;
        let mut i = self.scan_start;
        while i < total {
            let step = if i % BLOCKS_PER_TABLE_BYTE == 0
                && i + BLOCKS_PER_TABLE_BYTE <= total
                && self.table.raw_byte(i / BLOCKS_PER_TABLE_BYTE) == 0
            {
                BLOCKS_PER_TABLE_BYTE
            } else if self.table.get(i) == BlockState::Free {
                1
            } else {
                0
            };

            if step == 0 {
                run = 0;
                i += 1;
                run_start = i;
            } else {
                run += step;
                i += step;
                if run >= n_blocks {
                    return Some(run_start);
                }
            }
        }
        None
    }

    /// Release a live allocation.
    ///
    /// The id must reference a head block; anything else is a bug in the
    /// calling layer, reported and left untouched.
    pub fn free(&mut self, id: BlockId) {
        let state = self.table.get(id.0);
        if state != BlockState::Head {
            self.protocol_violation("free of non-head block", id.0, state);
            return;
        }

        let blocks = self.free_run(id.0);
        if id.0 < self.scan_start {
            self.scan_start = id.0;
        }
        log_free(id.0, blocks * BYTES_PER_BLOCK);
    }

    /// Convert a head and its contiguous tail run to free. Returns the run
    /// length in blocks.
    fn free_run(&mut self, head: usize) -> usize {
        self.table.set(head, BlockState::Free);
        let mut n = 1;
        while head + n < self.table.len() && self.table.get(head + n) == BlockState::Tail {
            self.table.set(head + n, BlockState::Free);
            n += 1;
        }
        n
    }

    /// Resize a live allocation in place where possible.
    ///
    /// `None` behaves as [`allocate`](Self::allocate); zero bytes behaves
    /// as [`free`](Self::free) and returns no allocation. Growth prefers
    /// the free blocks directly behind the run; only with `allow_move` set
    /// will the data be copied to a fresh run. Any failure leaves the
    /// original allocation fully intact.
    pub fn resize(
        &mut self,
        id: Option<BlockId>,
        n_bytes: usize,
        allow_move: bool,
    ) -> HeapResult<Option<BlockId>> {
        let Some(id) = id else {
            return self.allocate(n_bytes);
        };
        if n_bytes == 0 {
            self.free(id);
            return Ok(None);
        }

        let state = self.table.get(id.0);
        if state != BlockState::Head {
            self.protocol_violation("resize of non-head block", id.0, state);
            return Ok(Some(id));
        }

        let new_blocks = n_bytes.div_ceil(BYTES_PER_BLOCK);
        let n_existing = self.run_blocks(id.0);

        if new_blocks == n_existing {
            return Ok(Some(id));
        }

        if new_blocks < n_existing {
            // Partial free of the excess tail.
            for block in id.0 + new_blocks..id.0 + n_existing {
                self.table.set(block, BlockState::Free);
            }
            if id.0 + new_blocks < self.scan_start {
                self.scan_start = id.0 + new_blocks;
            }
            log_free(id.0 + new_blocks, (n_existing - new_blocks) * BYTES_PER_BLOCK);
            return Ok(Some(id));
        }

        // Count free blocks directly behind the run, stopping as soon as
        // enough are known.
        let mut n_avail = n_existing;
        while n_avail < new_blocks {
            let block = id.0 + n_avail;
            if block >= self.table.len() || self.table.get(block) != BlockState::Free {
                break;
            }
            n_avail += 1;
        }

        if n_avail >= new_blocks {
            // Pure in-place growth, no copy.
            for block in id.0 + n_existing..id.0 + new_blocks {
                self.table.set(block, BlockState::Tail);
            }
            self.alloc_since_sweep += (new_blocks - n_existing) * BYTES_PER_BLOCK;
            log_allocation(n_bytes, id.0, new_blocks - n_existing);
            return Ok(Some(id));
        }

        if !allow_move {
            return Err(HeapError::OutOfMemory);
        }

        // Move: fresh run, copy the old contents, release the old run.
        let Some(new_id) = self.allocate(n_bytes)? else {
            // n_bytes > 0 was checked above
            return Err(HeapError::OutOfMemory);
        };
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.pool_ptr(id.0),
                self.pool_ptr(new_id.0),
                n_existing * BYTES_PER_BLOCK,
            );
        }
        self.free(id);
        Ok(Some(new_id))
    }

    /// Length in blocks of the run starting at `head`.
    fn run_blocks(&self, head: usize) -> usize {
        let mut n = 1;
        while head + n < self.table.len() && self.table.get(head + n) == BlockState::Tail {
            n += 1;
        }
        n
    }

    #[inline]
    fn pool_ptr(&self, block: usize) -> *mut u8 {
        unsafe { self.pool.as_ptr().add(block * BYTES_PER_BLOCK) }
    }

    /// Raw address of a block's storage.
    #[inline]
    pub fn block_ptr(&self, id: BlockId) -> *mut u8 {
        self.pool_ptr(id.0)
    }

    /// Resolve an arbitrary pointer to the pool block containing it.
    ///
    /// Used by the tracing phase to map object pointers found in roots or
    /// scanned stacks back onto the table. Pointers outside the pool
    /// resolve to `None`; the caller decides what the block's state means.
    pub fn block_for_ptr(&self, ptr: *const u8) -> Option<BlockId> {
        let base = self.pool.as_ptr() as usize;
        let addr = ptr as usize;
        if addr < base || addr >= base + self.capacity_bytes() {
            return None;
        }
        Some(BlockId((addr - base) / BYTES_PER_BLOCK))
    }

    /// Bytes backing a live allocation.
    pub fn data(&self, id: BlockId) -> &[u8] {
        let len = self.run_length(id);
        unsafe { std::slice::from_raw_parts(self.pool_ptr(id.0), len) }
    }

    /// Mutable bytes backing a live allocation.
    pub fn data_mut(&mut self, id: BlockId) -> &mut [u8] {
        let len = self.run_length(id);
        unsafe { std::slice::from_raw_parts_mut(self.pool_ptr(id.0), len) }
    }

    /// Configure the advisory collection threshold: bytes handed out since
    /// the last sweep. `None` disables pressure tracking.
    pub fn set_collect_threshold(&mut self, bytes: Option<usize>) {
        self.collect_threshold = bytes;
    }

    /// Whether enough allocation pressure has built up to warrant a
    /// collection. Advisory only; the object system decides when to act.
    #[inline]
    pub fn collection_due(&self) -> bool {
        self.collect_threshold
            .is_some_and(|threshold| self.alloc_since_sweep >= threshold)
    }

    fn protocol_violation(&self, detail: &str, block: usize, state: BlockState) {
        log_protocol_violation("heap", detail);
        debug_assert!(false, "{detail}: block {block} in state {state:?}");
    }
}

fn ceil_to(n: usize, chunk: usize) -> usize {
    n.div_ceil(chunk) * chunk
}

/// Process-wide heap used by the `extern "C"` embedding surface.
static HEAP: OnceCell<Mutex<Heap>> = OnceCell::new();

/// Initialize the process-wide heap. A second call is ignored with a
/// warning; the region lives until process exit.
pub fn init(total_bytes: usize) -> HeapResult<()> {
    let heap = Heap::new(total_bytes)?;
    if HEAP.set(Mutex::new(heap)).is_err() {
        warn!(target: "heap", "heap already initialized");
    }
    Ok(())
}

/// Whether [`init`] has completed.
pub fn is_initialized() -> bool {
    HEAP.get().is_some()
}

/// Run `f` with the process-wide heap locked.
///
/// Panics if [`init`] was never called; using the heap before init is a
/// startup-order bug in the embedding, not a runtime condition.
pub fn with_heap<R>(f: impl FnOnce(&mut Heap) -> R) -> R {
    let Some(heap) = HEAP.get() else {
        panic!("heap used before init");
    };
    f(&mut heap.lock())
}
