//! Allocation table - packed per-block state machine
//!
//! Two bits per block, four lanes per table byte. Kept packed rather than
//! widened to a byte-per-block enum array: the table lives inside the heap
//! region itself and the runtime targets memory-constrained devices.

use std::ptr::NonNull;

/// Number of 2-bit lanes packed into one table byte.
pub const BLOCKS_PER_TABLE_BYTE: usize = 4;

/// Per-block allocation state.
///
/// An allocation of n blocks is exactly one `Head` followed by n-1 `Tail`
/// entries, bounded on both sides by `Free`, another run, or the pool end.
/// `Mark` is a `Head` proven reachable during the current collection pass;
/// it collapses back to `Head` (reachable) or `Free` (swept) when the pass
/// ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockState {
    /// Unallocated.
    Free = 0,
    /// First block of a live allocation.
    Head = 1,
    /// Continuation block of a live allocation.
    Tail = 2,
    /// A head proven reachable during the current collection pass.
    Mark = 3,
}

impl BlockState {
    #[inline]
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => BlockState::Free,
            1 => BlockState::Head,
            2 => BlockState::Tail,
            _ => BlockState::Mark,
        }
    }

    /// One-character tag used by the table dump.
    pub(crate) fn tag(self) -> char {
        match self {
            BlockState::Free => '.',
            BlockState::Head => 'h',
            BlockState::Tail => 't',
            BlockState::Mark => 'm',
        }
    }
}

/// Index of a block in the pool.
///
/// A position encoding, not an owning handle: the table entry at this index
/// is the source of truth for whether the block is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    /// Raw index into the allocation table.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Packed 2-bit state array stored at the front of the heap region.
pub(crate) struct AllocTable {
    base: NonNull<u8>,
    num_blocks: usize,
}

impl AllocTable {
    /// Table bytes needed to cover `num_blocks` blocks.
    pub(crate) fn bytes_for(num_blocks: usize) -> usize {
        num_blocks.div_ceil(BLOCKS_PER_TABLE_BYTE)
    }

    /// Safety: `base` must point to at least `bytes_for(num_blocks)` zeroed
    /// writable bytes that outlive the table.
    pub(crate) unsafe fn from_raw(base: NonNull<u8>, num_blocks: usize) -> Self {
        Self { base, num_blocks }
    }

    /// Number of pool blocks governed by this table.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.num_blocks
    }

    #[inline]
    pub(crate) fn get(&self, block: usize) -> BlockState {
        debug_assert!(block < self.num_blocks);
        let byte = unsafe { *self.base.as_ptr().add(block / BLOCKS_PER_TABLE_BYTE) };
        BlockState::from_bits(byte >> ((block % BLOCKS_PER_TABLE_BYTE) * 2))
    }

    #[inline]
    pub(crate) fn set(&mut self, block: usize, state: BlockState) {
        debug_assert!(block < self.num_blocks);
        let shift = (block % BLOCKS_PER_TABLE_BYTE) * 2;
        unsafe {
            let byte = self.base.as_ptr().add(block / BLOCKS_PER_TABLE_BYTE);
            *byte = (*byte & !(0b11u8 << shift)) | ((state as u8) << shift);
        }
    }

    /// Raw table byte. A zero byte is four consecutive free lanes, which
    /// lets the run scan skip whole bytes at a time.
    #[inline]
    pub(crate) fn raw_byte(&self, byte: usize) -> u8 {
        debug_assert!(byte < Self::bytes_for(self.num_blocks));
        unsafe { *self.base.as_ptr().add(byte) }
    }
}
