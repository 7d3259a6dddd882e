//! Simulated block device
//!
//! A fixed array of fixed-size blocks plus a bitmap free pool. Each bit
//! represents one block:
//! - 0 = free block
//! - 1 = allocated block
//!
//! Allocation always hands out the lowest free index, so allocation order is
//! deterministic.

use crate::error::{FsError, Resource, Result};

/// Index of a block on the device
pub type BlockId = u32;

/// In-memory block device with a free/used partition
#[derive(Debug, Clone)]
pub struct BlockStore {
    /// Block contents, `total_blocks * block_size` bytes
    data: Vec<u8>,

    /// Bitmap words (each word = 64 bits = 64 blocks)
    bitmap: Vec<u64>,

    /// Size of one block in bytes
    block_size: usize,

    /// Total number of blocks tracked
    total_blocks: usize,

    /// Number of free blocks available
    free_blocks: usize,

    /// Lowest bitmap word that may contain a free bit
    hint: usize,
}

impl BlockStore {
    /// Create a store where every block is free and zeroed
    pub fn new(total_blocks: usize, block_size: usize) -> Self {
        let num_words = (total_blocks + 63) / 64;
        BlockStore {
            data: vec![0u8; total_blocks * block_size],
            bitmap: vec![0u64; num_words],
            block_size,
            total_blocks,
            free_blocks: total_blocks,
            hint: 0,
        }
    }

    /// Take the lowest free block out of the pool
    pub fn allocate(&mut self) -> Result<BlockId> {
        if self.free_blocks == 0 {
            return Err(FsError::NoSpace(Resource::Blocks));
        }

        for word_idx in self.hint..self.bitmap.len() {
            let word = self.bitmap[word_idx];
            if word == u64::MAX {
                continue;
            }

            let bit_idx = word.trailing_ones() as usize;
            let block_id = word_idx * 64 + bit_idx;
            if block_id >= self.total_blocks {
                break;
            }

            self.bitmap[word_idx] |= 1u64 << bit_idx;
            self.free_blocks -= 1;
            self.hint = word_idx;
            return Ok(block_id as BlockId);
        }

        // free_blocks said otherwise; the bitmap is authoritative
        tracing::warn!(
            "Free block counter out of sync with bitmap ({} reported free)",
            self.free_blocks
        );
        Err(FsError::NoSpace(Resource::Blocks))
    }

    /// Return a block to the pool
    ///
    /// Freeing a block that is already free is a caller bug; it is reported
    /// as [`FsError::BlockNotAllocated`] and leaves the pool untouched.
    pub fn free(&mut self, block_id: BlockId) -> Result<()> {
        let (word_idx, bit_idx) = self.locate(block_id)?;

        if (self.bitmap[word_idx] & (1u64 << bit_idx)) == 0 {
            tracing::warn!("Double-free detected for block {}", block_id);
            return Err(FsError::BlockNotAllocated(block_id));
        }

        self.bitmap[word_idx] &= !(1u64 << bit_idx);
        self.free_blocks += 1;
        self.hint = self.hint.min(word_idx);
        Ok(())
    }

    /// Contents of an allocated block (always `block_size` bytes)
    pub fn read(&self, block_id: BlockId) -> Result<&[u8]> {
        self.check_allocated(block_id)?;
        let start = block_id as usize * self.block_size;
        Ok(&self.data[start..start + self.block_size])
    }

    /// Overwrite an allocated block
    ///
    /// `bytes` may be shorter than a block; the remainder is zeroed. The store
    /// does not remember how many bytes are meaningful.
    pub fn write(&mut self, block_id: BlockId, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.block_size {
            return Err(FsError::invalid(format!(
                "write of {} bytes exceeds block size {}",
                bytes.len(),
                self.block_size
            )));
        }
        self.check_allocated(block_id)?;

        let start = block_id as usize * self.block_size;
        let block = &mut self.data[start..start + self.block_size];
        block[..bytes.len()].copy_from_slice(bytes);
        block[bytes.len()..].fill(0);
        Ok(())
    }

    /// Check if a specific block is allocated
    pub fn is_allocated(&self, block_id: BlockId) -> bool {
        match self.locate(block_id) {
            Ok((word_idx, bit_idx)) => (self.bitmap[word_idx] & (1u64 << bit_idx)) != 0,
            Err(_) => false,
        }
    }

    /// Number of blocks needed to hold `len` bytes (at least one)
    pub fn blocks_for(&self, len: usize) -> usize {
        len.div_ceil(self.block_size).max(1)
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn total_blocks(&self) -> usize {
        self.total_blocks
    }

    pub fn free_blocks(&self) -> usize {
        self.free_blocks
    }

    pub fn used_blocks(&self) -> usize {
        self.total_blocks - self.free_blocks
    }

    /// Iterate over the IDs of every allocated block, in ascending order
    pub fn allocated_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..self.total_blocks as BlockId).filter(move |&id| self.is_allocated(id))
    }

    /// Fragmentation score (0.0 = no fragmentation, higher = more fragmented)
    ///
    /// Counts free/allocated transitions along the device, normalised by the
    /// number of blocks.
    pub fn fragmentation_score(&self) -> f64 {
        if self.total_blocks == 0 {
            return 0.0;
        }

        let mut transitions = 0usize;
        let mut prev_allocated = false;

        for block_id in 0..self.total_blocks as BlockId {
            let allocated = self.is_allocated(block_id);
            if allocated != prev_allocated {
                transitions += 1;
            }
            prev_allocated = allocated;
        }

        (transitions as f64) / (self.total_blocks as f64)
    }

    fn locate(&self, block_id: BlockId) -> Result<(usize, usize)> {
        if block_id as usize >= self.total_blocks {
            return Err(FsError::InvalidBlockId(block_id));
        }
        Ok(((block_id / 64) as usize, (block_id % 64) as usize))
    }

    fn check_allocated(&self, block_id: BlockId) -> Result<()> {
        let (word_idx, bit_idx) = self.locate(block_id)?;
        if (self.bitmap[word_idx] & (1u64 << bit_idx)) == 0 {
            return Err(FsError::BlockNotAllocated(block_id));
        }
        Ok(())
    }
}
