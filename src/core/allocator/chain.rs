//! Chained allocation
//!
//! Every object is a singly-linked list of blocks. The links live in an
//! explicit next-block table next to the device rather than inside the
//! blocks, so a block carries `block_size` bytes of payload.

use crate::allocator::{AllocationStrategy, Handle};
use crate::block_store::{BlockId, BlockStore};
use crate::catalog::FileType;
use crate::config::StrategyKind;
use crate::error::{FsError, Resource, Result};
use tracing::{debug, warn};

/// Linked-list block allocator
#[derive(Debug, Clone)]
pub struct ChainAllocator {
    store: BlockStore,

    /// Next block of the chain each block belongs to; `None` marks the end
    /// of a chain (and every block that is in no chain)
    next_block: Vec<Option<BlockId>>,
}

impl ChainAllocator {
    pub fn new(total_blocks: usize, block_size: usize) -> Self {
        ChainAllocator {
            store: BlockStore::new(total_blocks, block_size),
            next_block: vec![None; total_blocks],
        }
    }

    /// Write `data` into a fresh chain
    ///
    /// Empty data still owns one block so that the object has a handle.
    pub fn write_chain(&mut self, data: &[u8]) -> Result<(BlockId, u32)> {
        let len = u32::try_from(data.len())
            .map_err(|_| FsError::invalid(format!("object of {} bytes is too large", data.len())))?;

        let block_size = self.store.block_size();
        let needed = self.store.blocks_for(data.len());
        let mut chain: Vec<BlockId> = Vec::with_capacity(needed);

        for chunk_idx in 0..needed {
            let block_id = match self.store.allocate() {
                Ok(id) => id,
                Err(e) => {
                    warn!(
                        "Chain write ran out of blocks after {} of {}; rolling back",
                        chain.len(),
                        needed
                    );
                    self.rollback(&chain);
                    return Err(e);
                }
            };

            if let Some(&prev) = chain.last() {
                self.next_block[prev as usize] = Some(block_id);
            }
            chain.push(block_id);

            let start = (chunk_idx * block_size).min(data.len());
            let end = (start + block_size).min(data.len());
            self.store.write(block_id, &data[start..end])?;
        }

        let first = chain[0];
        debug!("Stored {} bytes in {} block chain at {}", len, chain.len(), first);
        Ok((first, len))
    }

    /// Read `len` bytes following the chain from `first`
    pub fn read_chain(&self, first: BlockId, len: u32) -> Result<Vec<u8>> {
        let len = len as usize;
        let mut buf = Vec::with_capacity(len);

        for block_id in self.walk(first) {
            if buf.len() >= len {
                break;
            }
            let block = self.store.read(block_id?)?;
            let take = block.len().min(len - buf.len());
            buf.extend_from_slice(&block[..take]);
        }

        if buf.len() < len {
            return Err(FsError::invalid(format!(
                "chain at block {} holds {} bytes, expected {}",
                first,
                buf.len(),
                len
            )));
        }

        Ok(buf)
    }

    /// Return every block of the chain to the free pool
    pub fn free_chain(&mut self, first: BlockId) -> Result<usize> {
        let blocks = self.chain_blocks(first)?;
        for &block_id in &blocks {
            self.next_block[block_id as usize] = None;
            self.store.free(block_id)?;
        }
        debug!("Freed {} block chain at {}", blocks.len(), first);
        Ok(blocks.len())
    }

    /// Free the old chain and store `data` as a new one
    ///
    /// The capacity check runs first so a rewrite that cannot fit leaves the
    /// old chain intact.
    pub fn rewrite_chain(&mut self, first: BlockId, data: &[u8]) -> Result<(BlockId, u32)> {
        let owned = self.chain_blocks(first)?.len();
        let needed = self.store.blocks_for(data.len());
        if needed > self.store.free_blocks() + owned {
            return Err(FsError::NoSpace(Resource::Blocks));
        }

        self.free_chain(first)?;
        self.write_chain(data)
    }

    /// Block IDs of the chain starting at `first`, in order
    pub fn chain_blocks(&self, first: BlockId) -> Result<Vec<BlockId>> {
        self.walk(first).collect()
    }

    /// Next-pointer of a block (`None` at the end of a chain)
    pub fn next_of(&self, block_id: BlockId) -> Option<BlockId> {
        self.next_block.get(block_id as usize).copied().flatten()
    }

    fn walk(&self, first: BlockId) -> ChainWalk<'_> {
        ChainWalk {
            allocator: self,
            cursor: Some(first),
            steps: 0,
        }
    }

    fn rollback(&mut self, chain: &[BlockId]) {
        for &block_id in chain {
            self.next_block[block_id as usize] = None;
            if let Err(e) = self.store.free(block_id) {
                warn!("Rollback could not free block {}: {}", block_id, e);
            }
        }
    }

    fn expect_chain(handle: Handle) -> Result<(BlockId, u32)> {
        match handle {
            Handle::Chain { first_block, len } => Ok((first_block, len)),
            other => Err(FsError::invalid(format!(
                "{} is not a chain handle",
                other
            ))),
        }
    }
}

/// Iterator over the blocks of one chain
///
/// Yields an error if the chain leaves the allocated set or is longer than
/// the device (a cycle).
struct ChainWalk<'a> {
    allocator: &'a ChainAllocator,
    cursor: Option<BlockId>,
    steps: usize,
}

impl Iterator for ChainWalk<'_> {
    type Item = Result<BlockId>;

    fn next(&mut self) -> Option<Self::Item> {
        let block_id = self.cursor.take()?;
        let store = &self.allocator.store;

        if block_id as usize >= store.total_blocks() {
            return Some(Err(FsError::InvalidBlockId(block_id)));
        }
        if !store.is_allocated(block_id) {
            return Some(Err(FsError::BlockNotAllocated(block_id)));
        }

        self.steps += 1;
        if self.steps > store.total_blocks() {
            return Some(Err(FsError::invalid(format!(
                "cycle detected in chain through block {}",
                block_id
            ))));
        }

        self.cursor = self.allocator.next_of(block_id);
        Some(Ok(block_id))
    }
}

impl AllocationStrategy for ChainAllocator {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Chain
    }

    fn store(&mut self, _file_type: FileType, data: &[u8]) -> Result<Handle> {
        let (first_block, len) = self.write_chain(data)?;
        Ok(Handle::Chain { first_block, len })
    }

    fn load(&self, handle: Handle) -> Result<Vec<u8>> {
        let (first, len) = Self::expect_chain(handle)?;
        self.read_chain(first, len)
    }

    fn free(&mut self, handle: Handle) -> Result<()> {
        let (first, _) = Self::expect_chain(handle)?;
        self.free_chain(first).map(|_| ())
    }

    fn rewrite(&mut self, handle: Handle, data: &[u8]) -> Result<Handle> {
        let (first, _) = Self::expect_chain(handle)?;
        let (first_block, len) = self.rewrite_chain(first, data)?;
        Ok(Handle::Chain { first_block, len })
    }

    fn stored_type(&self, handle: Handle) -> Result<Option<FileType>> {
        Self::expect_chain(handle)?;
        Ok(None)
    }

    fn byte_len(&self, handle: Handle) -> Result<u64> {
        let (_, len) = Self::expect_chain(handle)?;
        Ok(len as u64)
    }

    fn owned_blocks(&self, handle: Handle) -> Result<Vec<BlockId>> {
        let (first, _) = Self::expect_chain(handle)?;
        self.chain_blocks(first)
    }

    fn blocks(&self) -> &BlockStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_load() {
        let mut alloc = ChainAllocator::new(4, 8);

        let (first, len) = alloc.write_chain(b"hello world").unwrap();
        assert_eq!(len, 11);
        assert_eq!(alloc.chain_blocks(first).unwrap().len(), 2);
        assert_eq!(alloc.read_chain(first, len).unwrap(), b"hello world");
        assert_eq!(alloc.blocks().free_blocks(), 2);
    }

    #[test]
    fn test_empty_object_owns_one_block() {
        let mut alloc = ChainAllocator::new(4, 8);

        let (first, len) = alloc.write_chain(b"").unwrap();
        assert_eq!(len, 0);
        assert_eq!(alloc.chain_blocks(first).unwrap(), vec![first]);
        assert_eq!(alloc.read_chain(first, 0).unwrap(), Vec::<u8>::new());
        assert_eq!(alloc.blocks().free_blocks(), 3);
    }

    #[test]
    fn test_links_follow_allocation_order() {
        let mut alloc = ChainAllocator::new(8, 4);

        let (first, _) = alloc.write_chain(b"0123456789").unwrap();
        assert_eq!(first, 0);
        assert_eq!(alloc.next_of(0), Some(1));
        assert_eq!(alloc.next_of(1), Some(2));
        assert_eq!(alloc.next_of(2), None);
    }

    #[test]
    fn test_exact_multiple_of_block_size() {
        let mut alloc = ChainAllocator::new(8, 4);

        let (first, len) = alloc.write_chain(b"abcdefgh").unwrap();
        assert_eq!(alloc.chain_blocks(first).unwrap().len(), 2);
        assert_eq!(alloc.read_chain(first, len).unwrap(), b"abcdefgh");
    }

    #[test]
    fn test_free_returns_every_block() {
        let mut alloc = ChainAllocator::new(4, 8);

        let (first, _) = alloc.write_chain(b"hello world").unwrap();
        assert_eq!(alloc.free_chain(first).unwrap(), 2);
        assert_eq!(alloc.blocks().free_blocks(), 4);
        assert_eq!(alloc.next_of(first), None);
    }

    #[test]
    fn test_partial_write_rolls_back() {
        let mut alloc = ChainAllocator::new(4, 8);
        alloc.write_chain(b"x").unwrap();

        // Needs 4 blocks, only 3 are free
        let result = alloc.write_chain(&[1u8; 32]);
        assert!(matches!(result, Err(FsError::NoSpace(Resource::Blocks))));
        assert_eq!(alloc.blocks().free_blocks(), 3);

        for block_id in 1..4 {
            assert_eq!(alloc.next_of(block_id), None);
        }
    }

    #[test]
    fn test_rewrite_moves_content() {
        let mut alloc = ChainAllocator::new(8, 4);

        let (first, _) = alloc.write_chain(b"abcd").unwrap();
        let (other, _) = alloc.write_chain(b"zz").unwrap();
        let (new_first, new_len) = alloc.rewrite_chain(first, b"0123456789").unwrap();

        assert_eq!(alloc.read_chain(new_first, new_len).unwrap(), b"0123456789");
        assert_eq!(alloc.read_chain(other, 2).unwrap(), b"zz");
        assert_eq!(alloc.blocks().free_blocks(), 8 - 3 - 1);
    }

    #[test]
    fn test_rewrite_without_room_keeps_old_chain() {
        let mut alloc = ChainAllocator::new(4, 4);

        let (first, _) = alloc.write_chain(b"abcd").unwrap();
        alloc.write_chain(b"efgh").unwrap();

        // 3 blocks needed, 2 free + 1 owned = 3 -> fits
        let (first, len) = alloc.rewrite_chain(first, b"0123456789").unwrap();
        assert_eq!(alloc.blocks().free_blocks(), 0);

        // 5 blocks needed, 0 free + 3 owned -> refused
        let result = alloc.rewrite_chain(first, &[0u8; 20]);
        assert!(matches!(result, Err(FsError::NoSpace(Resource::Blocks))));
        assert_eq!(alloc.read_chain(first, len).unwrap(), b"0123456789");
    }

    #[test]
    fn test_short_chain_is_an_error() {
        let mut alloc = ChainAllocator::new(4, 4);
        let (first, _) = alloc.write_chain(b"abcd").unwrap();

        let result = alloc.read_chain(first, 9);
        assert!(matches!(result, Err(FsError::InvalidArgument(_))));
    }

    #[test]
    fn test_reading_freed_chain_fails() {
        let mut alloc = ChainAllocator::new(4, 4);
        let (first, len) = alloc.write_chain(b"abcd").unwrap();
        alloc.free_chain(first).unwrap();

        let result = alloc.read_chain(first, len);
        assert!(matches!(result, Err(FsError::BlockNotAllocated(_))));
    }

    #[test]
    fn test_wrong_handle_kind() {
        let alloc = ChainAllocator::new(4, 4);
        let result = alloc.load(Handle::Inode(0));
        assert!(matches!(result, Err(FsError::InvalidArgument(_))));
    }
}
