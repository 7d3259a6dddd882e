//! Indexed (inode) allocation
//!
//! A fixed inode table sized `total_blocks / K`. Each inode points at up to
//! `K` direct blocks; objects larger than `K * block_size` continue in a
//! linked list of continuation inodes, each contributing its own direct
//! blocks. Only the head inode's `byte_len` is meaningful.
//!
//! A rewrite keeps the head inode, so an inode handle is stable for the
//! whole life of the object.

use crate::allocator::{AllocationStrategy, Handle, InodeUsage};
use crate::block_store::{BlockId, BlockStore};
use crate::catalog::FileType;
use crate::config::StrategyKind;
use crate::error::{FsError, Resource, Result};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Index into the inode table
pub type InodeId = u32;

/// Fixed-size file descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inode {
    /// Slot holds a live object (head or continuation)
    pub used: bool,

    /// Type of the object (meaningful on head inodes)
    pub file_type: FileType,

    /// Object length in bytes (meaningful on head inodes)
    pub byte_len: u64,

    /// Direct block pointers, at most K
    pub direct: Vec<BlockId>,

    /// Next inode of the chain
    pub continuation: Option<InodeId>,
}

impl Inode {
    fn reset(&mut self) {
        *self = Inode::default();
    }
}

/// Inode-table allocator
#[derive(Debug, Clone)]
pub struct InodeAllocator {
    store: BlockStore,
    inodes: Vec<Inode>,

    /// Free inode indices; lowest first
    free_inodes: BTreeSet<InodeId>,

    /// Direct pointers per inode (K)
    direct_blocks: usize,
}

impl InodeAllocator {
    /// Create an allocator with `total_blocks / direct_blocks` inodes
    pub fn new(total_blocks: usize, block_size: usize, direct_blocks: usize) -> Self {
        let direct_blocks = direct_blocks.max(1);
        let num_inodes = total_blocks / direct_blocks;
        InodeAllocator {
            store: BlockStore::new(total_blocks, block_size),
            inodes: vec![Inode::default(); num_inodes],
            free_inodes: (0..num_inodes as InodeId).collect(),
            direct_blocks,
        }
    }

    /// Take the lowest free inode and reset it
    pub fn allocate_inode(&mut self) -> Result<InodeId> {
        let idx = self
            .free_inodes
            .pop_first()
            .ok_or(FsError::NoSpace(Resource::Inodes))?;
        self.inodes[idx as usize].reset();
        Ok(idx)
    }

    /// Look at an inode slot
    pub fn inode(&self, idx: InodeId) -> Result<&Inode> {
        self.inodes
            .get(idx as usize)
            .ok_or(FsError::InvalidInode(idx))
    }

    pub fn direct_blocks(&self) -> usize {
        self.direct_blocks
    }

    pub fn total_inodes(&self) -> usize {
        self.inodes.len()
    }

    pub fn free_inode_count(&self) -> usize {
        self.free_inodes.len()
    }

    /// Store `data` under a new head inode
    pub fn write_object(&mut self, file_type: FileType, data: &[u8]) -> Result<InodeId> {
        let head = self.allocate_inode()?;
        {
            let inode = &mut self.inodes[head as usize];
            inode.used = true;
            inode.file_type = file_type;
        }

        if let Err(e) = self.fill(head, data) {
            warn!("Inode write ran out of space ({}); rolling back inode {}", e, head);
            self.discard(head);
            return Err(e);
        }

        debug!("Stored {} bytes under inode {}", data.len(), head);
        Ok(head)
    }

    /// Read an object back, truncated to the head's length
    pub fn read_object(&self, head: InodeId) -> Result<Vec<u8>> {
        let byte_len = self.live_head(head)?.byte_len as usize;
        let mut data = Vec::with_capacity(byte_len);

        for idx in self.inode_chain(head)? {
            for &block_id in &self.inodes[idx as usize].direct {
                data.extend_from_slice(self.store.read(block_id)?);
            }
        }

        if data.len() < byte_len {
            return Err(FsError::invalid(format!(
                "inode {} holds {} bytes, expected {}",
                head,
                data.len(),
                byte_len
            )));
        }

        data.truncate(byte_len);
        Ok(data)
    }

    /// Release an object entirely, head inode included
    pub fn free_object(&mut self, head: InodeId) -> Result<()> {
        self.live_head(head)?;
        self.release_contents(head)?;
        self.release_inode(head);
        debug!("Freed inode {}", head);
        Ok(())
    }

    /// Replace an object's content in place under the same head inode
    ///
    /// Capacity for blocks and continuation inodes is checked before the old
    /// content is released.
    pub fn rewrite_object(&mut self, head: InodeId, data: &[u8]) -> Result<()> {
        self.live_head(head)?;

        let chain = self.inode_chain(head)?;
        let owned_blocks: usize = chain
            .iter()
            .map(|&idx| self.inodes[idx as usize].direct.len())
            .sum();
        let owned_continuations = chain.len() - 1;

        let (needed_blocks, needed_continuations) = self.requirements(data.len());
        if needed_blocks > self.store.free_blocks() + owned_blocks {
            return Err(FsError::NoSpace(Resource::Blocks));
        }
        if needed_continuations > self.free_inodes.len() + owned_continuations {
            return Err(FsError::NoSpace(Resource::Inodes));
        }

        self.release_contents(head)?;
        if let Err(e) = self.fill(head, data) {
            // Unreachable after the capacity check, but never leave a half-filled chain
            warn!("Rewrite of inode {} failed after release: {}", head, e);
            if let Err(e) = self.release_contents(head) {
                warn!("Could not clean up inode {}: {}", head, e);
            }
            return Err(e);
        }

        debug!("Rewrote inode {} with {} bytes", head, data.len());
        Ok(())
    }

    /// Inode indices of the chain starting at `head`, in order
    pub fn inode_chain(&self, head: InodeId) -> Result<Vec<InodeId>> {
        let mut chain = Vec::new();
        let mut cursor = Some(head);

        while let Some(idx) = cursor {
            let inode = self.inode(idx)?;
            if !inode.used {
                return Err(FsError::InvalidInode(idx));
            }
            if chain.len() >= self.inodes.len() {
                return Err(FsError::invalid(format!(
                    "cycle detected in inode chain from {}",
                    head
                )));
            }
            chain.push(idx);
            cursor = inode.continuation;
        }

        Ok(chain)
    }

    /// Blocks and continuation inodes needed to hold `len` bytes
    fn requirements(&self, len: usize) -> (usize, usize) {
        let block_size = self.store.block_size();
        let blocks = len.div_ceil(block_size);
        let inodes = blocks.div_ceil(self.direct_blocks);
        (blocks, inodes.saturating_sub(1))
    }

    /// Fill an empty head inode with `data`, chaining continuations as needed
    ///
    /// Every allocated block and inode is linked before anything else can
    /// fail, so `release_contents` undoes a partial fill.
    fn fill(&mut self, head: InodeId, data: &[u8]) -> Result<()> {
        let mut chunks = data.chunks(self.store.block_size()).peekable();
        let mut current = head;

        loop {
            while self.inodes[current as usize].direct.len() < self.direct_blocks {
                let Some(chunk) = chunks.next() else { break };
                let block_id = self.store.allocate()?;
                self.inodes[current as usize].direct.push(block_id);
                self.store.write(block_id, chunk)?;
            }

            if chunks.peek().is_none() {
                break;
            }

            let next = self.allocate_inode()?;
            self.inodes[next as usize].used = true;
            self.inodes[current as usize].continuation = Some(next);
            current = next;
        }

        self.inodes[head as usize].byte_len = data.len() as u64;
        Ok(())
    }

    /// Free all direct blocks and continuation inodes, keeping the head
    fn release_contents(&mut self, head: InodeId) -> Result<()> {
        let chain = self.inode_chain(head)?;

        for &idx in &chain {
            let blocks = std::mem::take(&mut self.inodes[idx as usize].direct);
            self.inodes[idx as usize].continuation = None;
            for block_id in blocks {
                self.store.free(block_id)?;
            }
            if idx != head {
                self.release_inode(idx);
            }
        }

        self.inodes[head as usize].byte_len = 0;
        Ok(())
    }

    fn release_inode(&mut self, idx: InodeId) {
        self.inodes[idx as usize].reset();
        if !self.free_inodes.insert(idx) {
            warn!("Double-free detected for inode {}", idx);
        }
    }

    /// Best-effort teardown used on failed writes
    fn discard(&mut self, head: InodeId) {
        if let Err(e) = self.release_contents(head) {
            warn!("Could not roll back inode {}: {}", head, e);
        }
        self.release_inode(head);
    }

    fn live_head(&self, head: InodeId) -> Result<&Inode> {
        let inode = self.inode(head)?;
        if !inode.used || self.free_inodes.contains(&head) {
            return Err(FsError::InvalidInode(head));
        }
        Ok(inode)
    }

    fn expect_inode(handle: Handle) -> Result<InodeId> {
        match handle {
            Handle::Inode(idx) => Ok(idx),
            other => Err(FsError::invalid(format!(
                "{} is not an inode handle",
                other
            ))),
        }
    }
}

impl AllocationStrategy for InodeAllocator {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Inode
    }

    fn store(&mut self, file_type: FileType, data: &[u8]) -> Result<Handle> {
        self.write_object(file_type, data).map(Handle::Inode)
    }

    fn load(&self, handle: Handle) -> Result<Vec<u8>> {
        self.read_object(Self::expect_inode(handle)?)
    }

    fn free(&mut self, handle: Handle) -> Result<()> {
        self.free_object(Self::expect_inode(handle)?)
    }

    fn rewrite(&mut self, handle: Handle, data: &[u8]) -> Result<Handle> {
        self.rewrite_object(Self::expect_inode(handle)?, data)?;
        Ok(handle)
    }

    fn stored_type(&self, handle: Handle) -> Result<Option<FileType>> {
        let idx = Self::expect_inode(handle)?;
        Ok(Some(self.live_head(idx)?.file_type))
    }

    fn byte_len(&self, handle: Handle) -> Result<u64> {
        let idx = Self::expect_inode(handle)?;
        Ok(self.live_head(idx)?.byte_len)
    }

    fn owned_blocks(&self, handle: Handle) -> Result<Vec<BlockId>> {
        let chain = self.inode_chain(Self::expect_inode(handle)?)?;
        Ok(chain
            .iter()
            .flat_map(|&idx| self.inodes[idx as usize].direct.iter().copied())
            .collect())
    }

    fn owned_inodes(&self, handle: Handle) -> Result<Vec<InodeId>> {
        self.inode_chain(Self::expect_inode(handle)?)
    }

    fn blocks(&self) -> &BlockStore {
        &self.store
    }

    fn inode_usage(&self) -> Option<InodeUsage> {
        Some(InodeUsage {
            total_inodes: self.total_inodes(),
            free_inodes: self.free_inode_count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inode_table_size() {
        let alloc = InodeAllocator::new(100, 4, 8);
        assert_eq!(alloc.total_inodes(), 12);
        assert_eq!(alloc.free_inode_count(), 12);
    }

    #[test]
    fn test_continuation_inode_for_ten_blocks() {
        let mut alloc = InodeAllocator::new(64, 4, 8);
        let data: Vec<u8> = (0..40).collect();

        let head = alloc.write_object(FileType::File, &data).unwrap();
        let chain = alloc.inode_chain(head).unwrap();

        assert_eq!(chain.len(), 2);
        assert_eq!(alloc.inode(chain[0]).unwrap().direct.len(), 8);
        assert_eq!(alloc.inode(chain[1]).unwrap().direct.len(), 2);
        assert_eq!(alloc.inode(head).unwrap().byte_len, 40);
        assert_eq!(alloc.read_object(head).unwrap(), data);
    }

    #[test]
    fn test_partial_last_block_truncated() {
        let mut alloc = InodeAllocator::new(32, 4, 8);

        let head = alloc.write_object(FileType::File, b"hello").unwrap();
        assert_eq!(alloc.inode(head).unwrap().direct.len(), 2);
        assert_eq!(alloc.read_object(head).unwrap(), b"hello");
    }

    #[test]
    fn test_empty_object_owns_no_blocks() {
        let mut alloc = InodeAllocator::new(16, 4, 8);

        let head = alloc.write_object(FileType::Directory, b"").unwrap();
        assert!(alloc.inode(head).unwrap().direct.is_empty());
        assert_eq!(alloc.read_object(head).unwrap(), Vec::<u8>::new());
        assert_eq!(alloc.blocks().free_blocks(), 16);
        assert_eq!(alloc.free_inode_count(), 1);
    }

    #[test]
    fn test_free_releases_blocks_and_inodes() {
        let mut alloc = InodeAllocator::new(64, 4, 8);

        let head = alloc.write_object(FileType::File, &[3u8; 40]).unwrap();
        assert_eq!(alloc.free_inode_count(), 6);
        assert_eq!(alloc.blocks().free_blocks(), 54);

        alloc.free_object(head).unwrap();
        assert_eq!(alloc.free_inode_count(), 8);
        assert_eq!(alloc.blocks().free_blocks(), 64);
        assert_eq!(alloc.inode(head).unwrap(), &Inode::default());
    }

    #[test]
    fn test_rewrite_keeps_head() {
        let mut alloc = InodeAllocator::new(64, 4, 8);

        let head = alloc.write_object(FileType::Directory, &[1u8; 40]).unwrap();
        alloc.rewrite_object(head, b"tiny").unwrap();

        assert_eq!(alloc.inode_chain(head).unwrap(), vec![head]);
        assert_eq!(alloc.inode(head).unwrap().file_type, FileType::Directory);
        assert_eq!(alloc.read_object(head).unwrap(), b"tiny");
        assert_eq!(alloc.free_inode_count(), 7);
        assert_eq!(alloc.blocks().free_blocks(), 63);
    }

    #[test]
    fn test_out_of_inodes_rolls_back() {
        // 16 blocks / K=8 -> 2 inodes
        let mut alloc = InodeAllocator::new(16, 4, 8);
        alloc.write_object(FileType::File, b"a").unwrap();

        // Needs 2 inodes, only 1 left
        let result = alloc.write_object(FileType::File, &[0u8; 40]);
        assert!(matches!(result, Err(FsError::NoSpace(Resource::Inodes))));
        assert_eq!(alloc.free_inode_count(), 1);
        assert_eq!(alloc.blocks().free_blocks(), 15);
    }

    #[test]
    fn test_inode_table_bounds_capacity() {
        // 2 inodes of 4 direct blocks cover the whole device; a 9-block
        // object runs out of inodes before it runs out of blocks
        let mut alloc = InodeAllocator::new(8, 4, 4);

        let result = alloc.write_object(FileType::File, &[0u8; 36]);
        assert!(matches!(result, Err(FsError::NoSpace(Resource::Inodes))));
        assert_eq!(alloc.free_inode_count(), 2);
        assert_eq!(alloc.blocks().free_blocks(), 8);
    }

    #[test]
    fn test_rewrite_without_room_keeps_content() {
        let mut alloc = InodeAllocator::new(16, 4, 8);
        let head = alloc.write_object(FileType::File, b"keep me").unwrap();
        alloc.write_object(FileType::File, &[0u8; 40]).unwrap_err();

        let result = alloc.rewrite_object(head, &[0u8; 80]);
        assert!(result.is_err());
        assert_eq!(alloc.read_object(head).unwrap(), b"keep me");
    }

    #[test]
    fn test_freed_inode_is_invalid_handle() {
        let mut alloc = InodeAllocator::new(16, 4, 8);
        let head = alloc.write_object(FileType::File, b"x").unwrap();
        alloc.free_object(head).unwrap();

        assert!(matches!(alloc.read_object(head), Err(FsError::InvalidInode(_))));
        assert!(matches!(alloc.free_object(head), Err(FsError::InvalidInode(_))));
        assert!(matches!(alloc.inode(99), Err(FsError::InvalidInode(99))));
    }

    #[test]
    fn test_lowest_inode_first() {
        let mut alloc = InodeAllocator::new(32, 4, 8);
        let a = alloc.write_object(FileType::File, b"a").unwrap();
        let b = alloc.write_object(FileType::File, b"b").unwrap();
        assert_eq!((a, b), (0, 1));

        alloc.free_object(a).unwrap();
        assert_eq!(alloc.write_object(FileType::File, b"c").unwrap(), 0);
    }
}
