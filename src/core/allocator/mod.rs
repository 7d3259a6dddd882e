//! File allocation strategies
//!
//! Two strategies store byte blobs on a [`BlockStore`]:
//! - [`chain::ChainAllocator`] - each object is a linked list of blocks
//! - [`inode::InodeAllocator`] - each object is an inode with direct block
//!   pointers, chained to continuation inodes on overflow
//!
//! Everything above this module talks to [`AllocationStrategy`] only.

pub mod chain;
pub mod inode;

use crate::block_store::{BlockId, BlockStore};
use crate::catalog::FileType;
use crate::config::{FsConfig, StrategyKind};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use chain::ChainAllocator;
pub use inode::{Inode, InodeAllocator, InodeId};

/// Strategy-specific locator of a stored object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handle {
    /// First block of a chain and the number of meaningful bytes
    Chain { first_block: BlockId, len: u32 },
    /// Head inode of an inode chain
    Inode(InodeId),
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handle::Chain { first_block, len } => write!(f, "chain@{}+{}", first_block, len),
            Handle::Inode(idx) => write!(f, "inode#{}", idx),
        }
    }
}

/// Inode table occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InodeUsage {
    pub total_inodes: usize,
    pub free_inodes: usize,
}

/// Capability shared by both allocators
///
/// `store`/`load`/`free`/`rewrite` are the whole storage contract; the other
/// methods are accounting queries.
pub trait AllocationStrategy: fmt::Debug + Send {
    /// Which strategy this is
    fn kind(&self) -> StrategyKind;

    /// Store a new object, returning its handle
    ///
    /// Fails with `NoSpace` without leaking anything if the device fills up
    /// part way through.
    fn store(&mut self, file_type: FileType, data: &[u8]) -> Result<Handle>;

    /// Read back exactly the bytes stored under `handle`
    fn load(&self, handle: Handle) -> Result<Vec<u8>>;

    /// Release every block (and inode) owned by `handle`
    fn free(&mut self, handle: Handle) -> Result<()>;

    /// Replace an object's content, returning its (possibly new) handle
    ///
    /// Either succeeds or fails with the old content untouched.
    fn rewrite(&mut self, handle: Handle, data: &[u8]) -> Result<Handle>;

    /// Type recorded in the object's own metadata, if the strategy keeps one
    fn stored_type(&self, handle: Handle) -> Result<Option<FileType>>;

    /// Length in bytes of the stored object
    fn byte_len(&self, handle: Handle) -> Result<u64>;

    /// Blocks owned by the object, in content order
    fn owned_blocks(&self, handle: Handle) -> Result<Vec<BlockId>>;

    /// Inodes owned by the object (empty for strategies without inodes)
    fn owned_inodes(&self, _handle: Handle) -> Result<Vec<InodeId>> {
        Ok(Vec::new())
    }

    /// The underlying block device
    fn blocks(&self) -> &BlockStore;

    /// Inode table occupancy, for strategies that have one
    fn inode_usage(&self) -> Option<InodeUsage> {
        None
    }
}

/// Build the strategy described by a (validated) configuration
pub fn build_strategy(config: &FsConfig) -> Box<dyn AllocationStrategy> {
    match config.strategy {
        StrategyKind::Chain => Box::new(ChainAllocator::new(config.num_blocks, config.block_size)),
        StrategyKind::Inode => Box::new(InodeAllocator::new(
            config.num_blocks,
            config.block_size,
            config.direct_blocks,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategies() -> Vec<Box<dyn AllocationStrategy>> {
        vec![
            build_strategy(&FsConfig::new(StrategyKind::Chain, 64, 16)),
            build_strategy(&FsConfig::new(StrategyKind::Inode, 64, 16)),
        ]
    }

    #[test]
    fn test_round_trip_through_trait() {
        for mut strategy in strategies() {
            for data in [&b""[..], b"short", &[7u8; 16][..], &[9u8; 300][..]] {
                let handle = strategy.store(FileType::File, data).unwrap();
                assert_eq!(strategy.load(handle).unwrap(), data, "{:?}", strategy.kind());
                assert_eq!(strategy.byte_len(handle).unwrap(), data.len() as u64);
                strategy.free(handle).unwrap();
            }
            assert_eq!(strategy.blocks().free_blocks(), 64);
        }
    }

    #[test]
    fn test_rewrite_through_trait() {
        for mut strategy in strategies() {
            let handle = strategy.store(FileType::Directory, b"before").unwrap();
            let handle = strategy.rewrite(handle, &[1u8; 100]).unwrap();
            assert_eq!(strategy.load(handle).unwrap(), vec![1u8; 100]);

            let owned = strategy.owned_blocks(handle).unwrap().len();
            assert_eq!(owned, 7); // ceil(100 / 16)
            assert_eq!(strategy.blocks().free_blocks(), 64 - owned);
        }
    }

    #[test]
    fn test_handle_display() {
        let chain = Handle::Chain {
            first_block: 3,
            len: 11,
        };
        assert_eq!(chain.to_string(), "chain@3+11");
        assert_eq!(Handle::Inode(5).to_string(), "inode#5");
    }
}
