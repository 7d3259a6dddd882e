//! Filesystem configuration
//!
//! A filesystem is described by its allocation strategy and the geometry of
//! the simulated device. Configurations can be built in code, through
//! [`crate::FileSystemBuilder`], or loaded from TOML:
//!
//! ```toml
//! strategy = "chain"
//! num_blocks = 4096
//! block_size = 512
//! ```

use crate::error::{FsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Default device size in blocks
pub const DEFAULT_NUM_BLOCKS: usize = 1024;

/// Default block size in bytes
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Default number of direct block pointers per inode
pub const DEFAULT_DIRECT_BLOCKS: usize = 8;

/// Which allocation strategy backs the filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Linked list of blocks per object
    Chain,
    /// Inode with direct pointers and continuation inodes
    #[default]
    Inode,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Chain => write!(f, "chain"),
            StrategyKind::Inode => write!(f, "inode"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "chain" | "chained" | "linked" => Ok(StrategyKind::Chain),
            "inode" | "indexed" => Ok(StrategyKind::Inode),
            _ => Err(FsError::Config(format!(
                "unknown strategy '{}' (expected chain or inode)",
                s
            ))),
        }
    }
}

/// Geometry and strategy of a filesystem instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FsConfig {
    /// Allocation strategy
    pub strategy: StrategyKind,

    /// Number of blocks on the device
    pub num_blocks: usize,

    /// Size of a block in bytes
    pub block_size: usize,

    /// Direct block pointers per inode (K); ignored by the chain strategy
    pub direct_blocks: usize,
}

impl Default for FsConfig {
    fn default() -> Self {
        FsConfig {
            strategy: StrategyKind::default(),
            num_blocks: DEFAULT_NUM_BLOCKS,
            block_size: DEFAULT_BLOCK_SIZE,
            direct_blocks: DEFAULT_DIRECT_BLOCKS,
        }
    }
}

impl FsConfig {
    pub fn new(strategy: StrategyKind, num_blocks: usize, block_size: usize) -> Self {
        FsConfig {
            strategy,
            num_blocks,
            block_size,
            direct_blocks: DEFAULT_DIRECT_BLOCKS,
        }
    }

    /// Parse a configuration from TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: FsConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Number of inodes the inode strategy gets (`num_blocks / K`, truncated)
    pub fn num_inodes(&self) -> usize {
        if self.direct_blocks == 0 {
            return 0;
        }
        self.num_blocks / self.direct_blocks
    }

    /// Check the construction constraints
    ///
    /// - `num_blocks` and `block_size` are positive
    /// - block indices and the block size fit in 32 bits
    /// - the device size `num_blocks * block_size` fits in `usize`
    /// - the inode strategy has `K > 0` and at least one inode (`num_blocks >= K`)
    pub fn validate(&self) -> Result<()> {
        if self.num_blocks == 0 {
            return Err(FsError::Config("num_blocks must be positive".to_string()));
        }

        if self.num_blocks > u32::MAX as usize {
            return Err(FsError::Config(format!(
                "num_blocks {} exceeds the addressable maximum {}",
                self.num_blocks,
                u32::MAX
            )));
        }

        if self.block_size == 0 {
            return Err(FsError::Config("block_size must be positive".to_string()));
        }

        if self.block_size > u32::MAX as usize {
            return Err(FsError::Config(format!(
                "block_size {} exceeds the maximum {}",
                self.block_size,
                u32::MAX
            )));
        }

        if self.num_blocks.checked_mul(self.block_size).is_none() {
            return Err(FsError::Config(format!(
                "device of {} blocks of {} bytes does not fit in memory",
                self.num_blocks, self.block_size
            )));
        }

        if self.strategy == StrategyKind::Inode {
            if self.direct_blocks == 0 {
                return Err(FsError::Config(
                    "direct_blocks must be positive for the inode strategy".to_string(),
                ));
            }
            if self.num_blocks < self.direct_blocks {
                return Err(FsError::Config(format!(
                    "num_blocks ({}) must be at least direct_blocks ({}) for the inode strategy",
                    self.num_blocks, self.direct_blocks
                )));
            }
        }

        Ok(())
    }
}
