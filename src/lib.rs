//! # blockfs - In-Memory Block Filesystem
//!
//! `blockfs` simulates a hierarchical filesystem on a fixed-size block
//! device held in memory. Two allocation strategies are available:
//!
//! - **Chain** - every object is a linked list of blocks
//! - **Inode** - every object is an inode with K direct block pointers,
//!   chained to continuation inodes when it outgrows them
//!
//! Directories are stored like files: their content is an encoded table of
//! children, rewritten on every change.
//!
//! ## Quick Start
//!
//! ```rust
//! use blockfs::{FileSystem, Result, StrategyKind};
//!
//! # fn main() -> Result<()> {
//! let mut fs = FileSystem::with_strategy(StrategyKind::Chain, 1024, 512)?;
//!
//! fs.make_directory("/docs")?;
//! fs.make_file("/docs/hello.txt", b"Hello, World!")?;
//!
//! assert_eq!(fs.read_file("/docs/hello.txt")?, b"Hello, World!");
//! assert_eq!(fs.list(Some("/docs"))?.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Builder
//!
//! ```rust
//! use blockfs::{FileSystemBuilder, Result, StrategyKind};
//!
//! # fn main() -> Result<()> {
//! let fs = FileSystemBuilder::new()
//!     .strategy(StrategyKind::Inode)
//!     .num_blocks(4096)
//!     .block_size(256)
//!     .direct_blocks(12)
//!     .build()?;
//!
//! assert_eq!(fs.stats().total_blocks, 4096);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod shell;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use self::core::{
    allocator, block_store, catalog, config, error, filesystem, path, validation,
};

pub use crate::core::{
    allocator::{AllocationStrategy, Handle, InodeUsage},
    block_store::{BlockId, BlockStore},
    catalog::{Entry, FileType},
    config::{FsConfig, StrategyKind},
    error::{FsError, Resource, Result},
    filesystem::{CheckReport, FileSystem, FsStats, SharedFileSystem},
};
pub use shell::{Flow, Shell};

use std::path::Path;
use tracing::{debug, info};

/// Builder for customizing filesystem creation
///
/// Starts from [`FsConfig::default`] (or a TOML file) and overrides single
/// settings fluently.
///
/// # Examples
///
/// ```rust,no_run
/// use blockfs::FileSystemBuilder;
///
/// # fn main() -> blockfs::Result<()> {
/// let fs = FileSystemBuilder::from_file("blockfs.toml")?
///     .num_blocks(8192)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct FileSystemBuilder {
    config: FsConfig,
}

impl FileSystemBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        FileSystemBuilder::default()
    }

    /// Start from a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading filesystem config from {}", path.display());
        Ok(FileSystemBuilder {
            config: FsConfig::from_file(path)?,
        })
    }

    /// Start from an existing configuration
    pub fn from_config(config: FsConfig) -> Self {
        FileSystemBuilder { config }
    }

    pub fn strategy(mut self, strategy: StrategyKind) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn num_blocks(mut self, num_blocks: usize) -> Self {
        self.config.num_blocks = num_blocks;
        self
    }

    pub fn block_size(mut self, block_size: usize) -> Self {
        self.config.block_size = block_size;
        self
    }

    /// Direct block pointers per inode (inode strategy only)
    pub fn direct_blocks(mut self, direct_blocks: usize) -> Self {
        self.config.direct_blocks = direct_blocks;
        self
    }

    /// The configuration built so far
    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    /// Validate the configuration and create the filesystem
    pub fn build(self) -> Result<FileSystem> {
        info!(
            "Building {} filesystem with {} blocks of {} bytes",
            self.config.strategy, self.config.num_blocks, self.config.block_size
        );
        FileSystem::new(self.config)
    }

    /// Build straight into a [`SharedFileSystem`]
    pub fn build_shared(self) -> Result<SharedFileSystem> {
        Ok(self.build()?.into_shared())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let fs = FileSystemBuilder::new().build().unwrap();
        assert_eq!(fs.config(), &FsConfig::default());
        assert_eq!(fs.strategy_kind(), StrategyKind::Inode);
    }

    #[test]
    fn test_builder_overrides() {
        let fs = FileSystemBuilder::new()
            .strategy(StrategyKind::Chain)
            .num_blocks(32)
            .block_size(16)
            .build()
            .unwrap();

        let stats = fs.stats();
        assert_eq!(stats.strategy, StrategyKind::Chain);
        assert_eq!(stats.total_blocks, 32);
        assert_eq!(stats.block_size, 16);
        assert!(stats.inodes.is_none());
    }

    #[test]
    fn test_builder_rejects_bad_geometry() {
        let result = FileSystemBuilder::new()
            .strategy(StrategyKind::Inode)
            .num_blocks(4)
            .direct_blocks(8)
            .build();
        assert!(matches!(result, Err(FsError::Config(_))));
    }

    #[test]
    fn test_builder_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("blockfs.toml");
        std::fs::write(&path, "strategy = \"chain\"\nnum_blocks = 64\nblock_size = 32\n").unwrap();

        let shared = FileSystemBuilder::from_file(&path)
            .unwrap()
            .num_blocks(128)
            .build_shared()
            .unwrap();

        let fs = shared.lock();
        assert_eq!(fs.strategy_kind(), StrategyKind::Chain);
        assert_eq!(fs.stats().total_blocks, 128);
    }
}
