//! Storage engine
//!
//! ## Layers
//!
//! - [`block_store`] - fixed-size blocks plus a free bitmap
//! - [`allocator`] - object storage on top of the blocks:
//!   - [`allocator::chain`] - one linked list of blocks per object
//!   - [`allocator::inode`] - inodes with K direct pointers, chained on overflow
//! - [`catalog`] - directory entries and their binary table encoding
//! - [`path`] - resolving path strings to directories
//! - [`filesystem`] - the facade tying it all together
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ FileSystem (cwd, root handle)            │
//! ├──────────────────────────────────────────┤
//! │ PathResolver / EntryTable (codec)        │
//! ├──────────────────────────────────────────┤
//! │ dyn AllocationStrategy                   │
//! │   ChainAllocator  |  InodeAllocator      │
//! ├──────────────────────────────────────────┤
//! │ BlockStore (blocks + free bitmap)        │
//! └──────────────────────────────────────────┘
//! ```

pub mod allocator;
pub mod block_store;
pub mod catalog;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod path;
pub mod validation;

pub use allocator::{build_strategy, AllocationStrategy, ChainAllocator, Handle, InodeAllocator};
pub use block_store::{BlockId, BlockStore};
pub use catalog::{DirEntry, Entry, EntryTable, FileType};
pub use config::{FsConfig, StrategyKind};
pub use error::{FsError, Resource, Result};
pub use filesystem::{CheckReport, FileSystem, FsStats, SharedFileSystem};
pub use path::{split_path, PathResolver, ResolvedDir};
