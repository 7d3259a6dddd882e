//! Filesystem facade
//!
//! Every directory's child table is stored through the active allocation
//! strategy like any other object. A mutation decodes the containing
//! directory's table, changes it, rewrites it, and pushes the directory's
//! (possibly new) handle up through its ancestors to the root.

use crate::allocator::{build_strategy, AllocationStrategy, Handle, InodeId, InodeUsage};
use crate::block_store::BlockId;
use crate::catalog::{DirEntry, Entry, EntryTable, FileType};
use crate::config::{FsConfig, StrategyKind};
use crate::error::{FsError, Result};
use crate::path::{split_path, PathResolver, ResolvedDir};
use crate::validation::validate_name;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A filesystem behind the one lock multi-caller users share
pub type SharedFileSystem = Arc<Mutex<FileSystem>>;

/// In-memory hierarchical filesystem on a simulated block device
#[derive(Debug)]
pub struct FileSystem {
    config: FsConfig,
    strategy: Box<dyn AllocationStrategy>,

    /// Handle of the root directory's table (moves under the chain strategy)
    root: Handle,

    /// Current directory as canonical components from the root
    cwd: Vec<String>,
}

impl FileSystem {
    /// Create an empty filesystem (just the root directory)
    pub fn new(config: FsConfig) -> Result<Self> {
        config.validate()?;

        let mut strategy = build_strategy(&config);
        let root = strategy.store(FileType::Directory, &EntryTable::new().encode()?)?;

        info!(
            "Created {} filesystem: {} blocks of {} bytes, root at {}",
            config.strategy, config.num_blocks, config.block_size, root
        );

        Ok(FileSystem {
            config,
            strategy,
            root,
            cwd: Vec::new(),
        })
    }

    /// Shorthand for [`FileSystem::new`] with the default inode width
    pub fn with_strategy(strategy: StrategyKind, num_blocks: usize, block_size: usize) -> Result<Self> {
        Self::new(FsConfig::new(strategy, num_blocks, block_size))
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// The allocation strategy, for inspection
    pub fn strategy(&self) -> &dyn AllocationStrategy {
        self.strategy.as_ref()
    }

    pub fn root_handle(&self) -> Handle {
        self.root
    }

    /// Resolve a directory path against the current directory
    pub fn resolve(&self, path: &str) -> Result<ResolvedDir> {
        let resolver = self.resolver();
        if path.starts_with('/') {
            return resolver.resolve(path, &resolver.root());
        }
        let cwd = resolver.resolve_components(&self.cwd)?;
        resolver.resolve(path, &cwd)
    }

    /// Canonical path of the current directory
    pub fn current_path(&self) -> String {
        if self.cwd.is_empty() {
            return "/".to_string();
        }
        self.cwd.iter().fold(String::new(), |mut acc, name| {
            acc.push('/');
            acc.push_str(name);
            acc
        })
    }

    /// Create an empty directory
    pub fn make_directory(&mut self, path: &str) -> Result<()> {
        debug!("mkdir {}", path);
        let content = EntryTable::new().encode()?;
        self.create(path, FileType::Directory, &content)
    }

    /// Create a file holding `content`
    pub fn make_file(&mut self, path: &str, content: &[u8]) -> Result<()> {
        debug!("mkfile {} ({} bytes)", path, content.len());
        self.create(path, FileType::File, content)
    }

    /// Remove a directory together with everything below it
    pub fn remove_directory(&mut self, path: &str) -> Result<()> {
        debug!("rmdir {}", path);

        let target = self.resolve(path)?;
        let parent = target
            .parent()
            .ok_or_else(|| FsError::invalid("cannot remove the root directory"))?;

        let mut table = self.load_table(&parent)?;
        let entry = table
            .remove(target.name())
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;

        // Shrinking a table never needs new blocks, so detach first
        self.commit(&parent, &table)?;
        let released = self.release_tree(&entry)?;

        let removed = target.components();
        if self.cwd.starts_with(&removed) {
            debug!("Current directory was removed; moving to {}", parent.path());
            self.cwd = parent.components();
        }

        debug!("Removed {} ({} objects released)", target.path(), released);
        Ok(())
    }

    /// Remove a file
    pub fn remove_file(&mut self, path: &str) -> Result<()> {
        debug!("rm {}", path);

        let (parent, name) = self.locate_parent(path)?;
        let mut table = self.load_table(&parent)?;

        let entry = table
            .get(&name)
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        if entry.is_directory() {
            return Err(FsError::invalid(format!("'{}' is a directory", path)));
        }

        let handle = entry.handle;
        table.remove(&name);
        self.commit(&parent, &table)?;
        self.strategy.free(handle)?;
        Ok(())
    }

    /// Move or rename an entry
    ///
    /// If `dst` is an existing directory the entry keeps its name and moves
    /// into it; otherwise `dst` names the new location.
    pub fn move_entry(&mut self, src: &str, dst: &str) -> Result<()> {
        debug!("mv {} {}", src, dst);

        let (src_parent, src_name) = self.locate_parent(src)?;
        let entry = self
            .load_table(&src_parent)?
            .get(&src_name)
            .cloned()
            .ok_or_else(|| FsError::NotFound(src.to_string()))?;

        let (dst_parent, dst_name) = match self.resolve(dst) {
            Ok(dir) => (dir, src_name.clone()),
            Err(FsError::NotFound(_)) | Err(FsError::NotADirectory(_)) => self.locate_parent(dst)?,
            Err(e) => return Err(e),
        };
        validate_name(&dst_name)?;

        let mut src_path = src_parent.components();
        src_path.push(src_name.clone());
        let dst_parent_path = dst_parent.components();

        if entry.is_directory() && dst_parent_path.starts_with(&src_path) {
            return Err(FsError::invalid(format!(
                "cannot move '{}' into its own subtree",
                src
            )));
        }

        let mut dst_table = self.load_table(&dst_parent)?;
        if dst_table.contains(&dst_name) {
            return Err(FsError::AlreadyExists(dst.to_string()));
        }

        if dst_parent_path == src_parent.components() {
            dst_table.remove(&src_name);
            dst_table.insert(DirEntry::new(dst_name.clone(), entry.file_type, entry.handle))?;
            self.commit(&dst_parent, &dst_table)?;
        } else {
            dst_table.insert(DirEntry::new(dst_name.clone(), entry.file_type, entry.handle))?;
            self.commit(&dst_parent, &dst_table)?;

            // The destination commit may have moved handles on the source's lineage
            let src_parent = self.resolver().resolve_components(&src_parent.components())?;
            let mut src_table = self.load_table(&src_parent)?;
            src_table.remove(&src_name);
            self.commit(&src_parent, &src_table)?;
        }

        if entry.is_directory() && self.cwd.starts_with(&src_path) {
            let mut cwd = dst_parent_path;
            cwd.push(dst_name);
            cwd.extend_from_slice(&self.cwd[src_path.len()..]);
            self.cwd = cwd;
        }

        Ok(())
    }

    /// Read a file's whole content
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let (parent, name) = self.locate_parent(path)?;
        let table = self.load_table(&parent)?;

        let entry = table
            .get(&name)
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        if entry.is_directory() {
            return Err(FsError::invalid(format!("'{}' is a directory", path)));
        }

        self.strategy.load(entry.handle)
    }

    /// List a directory (the current one for `None`), sorted by name
    pub fn list(&self, path: Option<&str>) -> Result<Vec<Entry>> {
        let dir = self.resolve(path.unwrap_or(""))?;
        let table = self.load_table(&dir)?;

        table
            .iter()
            .map(|entry| {
                Ok(Entry {
                    name: entry.name.clone(),
                    file_type: entry.file_type,
                    size: self.strategy.byte_len(entry.handle)?,
                })
            })
            .collect()
    }

    /// Change the current directory (`None` goes to the root)
    pub fn change_directory(&mut self, path: Option<&str>) -> Result<()> {
        self.cwd = match path {
            None => Vec::new(),
            Some(path) => self.resolve(path)?.components(),
        };
        debug!("cd {}", self.current_path());
        Ok(())
    }

    /// Device and inode table usage
    pub fn stats(&self) -> FsStats {
        let blocks = self.strategy.blocks();
        FsStats {
            strategy: self.strategy.kind(),
            block_size: blocks.block_size(),
            total_blocks: blocks.total_blocks(),
            free_blocks: blocks.free_blocks(),
            used_blocks: blocks.used_blocks(),
            fragmentation: blocks.fragmentation_score(),
            inodes: self.strategy.inode_usage(),
        }
    }

    /// Walk the whole tree and cross-check ownership against the free pools
    ///
    /// Reports blocks or inodes owned twice, owned but free, or allocated
    /// but unreachable. An object whose storage cannot be walked (a chain
    /// running into a free block, say) is reported and not descended into.
    /// Errors only if a reachable directory table cannot be decoded.
    pub fn check(&self) -> Result<CheckReport> {
        let mut report = CheckReport::default();
        let mut seen_handles: HashSet<Handle> = HashSet::new();
        let mut seen_blocks: HashSet<BlockId> = HashSet::new();
        let mut seen_inodes: HashSet<InodeId> = HashSet::new();
        let blocks = self.strategy.blocks();

        let mut pending = vec![("/".to_string(), FileType::Directory, self.root)];
        while let Some((path, file_type, handle)) = pending.pop() {
            if !seen_handles.insert(handle) {
                report
                    .problems
                    .push(format!("{}: {} is reachable more than once", path, handle));
                continue;
            }

            let (owned_blocks, owned_inodes) = match (
                self.strategy.owned_blocks(handle),
                self.strategy.owned_inodes(handle),
            ) {
                (Ok(owned_blocks), Ok(owned_inodes)) => (owned_blocks, owned_inodes),
                (Err(e), _) | (_, Err(e)) => {
                    warn!("check: cannot walk {}: {}", path, e);
                    report.problems.push(format!("{}: {}", path, e));
                    continue;
                }
            };

            for block_id in owned_blocks {
                if !blocks.is_allocated(block_id) {
                    report
                        .problems
                        .push(format!("{}: block {} is owned but free", path, block_id));
                }
                if !seen_blocks.insert(block_id) {
                    report
                        .problems
                        .push(format!("{}: block {} is owned twice", path, block_id));
                }
            }

            for inode in owned_inodes {
                if !seen_inodes.insert(inode) {
                    report
                        .problems
                        .push(format!("{}: inode {} is owned twice", path, inode));
                }
            }

            match file_type {
                FileType::File => report.files += 1,
                FileType::Directory => {
                    report.directories += 1;
                    for entry in EntryTable::load(self.strategy.as_ref(), handle)?.iter() {
                        let child = if path == "/" {
                            format!("/{}", entry.name)
                        } else {
                            format!("{}/{}", path, entry.name)
                        };
                        pending.push((child, entry.file_type, entry.handle));
                    }
                }
            }
        }

        let leaked = blocks
            .allocated_ids()
            .filter(|id| !seen_blocks.contains(id))
            .count();
        if leaked > 0 {
            report
                .problems
                .push(format!("{} allocated blocks are unreachable", leaked));
        }

        report.owned_blocks = seen_blocks.len();
        report.free_blocks = blocks.free_blocks();
        report.total_blocks = blocks.total_blocks();

        if let Some(usage) = self.strategy.inode_usage() {
            if seen_inodes.len() + usage.free_inodes != usage.total_inodes {
                report.problems.push(format!(
                    "inode accounting mismatch: {} owned + {} free != {} total",
                    seen_inodes.len(),
                    usage.free_inodes,
                    usage.total_inodes
                ));
            }
            report.owned_inodes = Some(seen_inodes.len());
        }

        if !report.is_clean() {
            warn!("Integrity check found {} problems", report.problems.len());
        }

        Ok(report)
    }

    /// Wrap in an `Arc<Mutex<_>>` for sharing between threads
    pub fn into_shared(self) -> SharedFileSystem {
        Arc::new(Mutex::new(self))
    }

    fn resolver(&self) -> PathResolver<'_> {
        PathResolver::new(self.strategy.as_ref(), self.root)
    }

    fn load_table(&self, dir: &ResolvedDir) -> Result<EntryTable> {
        EntryTable::load(self.strategy.as_ref(), dir.handle())
    }

    /// Resolve the directory containing `path` and return it with the base name
    fn locate_parent(&self, path: &str) -> Result<(ResolvedDir, String)> {
        let (dir, name) = split_path(path);
        if name.is_empty() {
            return Err(FsError::invalid(format!("'{}' does not name an entry", path)));
        }
        Ok((self.resolve(dir)?, name.to_string()))
    }

    fn create(&mut self, path: &str, file_type: FileType, content: &[u8]) -> Result<()> {
        let (parent, name) = self.locate_parent(path)?;
        validate_name(&name)?;

        let mut table = self.load_table(&parent)?;
        if table.contains(&name) {
            return Err(FsError::AlreadyExists(path.to_string()));
        }

        let handle = self.strategy.store(file_type, content)?;
        table.insert(DirEntry::new(name, file_type, handle))?;

        if let Err(e) = self.commit(&parent, &table) {
            warn!("Could not record {} in {}: {}; releasing it", path, parent.path(), e);
            if let Err(free_err) = self.strategy.free(handle) {
                warn!("Releasing {} failed: {}", handle, free_err);
            }
            return Err(e);
        }

        Ok(())
    }

    /// Rewrite `dir`'s table and propagate handle changes to the root
    ///
    /// Only the first rewrite can fail for space: ancestor tables keep their
    /// size because handle fields are fixed width.
    fn commit(&mut self, dir: &ResolvedDir, table: &EntryTable) -> Result<()> {
        let lineage = dir.lineage();
        let mut idx = lineage.len() - 1;
        let mut handle = self.strategy.rewrite(lineage[idx].handle, &table.encode()?)?;

        loop {
            if handle == lineage[idx].handle {
                return Ok(());
            }

            if idx == 0 {
                debug!("Root moved {} -> {}", self.root, handle);
                self.root = handle;
                return Ok(());
            }

            let parent = &lineage[idx - 1];
            let mut parent_table = EntryTable::load(self.strategy.as_ref(), parent.handle)?;
            parent_table.set_handle(&lineage[idx].name, handle)?;
            handle = self.strategy.rewrite(parent.handle, &parent_table.encode()?)?;
            idx -= 1;
        }
    }

    /// Free an entry and, for directories, everything below it
    fn release_tree(&mut self, entry: &DirEntry) -> Result<usize> {
        let mut released = 0;
        if entry.is_directory() {
            let table = EntryTable::load(self.strategy.as_ref(), entry.handle)?;
            for child in table.iter() {
                released += self.release_tree(child)?;
            }
        }
        self.strategy.free(entry.handle)?;
        Ok(released + 1)
    }
}

/// Usage summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FsStats {
    pub strategy: StrategyKind,
    pub block_size: usize,
    pub total_blocks: usize,
    pub free_blocks: usize,
    pub used_blocks: usize,
    pub fragmentation: f64,
    pub inodes: Option<InodeUsage>,
}

/// Result of [`FileSystem::check`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub directories: usize,
    pub files: usize,
    pub owned_blocks: usize,
    pub free_blocks: usize,
    pub total_blocks: usize,
    pub owned_inodes: Option<usize>,
    pub problems: Vec<String>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}
