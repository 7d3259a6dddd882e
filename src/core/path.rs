//! Path resolution over the directory tree
//!
//! Nothing is cached: every step decodes the current directory's table and
//! materialises the child from its handle. A resolved directory carries its
//! whole lineage from the root, so "parent" is just the previous node.

use crate::allocator::{AllocationStrategy, Handle};
use crate::catalog::EntryTable;
use crate::error::{FsError, Result};

/// One directory on a resolved path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirNode {
    /// Entry name in the parent ("/" for the root)
    pub name: String,

    /// Where the directory's table is stored
    pub handle: Handle,
}

/// A directory together with its ancestors
///
/// `lineage[0]` is the root, the last node is the directory itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDir {
    lineage: Vec<DirNode>,
}

impl ResolvedDir {
    pub fn root(handle: Handle) -> Self {
        ResolvedDir {
            lineage: vec![DirNode {
                name: "/".to_string(),
                handle,
            }],
        }
    }

    /// The directory itself
    pub fn node(&self) -> &DirNode {
        // lineage always holds at least the root
        &self.lineage[self.lineage.len() - 1]
    }

    pub fn handle(&self) -> Handle {
        self.node().handle
    }

    pub fn name(&self) -> &str {
        &self.node().name
    }

    pub fn is_root(&self) -> bool {
        self.lineage.len() == 1
    }

    /// Root first, self last
    pub fn lineage(&self) -> &[DirNode] {
        &self.lineage
    }

    /// The parent directory (`None` for the root)
    pub fn parent(&self) -> Option<ResolvedDir> {
        if self.is_root() {
            return None;
        }
        Some(ResolvedDir {
            lineage: self.lineage[..self.lineage.len() - 1].to_vec(),
        })
    }

    /// Names from the root down, root excluded
    pub fn components(&self) -> Vec<String> {
        self.lineage[1..].iter().map(|n| n.name.clone()).collect()
    }

    /// Canonical absolute path
    pub fn path(&self) -> String {
        if self.is_root() {
            return "/".to_string();
        }
        self.lineage[1..]
            .iter()
            .fold(String::new(), |mut acc, node| {
                acc.push('/');
                acc.push_str(&node.name);
                acc
            })
    }

    fn push(&mut self, node: DirNode) {
        self.lineage.push(node);
    }

    fn pop(&mut self) {
        if !self.is_root() {
            self.lineage.pop();
        }
    }
}

/// Walks path strings against the tree stored in a strategy
pub struct PathResolver<'a> {
    strategy: &'a dyn AllocationStrategy,
    root: Handle,
}

impl<'a> PathResolver<'a> {
    pub fn new(strategy: &'a dyn AllocationStrategy, root: Handle) -> Self {
        PathResolver { strategy, root }
    }

    pub fn root(&self) -> ResolvedDir {
        ResolvedDir::root(self.root)
    }

    /// Decode a directory's child table
    pub fn entries(&self, dir: &ResolvedDir) -> Result<EntryTable> {
        EntryTable::load(self.strategy, dir.handle())
    }

    /// Resolve `path` to a directory
    ///
    /// Absolute paths start at the root, relative ones at `cwd`. `.` and empty
    /// components are skipped, `..` climbs (and stays put at the root).
    pub fn resolve(&self, path: &str, cwd: &ResolvedDir) -> Result<ResolvedDir> {
        let mut current = if path.starts_with('/') {
            self.root()
        } else {
            cwd.clone()
        };

        for component in path.split('/') {
            match component {
                "" | "." => continue,
                ".." => current.pop(),
                name => {
                    let node = self.child_dir(&current, name, path)?;
                    current.push(node);
                }
            }
        }

        Ok(current)
    }

    /// Resolve canonical components from the root (as produced by
    /// [`ResolvedDir::components`])
    pub fn resolve_components(&self, components: &[String]) -> Result<ResolvedDir> {
        let mut current = self.root();
        for name in components {
            let node = self.child_dir(&current, name, name)?;
            current.push(node);
        }
        Ok(current)
    }

    fn child_dir(&self, dir: &ResolvedDir, name: &str, path: &str) -> Result<DirNode> {
        let table = self.entries(dir)?;
        let entry = table
            .get(name)
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;

        if !entry.is_directory() {
            return Err(FsError::NotADirectory(path.to_string()));
        }

        Ok(DirNode {
            name: entry.name.clone(),
            handle: entry.handle,
        })
    }
}

/// Split a path into (directory part, base name)
///
/// The directory part is empty for bare names (meaning "current
/// directory") and `/` for names directly under the root. Trailing slashes
/// are ignored.
pub fn split_path(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        let dir = if path.starts_with('/') { "/" } else { "" };
        return (dir, "");
    }

    match trimmed.rfind('/') {
        None => ("", trimmed),
        Some(0) => ("/", &trimmed[1..]),
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
    }
}
