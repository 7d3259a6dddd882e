//! Directory entry structures

use crate::allocator::Handle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// File type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Regular file
    #[default]
    File,
    /// Directory
    Directory,
}

impl FileType {
    pub fn is_directory(self) -> bool {
        self == FileType::Directory
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileType::File => write!(f, "file"),
            FileType::Directory => write!(f, "directory"),
        }
    }
}

/// One row of a directory's child table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Name, unique within the parent
    pub name: String,

    /// Whether the child is a file or a directory
    pub file_type: FileType,

    /// Where the child's content is stored
    pub handle: Handle,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, file_type: FileType, handle: Handle) -> Self {
        DirEntry {
            name: name.into(),
            file_type,
            handle,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.file_type.is_directory()
    }
}

/// Listing row returned by [`crate::FileSystem::list`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Just the name (e.g., "notes.txt")
    pub name: String,

    /// File or directory
    pub file_type: FileType,

    /// Stored size in bytes (for directories, the size of the encoded table)
    pub size: u64,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.file_type.is_directory()
    }
}
