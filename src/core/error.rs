use std::fmt;
use thiserror::Error;

/// Pool that ran dry when an allocation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Blocks,
    Inodes,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Blocks => write!(f, "blocks"),
            Resource::Inodes => write!(f, "inodes"),
        }
    }
}

#[derive(Error, Debug)]
pub enum FsError {
    #[error("No space left: no free {0} available")]
    NoSpace(Resource),

    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid block ID: {0}")]
    InvalidBlockId(u32),

    #[error("Block is not allocated: {0}")]
    BlockNotAllocated(u32),

    #[error("Invalid inode: {0}")]
    InvalidInode(u32),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        FsError::InvalidArgument(msg.into())
    }

    /// True for the space-exhaustion family of errors
    pub fn is_no_space(&self) -> bool {
        matches!(self, FsError::NoSpace(_))
    }
}

pub type Result<T> = std::result::Result<T, FsError>;
