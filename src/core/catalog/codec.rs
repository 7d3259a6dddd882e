//! Binary encoding of a directory's child table
//!
//! ```text
//! record  := name_len:u16le name:utf8[name_len] tag:u8 body
//! tag 0   := file_type:u8 first_block:u32le byte_len:u32le   (chain)
//! tag 1   := inode:u32le                                      (inode)
//! ```
//!
//! Inode records carry no type: it lives in the inode and is looked up
//! through the strategy on decode.

use crate::allocator::{AllocationStrategy, Handle};
use crate::catalog::{DirEntry, FileType};
use crate::error::{FsError, Result};
use crate::validation::validate_name;

const TAG_CHAIN: u8 = 0;
const TAG_INODE: u8 = 1;

const TYPE_FILE: u8 = 0;
const TYPE_DIRECTORY: u8 = 1;

/// Serialize entries, in the order given
pub fn encode_entries<'a, I>(entries: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = &'a DirEntry>,
{
    let mut bytes = Vec::new();

    for entry in entries {
        validate_name(&entry.name)?;

        bytes.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
        bytes.extend_from_slice(entry.name.as_bytes());

        match entry.handle {
            Handle::Chain { first_block, len } => {
                bytes.push(TAG_CHAIN);
                bytes.push(match entry.file_type {
                    FileType::File => TYPE_FILE,
                    FileType::Directory => TYPE_DIRECTORY,
                });
                bytes.extend_from_slice(&first_block.to_le_bytes());
                bytes.extend_from_slice(&len.to_le_bytes());
            }
            Handle::Inode(idx) => {
                bytes.push(TAG_INODE);
                bytes.extend_from_slice(&idx.to_le_bytes());
            }
        }
    }

    Ok(bytes)
}

/// Deserialize a table produced by [`encode_entries`]
///
/// Malformed input (truncation, unknown tags or types, bad UTF-8, invalid
/// names, inodes without a type) is rejected with `InvalidArgument`.
pub fn decode_entries(bytes: &[u8], strategy: &dyn AllocationStrategy) -> Result<Vec<DirEntry>> {
    let mut reader = Reader::new(bytes);
    let mut entries = Vec::new();

    while !reader.is_empty() {
        let name_len = reader.u16()? as usize;
        let name = std::str::from_utf8(reader.take(name_len)?)
            .map_err(|_| FsError::invalid("entry name is not valid UTF-8"))?
            .to_string();
        validate_name(&name)?;

        let entry = match reader.u8()? {
            TAG_CHAIN => {
                let file_type = match reader.u8()? {
                    TYPE_FILE => FileType::File,
                    TYPE_DIRECTORY => FileType::Directory,
                    other => {
                        return Err(FsError::invalid(format!(
                            "unknown file type {} for entry '{}'",
                            other, name
                        )))
                    }
                };
                let first_block = reader.u32()?;
                let len = reader.u32()?;
                DirEntry::new(name, file_type, Handle::Chain { first_block, len })
            }
            TAG_INODE => {
                let handle = Handle::Inode(reader.u32()?);
                let file_type = strategy
                    .stored_type(handle)
                    .ok()
                    .flatten()
                    .ok_or_else(|| {
                        FsError::invalid(format!("entry '{}' points at {} with no type", name, handle))
                    })?;
                DirEntry::new(name, file_type, handle)
            }
            other => {
                return Err(FsError::invalid(format!(
                    "unknown handle tag {} for entry '{}'",
                    other, name
                )))
            }
        };

        entries.push(entry);
    }

    Ok(entries)
}

/// Cursor over an encoded table
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, offset: 0 }
    }

    fn is_empty(&self) -> bool {
        self.offset >= self.bytes.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.offset + n;
        if end > self.bytes.len() {
            return Err(FsError::invalid(format!(
                "truncated entry record at offset {}",
                self.offset
            )));
        }
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}
