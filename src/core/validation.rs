//! Validation for directory entry names
//!
//! The entry codec is length-prefixed, so names may contain any character
//! except the ones that would break path resolution.
//!
//! # Rules
//! - Non-empty, at most [`MAX_NAME_LEN`] bytes
//! - Not `.` or `..`
//! - No `/` (path separator) and no NUL
//!
//! Valid names: `"notes.txt"`, `"a:b"`, `"hello world"`
//!
//! Invalid names: `""`, `".."`, `"a/b"`

use crate::error::{FsError, Result};

/// Longest accepted name in bytes
pub const MAX_NAME_LEN: usize = 255;

/// Check that `name` can be stored as a directory entry
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FsError::invalid("name cannot be empty"));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(FsError::invalid(format!(
            "name too long ({} bytes, max {})",
            name.len(),
            MAX_NAME_LEN
        )));
    }

    if name == "." || name == ".." {
        return Err(FsError::invalid(format!("'{}' is a reserved name", name)));
    }

    if name.contains('/') || name.contains('\0') {
        return Err(FsError::invalid(format!(
            "name '{}' contains a reserved character",
            name.escape_debug()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_name("a").is_ok());
        assert!(validate_name("notes.txt").is_ok());
        assert!(validate_name("with:colon").is_ok());
        assert!(validate_name("line\nbreak").is_ok());
        assert!(validate_name("...").is_ok());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN)).is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name(".").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("nul\0").is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
    }
}
