//! Core VFS types.
//!
//! Entities are what a session sees: named files and directories with a
//! size, a modification time, and a fixed permission set.

use std::time::SystemTime;

use crate::store::ObjectAttributes;

/// Permissions reported for every entity.
pub const FIXED_PERM: u32 = 0o777;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Regular file backed by a blob.
    File,
    /// Directory backed by a marker object or a listing prefix.
    Directory,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// File attributes (metadata).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttr {
    /// Size in bytes. Always zero for directories.
    pub size: u64,
    /// File type.
    pub kind: FileType,
    /// Unix permissions, without the file type bits.
    pub perm: u32,
    /// Last modification time.
    pub mtime: SystemTime,
}

impl FileAttr {
    /// Attributes for a blob of `size` bytes last modified at `mtime`.
    pub fn file(size: u64, mtime: SystemTime) -> Self {
        Self {
            size,
            kind: FileType::File,
            perm: FIXED_PERM,
            mtime,
        }
    }

    /// Attributes for a directory. Directories carry no stored mtime.
    pub fn directory() -> Self {
        Self {
            size: 0,
            kind: FileType::Directory,
            perm: FIXED_PERM,
            mtime: SystemTime::now(),
        }
    }

    /// Derive attributes from a store row.
    pub fn from_object(obj: &ObjectAttributes) -> Self {
        if obj.is_directory() {
            Self::directory()
        } else {
            Self::file(obj.size, obj.updated.unwrap_or(SystemTime::UNIX_EPOCH))
        }
    }

    /// Unix mode with the file type bits set.
    pub fn mode(&self) -> u32 {
        match self.kind {
            FileType::File => 0o100_000 | self.perm,
            FileType::Directory => 0o040_000 | self.perm,
        }
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// A named entity: a listing row or a stat result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry attributes.
    pub attr: FileAttr,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, attr: FileAttr) -> Self {
        Self {
            name: name.into(),
            attr,
        }
    }

    /// Returns true if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.attr.is_dir()
    }
}
