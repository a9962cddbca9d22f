//! # hako-vfs
//!
//! Filesystem semantics on top of a flat object store.
//!
//! The store only knows whole-object get, put, delete, copy, attribute
//! fetch, and prefix-delimited listing. This crate fabricates the rest:
//!
//! - [`DirectoryEmulator`] - Directories as zero-byte `dir/` marker objects
//! - [`ReadAtSource`] - Random-offset reads over a buffered object body
//! - [`WriteAtSink`] - Random-offset writes buffered until a single put
//! - [`ObjectFs`] - The per-session operation set (read, write, rename, ...)
//!
//! ## Design Decisions
//!
//! - **Path-based, no inodes**: Operations take normalized, root-relative
//!   paths. The root is the empty string.
//! - **No metadata cache**: every operation asks the store.
//! - **Rename is copy + delete**: a failed delete leaves both objects.

pub mod dirs;
mod error;
pub mod fs;
pub mod path;
mod read_at;
pub mod store;
mod types;
mod write_at;

pub use dirs::DirectoryEmulator;
pub use error::{StoreError, StoreResult, VfsError, VfsResult};
pub use fs::ObjectFs;
pub use read_at::ReadAtSource;
pub use store::{
    MemoryStore, ObjectAttributes, ObjectKind, ObjectStore, S3Client, S3Store, S3StoreConfig,
};
pub use types::{DirEntry, FileAttr, FileType, FIXED_PERM};
pub use write_at::{PutDestination, WriteAtSink};
