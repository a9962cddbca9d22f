//! Object store client abstraction.
//!
//! The store offers whole-object primitives only: get, put, delete, copy,
//! attribute fetch, and prefix-delimited listing. Everything that looks like
//! a filesystem is built on top of these in [`crate::dirs`] and [`crate::fs`].
//!
//! - [`MemoryStore`] - In-process store (testing, ephemeral servers)
//! - [`S3Store`] - S3-compatible bucket via `aws-sdk-s3`

mod memory;
mod s3;

pub use memory::MemoryStore;
pub use s3::{S3Client, S3Store, S3StoreConfig};

use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::StoreResult;
use crate::path::DELIMITER;

/// Body of a get: chunks in order, ending when the object is exhausted.
pub type ObjectStream = BoxStream<'static, StoreResult<Bytes>>;

/// Rows of a delimited listing. The end of the stream is exhaustion.
pub type ListStream = BoxStream<'static, StoreResult<ObjectAttributes>>;

/// What a store row stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// A common prefix synthesized by a delimited listing.
    Prefix,
    /// A zero-byte object whose key ends in the delimiter.
    Marker,
    /// An object with real content.
    Blob,
}

/// Attributes of one store row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectAttributes {
    /// Full key (or the common prefix, for [`ObjectKind::Prefix`]).
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Last-modified time reported by the store.
    pub updated: Option<SystemTime>,
    /// Row classification.
    pub kind: ObjectKind,
}

impl ObjectAttributes {
    /// Classify a real object row.
    pub fn object(key: impl Into<String>, size: u64, updated: Option<SystemTime>) -> Self {
        let key = key.into();
        let kind = if size == 0 && key.ends_with(DELIMITER) {
            ObjectKind::Marker
        } else {
            ObjectKind::Blob
        };
        Self {
            key,
            size,
            updated,
            kind,
        }
    }

    /// A common-prefix row from a delimited listing.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            key: prefix.into(),
            size: 0,
            updated: None,
            kind: ObjectKind::Prefix,
        }
    }

    /// Returns true for prefixes and markers.
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, ObjectKind::Prefix | ObjectKind::Marker)
    }
}

/// Typed operations against the backing store.
///
/// Keys are full object names within the bound bucket. Implementations do
/// their own transport retries, if any; failures surface immediately.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open a read stream over an object.
    async fn get_object(&self, key: &str) -> StoreResult<ObjectStream>;

    /// Write a whole object, replacing any existing one.
    async fn put_object(&self, key: &str, body: Bytes) -> StoreResult<()>;

    /// Delete an object. Absent keys are [`StoreError::NotFound`](crate::StoreError::NotFound).
    async fn delete_object(&self, key: &str) -> StoreResult<()>;

    /// Server-side copy of `src` to `dst`.
    async fn copy_object(&self, src: &str, dst: &str) -> StoreResult<()>;

    /// Fetch attributes without the body.
    async fn object_attributes(&self, key: &str) -> StoreResult<ObjectAttributes>;

    /// Enumerate keys under `prefix`, grouped one level deep by `delimiter`.
    async fn list_objects(&self, prefix: &str, delimiter: &str) -> StoreResult<ListStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(ObjectAttributes::object("d/", 0, None).kind, ObjectKind::Marker);
        assert_eq!(ObjectAttributes::object("d/", 3, None).kind, ObjectKind::Blob);
        assert_eq!(ObjectAttributes::object("file", 0, None).kind, ObjectKind::Blob);
        assert!(ObjectAttributes::prefix("d/").is_directory());
        assert!(!ObjectAttributes::object("file", 0, None).is_directory());
    }
}
