//! Offset-addressable reads over a fully materialized object.

use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;

use crate::error::{VfsError, VfsResult};
use crate::store::ObjectStore;

/// Immutable snapshot of one object body.
///
/// Clients may read at any offset in any order, including backwards, which a
/// forward-only get stream cannot serve. The whole object is buffered once at
/// open; reads after that take no lock.
#[derive(Debug, Clone)]
pub struct ReadAtSource {
    data: Bytes,
}

impl ReadAtSource {
    /// Drain a get stream for `key` into memory.
    pub async fn open(store: &dyn ObjectStore, key: &str) -> VfsResult<Self> {
        let stream = store
            .get_object(key)
            .await
            .map_err(|e| VfsError::from_store(key, e))?;

        let data = stream
            .try_fold(BytesMut::new(), |mut buf, chunk| async move {
                buf.extend_from_slice(&chunk);
                Ok(buf)
            })
            .await
            .map_err(|e| VfsError::storage(key, e))?;

        Ok(Self {
            data: data.freeze(),
        })
    }

    /// Wrap bytes that are already in memory.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Up to `len` bytes starting at `offset`. Empty at or past the end.
    pub fn read_at(&self, offset: u64, len: usize) -> Bytes {
        let size = self.data.len();
        let start = usize::try_from(offset).map_or(size, |o| o.min(size));
        let end = start.saturating_add(len).min(size);
        self.data.slice(start..end)
    }

    /// Object size in bytes.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_open_and_read_at() {
        let store = MemoryStore::new();
        store.put_object("f", Bytes::from_static(b"hello world")).await.unwrap();

        let src = ReadAtSource::open(&store, "f").await.unwrap();
        assert_eq!(src.len(), 11);
        assert_eq!(&src.read_at(6, 5)[..], b"world");
        // Backward seek after a forward read.
        assert_eq!(&src.read_at(0, 5)[..], b"hello");
        assert_eq!(&src.read_at(9, 100)[..], b"ld");
    }

    #[tokio::test]
    async fn test_read_past_end_is_empty() {
        let src = ReadAtSource::from_bytes(&b"abc"[..]);
        assert!(src.read_at(3, 10).is_empty());
        assert!(src.read_at(u64::MAX, 10).is_empty());
    }

    #[tokio::test]
    async fn test_open_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = ReadAtSource::open(&store, "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_multi_chunk_object() {
        let store = MemoryStore::new();
        let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        store.put_object("big", Bytes::from(body.clone())).await.unwrap();

        let src = ReadAtSource::open(&store, "big").await.unwrap();
        assert_eq!(src.len(), body.len() as u64);
        assert_eq!(&src.read_at(150_000, 10)[..], &body[150_000..150_010]);
    }
}
