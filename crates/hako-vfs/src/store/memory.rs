//! In-memory object store.
//!
//! Used for tests and ephemeral servers. All data is lost when dropped.
//! Listing follows the delimiter rules of S3 and GCS, including returning
//! the queried prefix's own marker object as a row.

use std::collections::BTreeMap;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;

use super::{ListStream, ObjectAttributes, ObjectStore, ObjectStream};
use crate::error::{StoreError, StoreResult};

/// Chunk size for get streams, so readers see a multi-chunk body.
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    updated: SystemTime,
}

/// In-memory object store.
///
/// Thread-safe via internal `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All keys currently stored, in order.
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    /// Contents of an object, if present.
    pub fn contents(&self, key: &str) -> Option<Bytes> {
        self.objects.read().get(key).map(|o| o.data.clone())
    }

    fn attributes_of(key: &str, obj: &StoredObject) -> ObjectAttributes {
        ObjectAttributes::object(key, obj.data.len() as u64, Some(obj.updated))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_object(&self, key: &str) -> StoreResult<ObjectStream> {
        let data = self
            .contents(key)
            .ok_or_else(|| StoreError::not_found(key))?;

        let chunks: Vec<StoreResult<Bytes>> = (0..data.len())
            .step_by(CHUNK_SIZE)
            .map(|start| Ok(data.slice(start..(start + CHUNK_SIZE).min(data.len()))))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }

    async fn put_object(&self, key: &str, body: Bytes) -> StoreResult<()> {
        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                data: body,
                updated: SystemTime::now(),
            },
        );
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        self.objects
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(key))
    }

    async fn copy_object(&self, src: &str, dst: &str) -> StoreResult<()> {
        let mut objects = self.objects.write();
        let data = objects
            .get(src)
            .map(|o| o.data.clone())
            .ok_or_else(|| StoreError::not_found(src))?;
        objects.insert(
            dst.to_string(),
            StoredObject {
                data,
                updated: SystemTime::now(),
            },
        );
        Ok(())
    }

    async fn object_attributes(&self, key: &str) -> StoreResult<ObjectAttributes> {
        self.objects
            .read()
            .get(key)
            .map(|o| Self::attributes_of(key, o))
            .ok_or_else(|| StoreError::not_found(key))
    }

    async fn list_objects(&self, prefix: &str, delimiter: &str) -> StoreResult<ListStream> {
        let objects = self.objects.read();
        let mut rows = Vec::new();
        let mut last_prefix: Option<String> = None;

        for (key, obj) in objects.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            let rest = &key[prefix.len()..];
            let split = (!delimiter.is_empty())
                .then(|| rest.find(delimiter))
                .flatten();

            match split {
                Some(idx) => {
                    let common = &key[..prefix.len() + idx + delimiter.len()];
                    if last_prefix.as_deref() != Some(common) {
                        rows.push(Ok(ObjectAttributes::prefix(common)));
                        last_prefix = Some(common.to_string());
                    }
                }
                None => rows.push(Ok(Self::attributes_of(key, obj))),
            }
        }

        Ok(stream::iter(rows).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ObjectKind;
    use futures::TryStreamExt;

    async fn list(store: &MemoryStore, prefix: &str) -> Vec<ObjectAttributes> {
        store
            .list_objects(prefix, "/")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryStore::new();
        store.put_object("k", Bytes::from_static(b"value")).await.unwrap();

        let chunks: Vec<Bytes> = store.get_object("k").await.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"value");
    }

    #[tokio::test]
    async fn test_large_object_is_chunked() {
        let store = MemoryStore::new();
        let body = vec![7u8; CHUNK_SIZE * 2 + 5];
        store.put_object("big", Bytes::from(body.clone())).await.unwrap();

        let chunks: Vec<Bytes> = store.get_object("big").await.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), body);
    }

    #[tokio::test]
    async fn test_missing_keys() {
        let store = MemoryStore::new();
        assert!(store.get_object("nope").await.is_err());
        assert!(store.delete_object("nope").await.unwrap_err().is_not_found());
        assert!(store.copy_object("nope", "x").await.unwrap_err().is_not_found());
        assert!(store.object_attributes("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delimited_listing_groups_prefixes() {
        let store = MemoryStore::new();
        for key in ["a/", "a/b/c.txt", "a/b/d.txt", "a/d/", "a/top.txt", "other.txt"] {
            store.put_object(key, Bytes::new()).await.unwrap();
        }

        let rows = list(&store, "a/").await;
        let keys: Vec<_> = rows.iter().map(|r| (r.key.as_str(), r.kind)).collect();
        assert_eq!(
            keys,
            vec![
                ("a/", ObjectKind::Marker),
                ("a/b/", ObjectKind::Prefix),
                ("a/d/", ObjectKind::Prefix),
                ("a/top.txt", ObjectKind::Blob),
            ]
        );
    }

    #[tokio::test]
    async fn test_root_listing() {
        let store = MemoryStore::new();
        store.put_object("a/b.txt", Bytes::new()).await.unwrap();
        store.put_object("c.txt", Bytes::from_static(b"c")).await.unwrap();

        let rows = list(&store, "").await;
        let keys: Vec<_> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a/", "c.txt"]);
    }

    #[tokio::test]
    async fn test_copy_keeps_source() {
        let store = MemoryStore::new();
        store.put_object("src", Bytes::from_static(b"x")).await.unwrap();
        store.copy_object("src", "dst").await.unwrap();
        assert_eq!(store.keys(), vec!["dst".to_string(), "src".to_string()]);
    }
}
