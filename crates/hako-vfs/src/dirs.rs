//! Directory emulation over marker objects.
//!
//! A directory `d` exists iff the zero-byte object `d/` exists. Markers are
//! created lazily for every ancestor of a written path; the root never has
//! one.

use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use tracing::debug;

use crate::error::{VfsError, VfsResult};
use crate::path::{self, DELIMITER};
use crate::store::{ObjectAttributes, ObjectKind, ObjectStore};
use crate::types::{DirEntry, FileAttr};

/// Derives marker keys, creates missing ancestors, and answers list/stat.
#[derive(Clone)]
pub struct DirectoryEmulator {
    store: Arc<dyn ObjectStore>,
}

impl DirectoryEmulator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Make sure a marker exists for every ancestor directory of `path`.
    ///
    /// Existing markers are left alone. Any failure other than not-found
    /// aborts before the remaining ancestors are touched.
    pub async fn ensure_ancestors(&self, path: &str) -> VfsResult<()> {
        for dir in path::ancestors(path) {
            let marker = path::marker_key(dir);
            match self.store.object_attributes(&marker).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    debug!(marker = %marker, "creating directory marker");
                    self.store
                        .put_object(&marker, Bytes::new())
                        .await
                        .map_err(|e| VfsError::storage(dir, e))?;
                }
                Err(e) => return Err(VfsError::storage(dir, e)),
            }
        }
        Ok(())
    }

    /// List the direct children of directory `dir`.
    ///
    /// Entries come back in store order. The row that echoes the queried
    /// prefix itself is dropped.
    pub async fn list(&self, dir: &str) -> VfsResult<Vec<DirEntry>> {
        let prefix = path::list_prefix(dir);
        let rows: Vec<ObjectAttributes> = self
            .store
            .list_objects(&prefix, "/")
            .await
            .map_err(|e| VfsError::storage(dir, e))?
            .try_collect()
            .await
            .map_err(|e| VfsError::storage(dir, e))?;

        Ok(rows
            .iter()
            .filter(|row| row.key != prefix)
            .filter_map(|row| entry_for(&prefix, row))
            .collect())
    }

    /// Attributes of `path`, probing the bare key and then its marker.
    pub async fn stat(&self, path: &str) -> VfsResult<DirEntry> {
        if path::is_root(path) {
            return Ok(DirEntry::new("/", FileAttr::directory()));
        }

        let attrs = match self.store.object_attributes(path).await {
            Ok(attrs) => attrs,
            Err(e) if e.is_not_found() => {
                debug!(path, "retrying stat as directory marker");
                self.store
                    .object_attributes(&path::marker_key(path))
                    .await
                    .map_err(|e| VfsError::from_store(path, e))?
            }
            Err(e) => return Err(VfsError::from_store(path, e)),
        };

        Ok(DirEntry::new(path::file_name(path), FileAttr::from_object(&attrs)))
    }
}

/// Name a listing row relative to `prefix`.
fn entry_for(prefix: &str, row: &ObjectAttributes) -> Option<DirEntry> {
    let rest = row.key.strip_prefix(prefix)?;
    let name = match row.kind {
        ObjectKind::Prefix | ObjectKind::Marker => rest.trim_end_matches(DELIMITER),
        ObjectKind::Blob => rest,
    };
    if name.is_empty() {
        return None;
    }
    Some(DirEntry::new(name, FileAttr::from_object(row)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, StoreResult};
    use crate::store::{ListStream, MemoryStore, ObjectStream};
    use async_trait::async_trait;
    use futures::StreamExt;

    fn emulator() -> (Arc<MemoryStore>, DirectoryEmulator) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), DirectoryEmulator::new(store))
    }

    /// Lists in reverse order and fails attribute probes for one key.
    struct Scrambled {
        inner: MemoryStore,
        broken_key: Option<&'static str>,
    }

    #[async_trait]
    impl ObjectStore for Scrambled {
        async fn get_object(&self, key: &str) -> StoreResult<ObjectStream> {
            self.inner.get_object(key).await
        }
        async fn put_object(&self, key: &str, body: Bytes) -> StoreResult<()> {
            self.inner.put_object(key, body).await
        }
        async fn delete_object(&self, key: &str) -> StoreResult<()> {
            self.inner.delete_object(key).await
        }
        async fn copy_object(&self, src: &str, dst: &str) -> StoreResult<()> {
            self.inner.copy_object(src, dst).await
        }
        async fn object_attributes(&self, key: &str) -> StoreResult<ObjectAttributes> {
            if self.broken_key == Some(key) {
                return Err(StoreError::backend("head", key, "permission denied"));
            }
            self.inner.object_attributes(key).await
        }
        async fn list_objects(&self, prefix: &str, delimiter: &str) -> StoreResult<ListStream> {
            let mut rows: Vec<_> = self.inner.list_objects(prefix, delimiter).await?.collect().await;
            rows.reverse();
            Ok(futures::stream::iter(rows).boxed())
        }
    }

    #[tokio::test]
    async fn test_ensure_ancestors_creates_markers() {
        let (store, dirs) = emulator();
        dirs.ensure_ancestors("a/b/c.txt").await.unwrap();

        assert_eq!(store.keys(), vec!["a/".to_string(), "a/b/".to_string()]);
        assert_eq!(store.contents("a/b/").unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_ensure_ancestors_is_idempotent() {
        let (store, dirs) = emulator();
        store.put_object("a/", Bytes::new()).await.unwrap();

        dirs.ensure_ancestors("a/b/c.txt").await.unwrap();
        dirs.ensure_ancestors("a/b/c.txt").await.unwrap();
        assert_eq!(store.keys(), vec!["a/".to_string(), "a/b/".to_string()]);
    }

    #[tokio::test]
    async fn test_ensure_ancestors_skips_root() {
        let (store, dirs) = emulator();
        dirs.ensure_ancestors("top.txt").await.unwrap();
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_ancestors_propagates_other_errors() {
        let store = Arc::new(Scrambled {
            inner: MemoryStore::new(),
            broken_key: Some("a/"),
        });
        let dirs = DirectoryEmulator::new(store.clone());

        let err = dirs.ensure_ancestors("a/b/c.txt").await.unwrap_err();
        assert!(matches!(err, VfsError::StorageUnavailable { .. }));
        assert!(store.inner.keys().is_empty());
    }

    #[tokio::test]
    async fn test_list_skips_self_reference() {
        let (store, dirs) = emulator();
        for key in ["a/", "a/b/", "a/b/c.txt", "a/d/"] {
            store.put_object(key, Bytes::new()).await.unwrap();
        }

        let entries = dirs.list("a").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b", "d"]);
        assert!(entries.iter().all(|e| e.is_dir()));
    }

    #[tokio::test]
    async fn test_list_independent_of_store_order() {
        let store = Scrambled {
            inner: MemoryStore::new(),
            broken_key: None,
        };
        for key in ["a/", "a/b/c.txt", "a/d/"] {
            store.put_object(key, Bytes::new()).await.unwrap();
        }
        let dirs = DirectoryEmulator::new(Arc::new(store));

        let mut names: Vec<_> = dirs
            .list("a")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["b", "d"]);
    }

    #[tokio::test]
    async fn test_list_root_mixes_files_and_dirs() {
        let (store, dirs) = emulator();
        store.put_object("docs/", Bytes::new()).await.unwrap();
        store.put_object("readme.txt", Bytes::from_static(b"hi")).await.unwrap();

        let entries = dirs.list("").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "docs");
        assert!(entries[0].is_dir());
        assert_eq!(entries[1].name, "readme.txt");
        assert_eq!(entries[1].attr.size, 2);
    }

    #[tokio::test]
    async fn test_stat_root() {
        let (_, dirs) = emulator();
        assert!(dirs.stat("").await.unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_stat_falls_back_to_marker() {
        let (store, dirs) = emulator();
        store.put_object("a/", Bytes::new()).await.unwrap();
        store.put_object("a/f.txt", Bytes::from_static(b"abc")).await.unwrap();

        let dir = dirs.stat("a").await.unwrap();
        assert!(dir.is_dir());
        assert_eq!(dir.name, "a");

        let file = dirs.stat("a/f.txt").await.unwrap();
        assert!(file.attr.is_file());
        assert_eq!(file.attr.size, 3);
        assert_eq!(file.name, "f.txt");

        assert!(dirs.stat("missing").await.unwrap_err().is_not_found());
    }
}
