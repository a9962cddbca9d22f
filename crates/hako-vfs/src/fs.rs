//! Filesystem operations over an object store.
//!
//! Each operation takes normalized paths (see [`crate::path::normalize`])
//! and composes the directory emulator and the random-access adapters. No
//! state is kept between operations except the handles they return.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dirs::DirectoryEmulator;
use crate::error::{VfsError, VfsResult};
use crate::path;
use crate::read_at::ReadAtSource;
use crate::store::ObjectStore;
use crate::types::DirEntry;
use crate::write_at::{PutDestination, WriteAtSink};

/// Virtual filesystem bound to one store and one session.
#[derive(Clone)]
pub struct ObjectFs {
    store: Arc<dyn ObjectStore>,
    dirs: DirectoryEmulator,
    user: String,
    cancel: CancellationToken,
    max_object_size: u64,
}

impl ObjectFs {
    /// Create a filesystem over `store` for the session tagged `user`.
    pub fn new(store: Arc<dyn ObjectStore>, user: impl Into<String>) -> Self {
        Self {
            dirs: DirectoryEmulator::new(store.clone()),
            store,
            user: user.into(),
            cancel: CancellationToken::new(),
            max_object_size: u64::MAX,
        }
    }

    /// Abort in-flight store calls when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Cap the size of objects written through [`write`](Self::write).
    pub fn with_max_object_size(mut self, limit: u64) -> Self {
        self.max_object_size = limit;
        self
    }

    /// Session identity tag used in logs.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Race `fut` against the session's cancellation token.
    async fn guarded<T>(&self, path: &str, fut: impl Future<Output = VfsResult<T>>) -> VfsResult<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(VfsError::Cancelled(path.to_string())),
            result = fut => result,
        }
    }

    /// Open `path` for offset reads.
    pub async fn read(&self, path: &str) -> VfsResult<ReadAtSource> {
        info!(user = %self.user, path, "read");
        self.guarded(path, ReadAtSource::open(self.store.as_ref(), path))
            .await
    }

    /// Open `path` for offset writes, creating ancestor markers first.
    ///
    /// Nothing is stored at `path` until the returned sink is closed.
    pub async fn write(&self, path: &str) -> VfsResult<WriteAtSink> {
        info!(user = %self.user, path, "write");
        self.guarded(path, self.dirs.ensure_ancestors(path)).await?;

        let dest =
            PutDestination::new(self.store.clone(), path).with_cancellation(self.cancel.clone());
        Ok(WriteAtSink::new(dest).with_max_size(self.max_object_size))
    }

    /// Copy `src` to `dst`, add markers for the parents of `dst`, then delete
    /// `src`. Renaming a path onto itself only checks that it exists.
    ///
    /// Not atomic. If anything fails after the copy succeeded, both objects
    /// exist and that error is returned.
    pub async fn rename(&self, src: &str, dst: &str) -> VfsResult<()> {
        info!(user = %self.user, src, dst, "rename");
        if src == dst {
            return self
                .guarded(src, async {
                    self.store
                        .object_attributes(src)
                        .await
                        .map(|_| ())
                        .map_err(|e| VfsError::from_store(src, e))
                })
                .await;
        }

        self.guarded(src, async {
            self.store
                .copy_object(src, dst)
                .await
                .map_err(|e| VfsError::from_store(src, e))
        })
        .await?;
        self.guarded(dst, self.dirs.ensure_ancestors(dst)).await?;

        let deleted = self
            .guarded(src, async {
                self.store
                    .delete_object(src)
                    .await
                    .map_err(|e| VfsError::from_store(src, e))
            })
            .await;
        if let Err(e) = &deleted {
            warn!(user = %self.user, src, dst, error = %e, "rename copied but did not delete source");
        }
        deleted
    }

    /// Delete the object at `path`.
    pub async fn remove(&self, path: &str) -> VfsResult<()> {
        info!(user = %self.user, path, "remove");
        self.guarded(path, async {
            self.store
                .delete_object(path)
                .await
                .map_err(|e| VfsError::from_store(path, e))
        })
        .await
    }

    /// Create the marker for directory `path`. Succeeds if it already exists.
    pub async fn mkdir(&self, path: &str) -> VfsResult<()> {
        info!(user = %self.user, path, "mkdir");
        if path::is_root(path) {
            return Ok(());
        }
        self.guarded(path, async {
            self.store
                .put_object(&path::marker_key(path), Bytes::new())
                .await
                .map_err(|e| VfsError::storage(path, e))
        })
        .await
    }

    /// List the direct children of directory `path`.
    pub async fn list(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        info!(user = %self.user, path, "list");
        self.guarded(path, self.dirs.list(path)).await
    }

    /// Attributes of `path`.
    pub async fn stat(&self, path: &str) -> VfsResult<DirEntry> {
        info!(user = %self.user, path, "stat");
        self.guarded(path, self.dirs.stat(path)).await
    }

    /// Permission and time changes are accepted and ignored.
    pub async fn setstat(&self, path: &str) -> VfsResult<()> {
        info!(user = %self.user, path, "setstat ignored");
        Ok(())
    }

    pub async fn rmdir(&self, _path: &str) -> VfsResult<()> {
        Err(VfsError::unsupported("rmdir"))
    }

    pub async fn symlink(&self, _path: &str, _target: &str) -> VfsResult<()> {
        Err(VfsError::unsupported("symlink"))
    }

    pub async fn link(&self, _path: &str, _target: &str) -> VfsResult<()> {
        Err(VfsError::unsupported("link"))
    }

    pub async fn readlink(&self, _path: &str) -> VfsResult<String> {
        Err(VfsError::unsupported("readlink"))
    }
}
