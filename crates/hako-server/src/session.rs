//! Session adapter: typed requests in, filesystem results out.
//!
//! One adapter exists per SSH session. It owns the session's [`ObjectFs`]
//! and turns each [`Request`] into the handle or value the protocol layer
//! expects: a read handle, a write handle, a listing, or an error.

use std::time::SystemTime;

use hako_vfs::{DirEntry, FileAttr, ObjectFs, ReadAtSource, VfsError, VfsResult, WriteAtSink};

use crate::request::{FileCmd, FileList, Method, Request};

/// Entities returned by a list or stat request, read by offset.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    entries: Vec<DirEntry>,
}

impl Listing {
    pub fn new(entries: Vec<DirEntry>) -> Self {
        Self { entries }
    }

    /// Up to `max` entries starting at `offset`; `None` once exhausted.
    pub fn list_at(&self, offset: usize, max: usize) -> Option<&[DirEntry]> {
        if offset >= self.entries.len() {
            return None;
        }
        let end = offset.saturating_add(max).min(self.entries.len());
        Some(&self.entries[offset..end])
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn wrong_group(req: &Request, group: &str) -> VfsError {
    VfsError::unsupported(format!("{} as a {group} request", req.method))
}

/// Dispatches one session's requests to its filesystem.
#[derive(Clone)]
pub struct SessionAdapter {
    fs: ObjectFs,
}

impl SessionAdapter {
    pub fn new(fs: ObjectFs) -> Self {
        Self { fs }
    }

    /// Session identity tag.
    pub fn user(&self) -> &str {
        self.fs.user()
    }

    /// `Get`: open a path for offset reads.
    pub async fn file_read(&self, req: &Request) -> VfsResult<ReadAtSource> {
        match req.method {
            Method::Get => self.fs.read(&req.path()).await,
            Method::Put | Method::Cmd(_) | Method::List(_) => Err(wrong_group(req, "read")),
        }
    }

    /// `Put`: open a path for offset writes.
    pub async fn file_write(&self, req: &Request) -> VfsResult<WriteAtSink> {
        match req.method {
            Method::Put => self.fs.write(&req.path()).await,
            Method::Get | Method::Cmd(_) | Method::List(_) => Err(wrong_group(req, "write")),
        }
    }

    /// File commands.
    pub async fn file_cmd(&self, req: &Request) -> VfsResult<()> {
        let Method::Cmd(cmd) = req.method else {
            return Err(wrong_group(req, "command"));
        };
        let path = req.path();
        match cmd {
            FileCmd::Setstat => self.fs.setstat(&path).await,
            FileCmd::Rename => self.fs.rename(&path, &req.target_path()?).await,
            FileCmd::Remove => self.fs.remove(&path).await,
            FileCmd::Mkdir => self.fs.mkdir(&path).await,
            FileCmd::Rmdir => self.fs.rmdir(&path).await,
            FileCmd::Symlink => self.fs.symlink(&path, &req.target_path()?).await,
            FileCmd::Link => self.fs.link(&path, &req.target_path()?).await,
        }
    }

    /// Listing requests: directory listing, stat, readlink. A readlink
    /// listing holds one entry named after the link target.
    pub async fn file_list(&self, req: &Request) -> VfsResult<Listing> {
        let Method::List(list) = req.method else {
            return Err(wrong_group(req, "list"));
        };
        let path = req.path();
        match list {
            FileList::List => Ok(Listing::new(self.fs.list(&path).await?)),
            FileList::Stat => Ok(Listing::new(vec![self.fs.stat(&path).await?])),
            FileList::Readlink => {
                let target = self.fs.readlink(&path).await?;
                Ok(Listing::new(vec![DirEntry::new(
                    target,
                    FileAttr::file(0, SystemTime::UNIX_EPOCH),
                )]))
            }
        }
    }
}
