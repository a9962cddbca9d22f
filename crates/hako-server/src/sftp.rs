//! SFTP protocol glue.
//!
//! [`SftpSession`] implements `russh_sftp`'s server handler on top of a
//! [`SessionAdapter`]. It owns the protocol handle table; everything else is
//! a typed [`Request`] handed to the adapter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use hako_vfs::{path, DirEntry, FileAttr, ReadAtSource, VfsError, WriteAtSink};
use russh_sftp::protocol::{
    Attrs, Data, File, FileAttributes, Handle, Name, OpenFlags, Status, StatusCode, Version,
};
use tracing::{debug, info, warn};

use crate::constants::READDIR_BATCH;
use crate::request::{FileCmd, FileList, Method, Request};
use crate::session::{Listing, SessionAdapter};

/// What an SFTP handle string refers to.
enum OpenHandle {
    Read { path: String, source: ReadAtSource },
    Write(Arc<WriteAtSink>),
    Dir { listing: Listing, cursor: usize },
}

/// SFTP status for a filesystem error.
pub fn status_code(err: &VfsError) -> StatusCode {
    match err {
        VfsError::NotFound(_) => StatusCode::NoSuchFile,
        VfsError::Unsupported(_) => StatusCode::OpUnsupported,
        VfsError::StorageUnavailable { .. }
        | VfsError::PreconditionViolation(_)
        | VfsError::TooLarge { .. }
        | VfsError::Cancelled(_) => StatusCode::Failure,
    }
}

fn ok_status(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".to_string(),
        language_tag: "en-US".to_string(),
    }
}

fn unix_seconds(t: SystemTime) -> u32 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

fn file_attributes(attr: &FileAttr) -> FileAttributes {
    let mtime = unix_seconds(attr.mtime);
    FileAttributes {
        size: Some(attr.size),
        permissions: Some(attr.mode()),
        atime: Some(mtime),
        mtime: Some(mtime),
        ..Default::default()
    }
}

/// `ls -l` style line for a listing row.
fn longname(entry: &DirEntry) -> String {
    let kind = if entry.is_dir() { 'd' } else { '-' };
    format!(
        "{kind}rwxrwxrwx 1 hako hako {:>12} {}",
        entry.attr.size, entry.name
    )
}

fn file_entry(entry: &DirEntry) -> File {
    File {
        filename: entry.name.clone(),
        longname: longname(entry),
        attrs: file_attributes(&entry.attr),
    }
}

/// Opens that modify the target become whole-object writes.
fn wants_write(pflags: OpenFlags) -> bool {
    pflags.intersects(OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::APPEND)
}

/// One SFTP subsystem instance, bound to one SSH session.
pub struct SftpSession {
    adapter: SessionAdapter,
    handles: HashMap<String, OpenHandle>,
    next_handle: u64,
}

impl SftpSession {
    pub fn new(adapter: SessionAdapter) -> Self {
        Self {
            adapter,
            handles: HashMap::new(),
            next_handle: 0,
        }
    }

    fn insert_handle(&mut self, handle: OpenHandle) -> String {
        self.next_handle += 1;
        let key = self.next_handle.to_string();
        self.handles.insert(key.clone(), handle);
        key
    }

    /// Log `err` and turn it into the status sent to the client.
    fn fail(&self, op: &str, target: &str, err: VfsError) -> StatusCode {
        let code = status_code(&err);
        match code {
            StatusCode::Failure => {
                warn!(user = %self.adapter.user(), op, target, error = %err, "sftp request failed")
            }
            _ => debug!(user = %self.adapter.user(), op, target, error = %err, "sftp request refused"),
        }
        code
    }

    async fn command(&self, id: u32, req: Request) -> Result<Status, StatusCode> {
        match self.adapter.file_cmd(&req).await {
            Ok(()) => Ok(ok_status(id)),
            Err(e) => Err(self.fail(&req.method.to_string(), &req.filepath, e)),
        }
    }

    async fn stat_path(&self, id: u32, path: String) -> Result<Attrs, StatusCode> {
        let req = Request::new(Method::List(FileList::Stat), path);
        let listing = self
            .adapter
            .file_list(&req)
            .await
            .map_err(|e| self.fail("stat", &req.filepath, e))?;
        let entry = listing.entries().first().ok_or(StatusCode::NoSuchFile)?;
        Ok(Attrs {
            id,
            attrs: file_attributes(&entry.attr),
        })
    }
}

impl Drop for SftpSession {
    fn drop(&mut self) {
        let unflushed: Vec<&str> = self
            .handles
            .values()
            .filter_map(|h| match h {
                OpenHandle::Write(sink) => Some(sink.key()),
                OpenHandle::Read { .. } | OpenHandle::Dir { .. } => None,
            })
            .collect();
        if !unflushed.is_empty() {
            warn!(user = %self.adapter.user(), keys = ?unflushed, "session ended with unclosed writes; discarded");
        }
        info!(user = %self.adapter.user(), "sftp session closed");
    }
}

impl russh_sftp::server::Handler for SftpSession {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        version: u32,
        _extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        info!(user = %self.adapter.user(), version, "sftp session started");
        Ok(Version::new())
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        let handle = if wants_write(pflags) {
            let req = Request::new(Method::Put, filename);
            let sink = self
                .adapter
                .file_write(&req)
                .await
                .map_err(|e| self.fail("open", &req.filepath, e))?;
            OpenHandle::Write(Arc::new(sink))
        } else {
            let req = Request::new(Method::Get, filename);
            let source = self
                .adapter
                .file_read(&req)
                .await
                .map_err(|e| self.fail("open", &req.filepath, e))?;
            OpenHandle::Read {
                path: req.filepath,
                source,
            }
        };
        Ok(Handle {
            id,
            handle: self.insert_handle(handle),
        })
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        match self.handles.remove(&handle) {
            Some(OpenHandle::Write(sink)) => {
                sink.close()
                    .await
                    .map_err(|e| self.fail("close", sink.key(), e))?;
                Ok(ok_status(id))
            }
            Some(OpenHandle::Read { .. } | OpenHandle::Dir { .. }) => Ok(ok_status(id)),
            None => Err(StatusCode::Failure),
        }
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        match self.handles.get(&handle) {
            Some(OpenHandle::Read { source, .. }) => {
                let data = source.read_at(offset, len as usize);
                if data.is_empty() {
                    return Err(StatusCode::Eof);
                }
                Ok(Data {
                    id,
                    data: data.to_vec(),
                })
            }
            Some(OpenHandle::Write(_) | OpenHandle::Dir { .. }) => Err(StatusCode::OpUnsupported),
            None => Err(StatusCode::Failure),
        }
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let sink = match self.handles.get(&handle) {
            Some(OpenHandle::Write(sink)) => sink.clone(),
            Some(OpenHandle::Read { .. } | OpenHandle::Dir { .. }) => {
                return Err(StatusCode::OpUnsupported);
            }
            None => return Err(StatusCode::Failure),
        };
        sink.write_at(&data, offset)
            .await
            .map_err(|e| self.fail("write", sink.key(), e))?;
        Ok(ok_status(id))
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        self.stat_path(id, path).await
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        self.stat_path(id, path).await
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        let path = match self.handles.get(&handle) {
            Some(OpenHandle::Read { path, .. }) => path.clone(),
            Some(OpenHandle::Write(sink)) => {
                let attr = FileAttr::file(sink.len().await, SystemTime::now());
                return Ok(Attrs {
                    id,
                    attrs: file_attributes(&attr),
                });
            }
            Some(OpenHandle::Dir { .. }) => {
                return Ok(Attrs {
                    id,
                    attrs: file_attributes(&FileAttr::directory()),
                });
            }
            None => return Err(StatusCode::Failure),
        };
        self.stat_path(id, path).await
    }

    async fn setstat(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        self.command(id, Request::new(Method::Cmd(FileCmd::Setstat), path))
            .await
    }

    async fn fsetstat(
        &mut self,
        id: u32,
        handle: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        if !self.handles.contains_key(&handle) {
            return Err(StatusCode::Failure);
        }
        Ok(ok_status(id))
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        let req = Request::new(Method::List(FileList::List), path);
        let listing = self
            .adapter
            .file_list(&req)
            .await
            .map_err(|e| self.fail("opendir", &req.filepath, e))?;
        Ok(Handle {
            id,
            handle: self.insert_handle(OpenHandle::Dir { listing, cursor: 0 }),
        })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        let Some(OpenHandle::Dir { listing, cursor }) = self.handles.get_mut(&handle) else {
            return Err(StatusCode::Failure);
        };
        let page = listing.list_at(*cursor, READDIR_BATCH).ok_or(StatusCode::Eof)?;
        *cursor += page.len();
        Ok(Name {
            id,
            files: page.iter().map(file_entry).collect(),
        })
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status, Self::Error> {
        self.command(id, Request::new(Method::Cmd(FileCmd::Remove), filename))
            .await
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        self.command(id, Request::new(Method::Cmd(FileCmd::Mkdir), path))
            .await
    }

    async fn rmdir(&mut self, id: u32, path: String) -> Result<Status, Self::Error> {
        self.command(id, Request::new(Method::Cmd(FileCmd::Rmdir), path))
            .await
    }

    async fn rename(
        &mut self,
        id: u32,
        oldpath: String,
        newpath: String,
    ) -> Result<Status, Self::Error> {
        let req = Request::new(Method::Cmd(FileCmd::Rename), oldpath).with_target(newpath);
        self.command(id, req).await
    }

    async fn symlink(
        &mut self,
        id: u32,
        linkpath: String,
        targetpath: String,
    ) -> Result<Status, Self::Error> {
        let req = Request::new(Method::Cmd(FileCmd::Symlink), linkpath).with_target(targetpath);
        self.command(id, req).await
    }

    async fn readlink(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let req = Request::new(Method::List(FileList::Readlink), path);
        let listing = self
            .adapter
            .file_list(&req)
            .await
            .map_err(|e| self.fail("readlink", &req.filepath, e))?;
        Ok(Name {
            id,
            files: listing.entries().iter().map(file_entry).collect(),
        })
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let absolute = path::to_absolute(&path::normalize(&path));
        Ok(Name {
            id,
            files: vec![File {
                filename: absolute.clone(),
                longname: absolute,
                attrs: FileAttributes::default(),
            }],
        })
    }
}
