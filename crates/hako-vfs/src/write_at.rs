//! Offset-addressable writes buffered until close.
//!
//! The store has no random-offset write, so every write lands in a growable
//! buffer and the whole object is put in a single call when the handle
//! closes. Writes may arrive out of order and concurrently; each one is a
//! single critical section under the sink's mutex.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{VfsError, VfsResult};
use crate::store::ObjectStore;

/// Where a sink's buffer goes on close.
#[derive(Clone)]
pub struct PutDestination {
    store: Arc<dyn ObjectStore>,
    key: String,
    cancel: CancellationToken,
}

impl PutDestination {
    pub fn new(store: Arc<dyn ObjectStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Abort the put when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    async fn commit(&self, body: Bytes) -> VfsResult<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(VfsError::Cancelled(self.key.clone())),
            result = self.store.put_object(&self.key, body) => {
                result.map_err(|e| VfsError::storage(&self.key, e))
            }
        }
    }
}

#[derive(Debug, Default)]
struct SinkState {
    buf: Vec<u8>,
    closed: bool,
}

/// Growable write buffer flushed to one object on [`close`](Self::close).
pub struct WriteAtSink {
    state: Mutex<SinkState>,
    dest: PutDestination,
    growth: f64,
    max_size: u64,
}

impl WriteAtSink {
    /// Empty sink with growth coefficient 1.0 and no size limit.
    pub fn new(dest: PutDestination) -> Self {
        Self {
            state: Mutex::new(SinkState::default()),
            dest,
            growth: 1.0,
            max_size: u64::MAX,
        }
    }

    /// Over-allocate by `coeff` when growing. Values below 1.0 act as 1.0.
    pub fn with_growth(mut self, coeff: f64) -> Self {
        self.growth = coeff;
        self
    }

    /// Refuse writes that would end past `max_size` bytes.
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Key this sink will be written to.
    pub fn key(&self) -> &str {
        self.dest.key()
    }

    /// Copy `data` into the buffer at `offset`, growing it as needed.
    ///
    /// Any gap between the old end and `offset` reads back as zeros.
    pub async fn write_at(&self, data: &[u8], offset: u64) -> VfsResult<usize> {
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|end| *end <= self.max_size)
            .ok_or_else(|| VfsError::TooLarge {
                path: self.key().to_string(),
                limit: self.max_size,
            })?;
        let end = usize::try_from(end).map_err(|_| VfsError::TooLarge {
            path: self.key().to_string(),
            limit: self.max_size,
        })?;
        let start = end - data.len();

        let mut state = self.state.lock().await;
        if state.closed {
            return Err(VfsError::precondition(format!(
                "write to {} after close",
                self.key()
            )));
        }

        if end > state.buf.len() {
            grow(&mut state.buf, end, self.growth);
        }
        state.buf[start..end].copy_from_slice(data);
        Ok(data.len())
    }

    /// Put the whole buffer to the destination. Must be called exactly once.
    pub async fn close(&self) -> VfsResult<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(VfsError::precondition(format!(
                "{} closed twice",
                self.key()
            )));
        }
        state.closed = true;

        let body = Bytes::from(std::mem::take(&mut state.buf));
        debug!(key = %self.key(), size = body.len(), "flushing write buffer");
        self.dest.commit(body).await
    }

    /// Copy of the current buffer contents.
    pub async fn bytes(&self) -> Vec<u8> {
        self.state.lock().await.buf.clone()
    }

    /// Current buffer length.
    pub async fn len(&self) -> u64 {
        self.state.lock().await.buf.len() as u64
    }
}

/// Grow `buf` to exactly `len` bytes, reserving `len * coeff` capacity.
fn grow(buf: &mut Vec<u8>, len: usize, coeff: f64) {
    let coeff = coeff.max(1.0);
    let capacity = ((len as f64) * coeff).ceil() as usize;
    let capacity = capacity.max(len);
    buf.reserve_exact(capacity - buf.len());
    buf.resize(len, 0);
}
