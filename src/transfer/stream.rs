//! Chunked read/write with deadline-bounded raw I/O and throttle accounting.
//!
//! A [`ThrottledStream`] borrows a raw handle for the duration of one
//! transfer. Reads run the raw call under the deadline and then account the
//! bytes on the read-side group; writes account the bytes on the write-side
//! group first and then issue the raw call under the deadline, which paces
//! outbound data instead of waiting after the fact.

use std::io;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::types::ThrottleConfig;
use crate::error::FlowError;
use crate::transfer::deadline::Deadline;
use crate::transfer::group::{GlobalThrottles, ThrottleGroup};

/// Raw chunk-level access to a socket or stored file.
pub trait RawIo: Send {
    /// Read at most `max` bytes. An empty chunk signals end of data.
    fn read_chunk(&mut self, max: usize) -> BoxFuture<'_, io::Result<Vec<u8>>>;

    /// Write the whole chunk.
    fn write_chunk<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>>;

    /// Flush and close the write side.
    fn finish(&mut self) -> BoxFuture<'_, io::Result<()>>;
}

/// [`RawIo`] over any tokio byte stream (TCP sockets, duplex pipes).
#[derive(Debug)]
pub struct Transport<T> {
    inner: T,
}

impl<T> Transport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> RawIo for Transport<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn read_chunk(&mut self, max: usize) -> BoxFuture<'_, io::Result<Vec<u8>>> {
        async move {
            let mut buf = vec![0u8; max];
            let n = self.inner.read(&mut buf).await?;
            buf.truncate(n);
            Ok(buf)
        }
        .boxed()
    }

    fn write_chunk<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        self.inner.write_all(data).boxed()
    }

    fn finish(&mut self) -> BoxFuture<'_, io::Result<()>> {
        self.inner.shutdown().boxed()
    }
}

/// Throttled, deadline-bounded view of a raw handle for one transfer.
///
/// Calls on one stream must be serialized by the caller. After a timeout or
/// I/O error every further read or write fails with
/// [`FlowError::StreamUnusable`]; the caller closes the underlying handle.
pub struct ThrottledStream<'a, S: RawIo + ?Sized> {
    raw: &'a mut S,
    read_group: ThrottleGroup,
    write_group: ThrottleGroup,
    deadline: Deadline,
    failed: bool,
    bytes_read: u64,
    bytes_written: u64,
}

impl<'a, S: RawIo + ?Sized> ThrottledStream<'a, S> {
    pub fn new(
        raw: &'a mut S,
        mut read_group: ThrottleGroup,
        mut write_group: ThrottleGroup,
        deadline: Deadline,
    ) -> Self {
        read_group.start();
        write_group.start();
        Self {
            raw,
            read_group,
            write_group,
            deadline,
            failed: false,
            bytes_read: 0,
            bytes_written: 0,
        }
    }

    /// Stream with no throttling and no deadline.
    pub fn unthrottled(raw: &'a mut S) -> Self {
        Self::new(
            raw,
            ThrottleGroup::unlimited(),
            ThrottleGroup::unlimited(),
            Deadline::unbounded(),
        )
    }

    /// Stream with per-connection limits from `config`, joined to the
    /// process-wide throttles in `globals`.
    pub fn from_config(raw: &'a mut S, config: &ThrottleConfig, globals: &GlobalThrottles) -> Self {
        tracing::debug!(
            read_limit = %config.read_speed_limit,
            write_limit = %config.write_speed_limit,
            timeout = ?config.timeout,
            "Opening throttled stream"
        );
        Self::new(
            raw,
            globals.read_group(config.read_speed_limit),
            globals.write_group(config.write_speed_limit),
            config.deadline(),
        )
    }

    pub fn read_group_mut(&mut self) -> &mut ThrottleGroup {
        &mut self.read_group
    }

    pub fn write_group_mut(&mut self) -> &mut ThrottleGroup {
        &mut self.write_group
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn is_usable(&self) -> bool {
        !self.failed
    }

    /// Read up to `max` bytes. An empty chunk means end of data.
    pub async fn read(&mut self, max: usize) -> Result<Vec<u8>, FlowError> {
        self.ensure_usable()?;
        if max == 0 {
            return Err(FlowError::Config(
                "Read size must be greater than 0".to_string(),
            ));
        }

        let result = self.deadline.run("read", self.raw.read_chunk(max)).await;
        let chunk = self.track(result)?;

        self.read_group.consume(chunk.len() as u64).await;
        self.bytes_read += chunk.len() as u64;
        Ok(chunk)
    }

    /// Write the whole chunk, pacing it through the write-side throttles first.
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), FlowError> {
        self.ensure_usable()?;
        if chunk.is_empty() {
            return Ok(());
        }

        self.write_group.consume(chunk.len() as u64).await;

        let result = self.deadline.run("write", self.raw.write_chunk(chunk)).await;
        self.track(result)?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    /// Flush and close through the underlying handle. No throttling applies.
    pub async fn finish(self) -> Result<(), FlowError> {
        self.deadline.run("finish", self.raw.finish()).await
    }

    fn ensure_usable(&self) -> Result<(), FlowError> {
        if self.failed {
            Err(FlowError::StreamUnusable)
        } else {
            Ok(())
        }
    }

    fn track<T>(&mut self, result: Result<T, FlowError>) -> Result<T, FlowError> {
        if result.is_err() {
            self.failed = true;
        }
        result
    }
}
