pub mod local;
pub mod paced;

use std::io;
use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::fs::File;

use crate::error::FlowError;
use crate::transfer::stream::RawIo;
use crate::transfer::throttle::RateLimit;

/// How a file is opened through a [`PathIo`] backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Create or truncate.
    Write,
    /// Create if missing, append otherwise.
    Append,
}

/// Pluggable storage access used to fulfil transfers.
///
/// Every operation is a future so it can be raced against a deadline and
/// dropped on cancellation.
pub trait PathIo: Send + Sync {
    /// Open a file in the given mode.
    fn open<'a>(&'a self, path: &'a Path, mode: OpenMode) -> BoxFuture<'a, Result<File, FlowError>>;

    /// Size of the file at `path` in bytes.
    fn size<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<u64, FlowError>>;

    /// Read at most `max` bytes. An empty result signals end of file.
    fn read<'a>(&'a self, file: &'a mut File, max: usize) -> BoxFuture<'a, io::Result<Vec<u8>>>;

    /// Write the whole buffer.
    fn write<'a>(&'a self, file: &'a mut File, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>>;

    /// Flush pending writes.
    fn close<'a>(&'a self, file: &'a mut File) -> BoxFuture<'a, io::Result<()>>;
}

/// Create the storage backend for a configured storage rate.
///
/// Returns `LocalPathIo` when unlimited, or `PacedPathIo` simulating storage
/// that moves `rate` bytes per second.
pub fn create_path_io(storage_rate: RateLimit) -> Arc<dyn PathIo> {
    match storage_rate {
        RateLimit::Unlimited => Arc::new(local::LocalPathIo::new()),
        RateLimit::BytesPerSec(bps) => {
            tracing::debug!(bytes_per_sec = bps, "Using paced storage backend");
            Arc::new(paced::PacedPathIo::new(bps))
        }
    }
}

/// A file opened through a [`PathIo`] backend, usable as a raw stream.
pub struct PathHandle {
    io: Arc<dyn PathIo>,
    file: File,
}

impl PathHandle {
    pub async fn open(io: Arc<dyn PathIo>, path: &Path, mode: OpenMode) -> Result<Self, FlowError> {
        let file = io.open(path, mode).await?;
        Ok(Self { io, file })
    }
}

impl RawIo for PathHandle {
    fn read_chunk(&mut self, max: usize) -> BoxFuture<'_, io::Result<Vec<u8>>> {
        self.io.read(&mut self.file, max)
    }

    fn write_chunk<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        self.io.write(&mut self.file, data)
    }

    fn finish(&mut self) -> BoxFuture<'_, io::Result<()>> {
        self.io.close(&mut self.file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn path_handle_round_trips_through_backend() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        let io = create_path_io(RateLimit::Unlimited);

        let mut writer = PathHandle::open(io.clone(), &path, OpenMode::Write).await.unwrap();
        writer.write_chunk(b"hello ").await.unwrap();
        writer.write_chunk(b"storage").await.unwrap();
        writer.finish().await.unwrap();

        let mut reader = PathHandle::open(io.clone(), &path, OpenMode::Read).await.unwrap();
        let mut collected = Vec::new();
        loop {
            let chunk = reader.read_chunk(4).await.unwrap();
            if chunk.is_empty() {
                break;
            }
            assert!(chunk.len() <= 4);
            collected.extend_from_slice(&chunk);
        }
        assert_eq!(collected, b"hello storage");
        assert_eq!(io.size(&path).await.unwrap(), 13);
    }
}
