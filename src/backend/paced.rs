//! Slow-storage simulator.
//!
//! Every read and write costs `len / bytes_per_sec` of wall-clock time on top
//! of the local filesystem call. Used to exercise transfers whose storage,
//! not the throttle, is the bottleneck.

use std::io;
use std::path::Path;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::fs::File;
use tokio::time::sleep;

use crate::backend::local::LocalPathIo;
use crate::backend::{OpenMode, PathIo};
use crate::error::FlowError;
use crate::transfer::throttle::RateLimit;

#[derive(Debug, Clone, Copy)]
pub struct PacedPathIo {
    inner: LocalPathIo,
    rate: RateLimit,
}

impl PacedPathIo {
    pub fn new(bytes_per_sec: u64) -> Self {
        Self {
            inner: LocalPathIo::new(),
            rate: RateLimit::BytesPerSec(bytes_per_sec.max(1)),
        }
    }
}

impl PathIo for PacedPathIo {
    fn open<'a>(&'a self, path: &'a Path, mode: OpenMode) -> BoxFuture<'a, Result<File, FlowError>> {
        self.inner.open(path, mode)
    }

    fn size<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<u64, FlowError>> {
        self.inner.size(path)
    }

    fn read<'a>(&'a self, file: &'a mut File, max: usize) -> BoxFuture<'a, io::Result<Vec<u8>>> {
        async move {
            let chunk = self.inner.read(file, max).await?;
            sleep(self.rate.time_for(chunk.len() as u64)).await;
            Ok(chunk)
        }
        .boxed()
    }

    fn write<'a>(&'a self, file: &'a mut File, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        async move {
            sleep(self.rate.time_for(data.len() as u64)).await;
            self.inner.write(file, data).await
        }
        .boxed()
    }

    fn close<'a>(&'a self, file: &'a mut File) -> BoxFuture<'a, io::Result<()>> {
        self.inner.close(file)
    }
}
