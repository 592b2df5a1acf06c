use std::io;
use std::path::Path;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::backend::{OpenMode, PathIo};
use crate::error::FlowError;

/// Local filesystem backend using tokio::fs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalPathIo;

impl LocalPathIo {
    pub fn new() -> Self {
        LocalPathIo
    }
}

/// Map an io::Error to an appropriate FlowError, using the path for context.
fn map_io_error(err: io::Error, path: &Path, mode: OpenMode) -> FlowError {
    match err.kind() {
        io::ErrorKind::NotFound if mode == OpenMode::Read => FlowError::SourceNotFound {
            path: path.to_path_buf(),
        },
        io::ErrorKind::NotFound => FlowError::DestinationNotWritable {
            path: path.to_path_buf(),
        },
        io::ErrorKind::PermissionDenied => match mode {
            OpenMode::Read => FlowError::PermissionDenied {
                path: path.to_path_buf(),
            },
            OpenMode::Write | OpenMode::Append => FlowError::DestinationNotWritable {
                path: path.to_path_buf(),
            },
        },
        _ => FlowError::Io { source: err },
    }
}

impl PathIo for LocalPathIo {
    fn open<'a>(&'a self, path: &'a Path, mode: OpenMode) -> BoxFuture<'a, Result<File, FlowError>> {
        async move {
            let mut options = OpenOptions::new();
            match mode {
                OpenMode::Read => options.read(true),
                OpenMode::Write => options.write(true).create(true).truncate(true),
                OpenMode::Append => options.append(true).create(true),
            };
            options
                .open(path)
                .await
                .map_err(|e| map_io_error(e, path, mode))
        }
        .boxed()
    }

    fn size<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<u64, FlowError>> {
        async move {
            let meta = tokio::fs::metadata(path)
                .await
                .map_err(|e| map_io_error(e, path, OpenMode::Read))?;
            Ok(meta.len())
        }
        .boxed()
    }

    fn read<'a>(&'a self, file: &'a mut File, max: usize) -> BoxFuture<'a, io::Result<Vec<u8>>> {
        async move {
            let mut buf = vec![0u8; max];
            let n = file.read(&mut buf).await?;
            buf.truncate(n);
            Ok(buf)
        }
        .boxed()
    }

    fn write<'a>(&'a self, file: &'a mut File, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        file.write_all(data).boxed()
    }

    fn close<'a>(&'a self, file: &'a mut File) -> BoxFuture<'a, io::Result<()>> {
        file.flush().boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn open_read_nonexistent_returns_source_not_found() {
        let io = LocalPathIo::new();
        let path = Path::new("/nonexistent/file.txt");
        match io.open(path, OpenMode::Read).await {
            Err(FlowError::SourceNotFound { .. }) => {}
            Err(other) => panic!("Expected SourceNotFound, got: {:?}", other),
            Ok(_) => panic!("Expected error, got Ok"),
        }
    }

    #[tokio::test]
    async fn open_write_in_missing_dir_is_not_writable() {
        let io = LocalPathIo::new();
        let path = Path::new("/nonexistent/dir/out.txt");
        match io.open(path, OpenMode::Write).await {
            Err(FlowError::DestinationNotWritable { .. }) => {}
            Err(other) => panic!("Expected DestinationNotWritable, got: {:?}", other),
            Ok(_) => panic!("Expected error, got Ok"),
        }
    }

    #[tokio::test]
    async fn append_extends_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, "one ").unwrap();

        let io = LocalPathIo::new();
        let mut file = io.open(&path, OpenMode::Append).await.unwrap();
        io.write(&mut file, b"two").await.unwrap();
        io.close(&mut file).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one two");
    }

    #[tokio::test]
    async fn size_of_source_file() {
        let io = LocalPathIo::new();
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        let size = io.size(&manifest_dir.join("Cargo.toml")).await.unwrap();
        assert!(size > 0);
    }
}
