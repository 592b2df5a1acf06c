use std::path::Path;
use std::sync::Arc;

use indicatif::ProgressBar;
use tokio_util::sync::CancellationToken;

use crate::backend::{OpenMode, PathHandle, PathIo};
use crate::config::types::ThrottleConfig;
use crate::error::FlowError;
use crate::transfer::group::GlobalThrottles;
use crate::transfer::stats::TransferStats;
use crate::transfer::stream::{RawIo, ThrottledStream};

/// Move chunks from `source` to `sink` until end of data.
///
/// Reads are paced by the source's read-side throttles and writes by the
/// sink's write-side throttles. Cancelling `cancel` interrupts whichever
/// throttle wait or raw call is pending and returns `FlowError::Aborted`.
/// Neither stream is finished here.
pub async fn pump<R, W>(
    source: &mut ThrottledStream<'_, R>,
    sink: &mut ThrottledStream<'_, W>,
    chunk_size: usize,
    progress: &ProgressBar,
    cancel: &CancellationToken,
) -> Result<u64, FlowError>
where
    R: RawIo + ?Sized,
    W: RawIo + ?Sized,
{
    let mut total = 0u64;
    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Err(FlowError::Aborted),
            chunk = source.read(chunk_size) => chunk?,
        };
        if chunk.is_empty() {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(FlowError::Aborted),
            written = sink.write(&chunk) => written?,
        }

        total += chunk.len() as u64;
        progress.inc(chunk.len() as u64);
    }
    Ok(total)
}

/// Copy a file through the storage backend with throttling on both sides.
pub async fn copy_file(
    path_io: Arc<dyn PathIo>,
    source: &Path,
    dest: &Path,
    config: &ThrottleConfig,
    globals: &GlobalThrottles,
    progress: &ProgressBar,
    cancel: &CancellationToken,
) -> Result<TransferStats, FlowError> {
    config.validate()?;

    let size = path_io.size(source).await?;
    progress.set_length(size);
    let mut stats = TransferStats::new(Some(size));

    let mut src_handle = PathHandle::open(path_io.clone(), source, OpenMode::Read).await?;
    let mut dst_handle = PathHandle::open(path_io, dest, OpenMode::Write).await?;

    let mut reader = ThrottledStream::from_config(&mut src_handle, config, globals);
    let mut writer = ThrottledStream::from_config(&mut dst_handle, config, globals);

    let copied = pump(&mut reader, &mut writer, config.chunk_size, progress, cancel).await?;
    writer.finish().await?;

    stats.add_bytes(copied);
    stats.finish();
    tracing::info!(
        source = %source.display(),
        dest = %dest.display(),
        bytes = copied,
        elapsed_ms = stats.elapsed().as_millis() as u64,
        "Copy finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{duplex, AsyncWriteExt};

    use crate::backend::create_path_io;
    use crate::transfer::group::ThrottleGroup;
    use crate::transfer::deadline::Deadline;
    use crate::transfer::stream::Transport;
    use crate::transfer::throttle::RateLimit;

    #[tokio::test]
    async fn copy_file_unthrottled() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("dst.bin");
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&src, &data).unwrap();

        let stats = copy_file(
            create_path_io(RateLimit::Unlimited),
            &src,
            &dst,
            &ThrottleConfig::default(),
            &GlobalThrottles::default(),
            &ProgressBar::hidden(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(stats.bytes_done, 50_000);
        assert_eq!(std::fs::read(&dst).unwrap(), data);
    }

    #[tokio::test]
    async fn copy_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let result = copy_file(
            create_path_io(RateLimit::Unlimited),
            &dir.path().join("missing.bin"),
            &dir.path().join("out.bin"),
            &ThrottleConfig::default(),
            &GlobalThrottles::default(),
            &ProgressBar::hidden(),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(FlowError::SourceNotFound { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_throttle_wait() {
        let (mut peer, local) = duplex(64 * 1024);
        peer.write_all(&[b'z'; 8192]).await.unwrap();

        let mut src_raw = Transport::new(local);
        // 1 byte/s: the first chunk alone would wait over two hours.
        let mut source = ThrottledStream::new(
            &mut src_raw,
            ThrottleGroup::new(RateLimit::BytesPerSec(1)),
            ThrottleGroup::unlimited(),
            Deadline::unbounded(),
        );
        let (sink_side, _sink_peer) = duplex(64 * 1024);
        let mut sink_raw = Transport::new(sink_side);
        let mut sink = ThrottledStream::unthrottled(&mut sink_raw);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = pump(&mut source, &mut sink, 8192, &ProgressBar::hidden(), &cancel).await;
        assert!(matches!(result, Err(FlowError::Aborted)));
        drop(peer);
    }
}
