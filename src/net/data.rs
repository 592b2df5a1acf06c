//! Serve a file to connecting peers and fetch it from the other side.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use indicatif::ProgressBar;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::backend::{OpenMode, PathHandle, PathIo};
use crate::config::types::ThrottleConfig;
use crate::error::FlowError;
use crate::transfer::copy::pump;
use crate::transfer::deadline::Deadline;
use crate::transfer::group::GlobalThrottles;
use crate::transfer::stats::TransferStats;
use crate::transfer::stream::{ThrottledStream, Transport};

/// Open a data connection, bounded by `deadline`.
pub async fn connect(addr: &str, deadline: Deadline) -> Result<TcpStream, FlowError> {
    deadline
        .run("connect", async {
            TcpStream::connect(addr)
                .await
                .map_err(|e| FlowError::ConnectionFailed {
                    host: addr.to_string(),
                    reason: e.to_string(),
                })
        })
        .await
}

/// Pause after a failed accept before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Source of inbound data connections.
trait Accept: Send {
    fn accept(&mut self) -> BoxFuture<'_, io::Result<(TcpStream, SocketAddr)>>;
}

impl Accept for TcpListener {
    fn accept(&mut self) -> BoxFuture<'_, io::Result<(TcpStream, SocketAddr)>> {
        TcpListener::accept(self).boxed()
    }
}

/// Accept connections and stream `path` to each peer until `cancel` fires.
///
/// Each connection runs in its own task with its own per-connection
/// throttles; all of them share the throttles in `globals`. A failed accept
/// (descriptor exhaustion, aborted handshake) is logged and retried without
/// disturbing transfers already in flight. On cancellation the in-flight
/// transfers are interrupted and awaited before returning.
pub async fn serve_file(
    listener: TcpListener,
    path: PathBuf,
    path_io: Arc<dyn PathIo>,
    config: ThrottleConfig,
    globals: GlobalThrottles,
    cancel: CancellationToken,
) -> Result<(), FlowError> {
    serve_connections(listener, path, path_io, config, globals, cancel).await
}

async fn serve_connections<L: Accept>(
    mut listener: L,
    path: PathBuf,
    path_io: Arc<dyn PathIo>,
    config: ThrottleConfig,
    globals: GlobalThrottles,
    cancel: CancellationToken,
) -> Result<(), FlowError> {
    config.validate()?;
    let path = Arc::new(path);
    let config = Arc::new(config);
    let mut tasks = JoinSet::new();

    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        let (socket, peer) = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(in_flight = tasks.len(), "Accept failed, retrying: {}", e);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(ACCEPT_RETRY_DELAY) => continue,
                }
            }
        };
        tracing::info!(%peer, "Data connection accepted");

        let path = path.clone();
        let path_io = path_io.clone();
        let config = config.clone();
        let globals = globals.clone();
        let cancel = cancel.child_token();
        tasks.spawn(async move {
            match send_to_peer(socket, &path, path_io, &config, &globals, &cancel).await {
                Ok(sent) => tracing::info!(%peer, bytes = sent, "Data connection finished"),
                Err(e) if e.is_timeout() => tracing::warn!(%peer, "Data connection timed out: {}", e),
                Err(e) => tracing::warn!(%peer, "Data connection failed: {}", e),
            }
        });

        // Reap finished connections so the set does not grow unbounded.
        while tasks.try_join_next().is_some() {}
    }

    while tasks.join_next().await.is_some() {}
    Ok(())
}

async fn send_to_peer(
    socket: TcpStream,
    path: &Path,
    path_io: Arc<dyn PathIo>,
    config: &ThrottleConfig,
    globals: &GlobalThrottles,
    cancel: &CancellationToken,
) -> Result<u64, FlowError> {
    let mut file = PathHandle::open(path_io, path, OpenMode::Read).await?;
    let mut transport = Transport::new(socket);

    let mut reader = ThrottledStream::from_config(&mut file, config, globals);
    let mut writer = ThrottledStream::from_config(&mut transport, config, globals);

    let sent = pump(
        &mut reader,
        &mut writer,
        config.chunk_size,
        &ProgressBar::hidden(),
        cancel,
    )
    .await?;
    writer.finish().await?;
    Ok(sent)
}

/// Connect to `addr`, read until the peer closes and store the bytes at `dest`.
pub async fn fetch(
    addr: &str,
    dest: &Path,
    path_io: Arc<dyn PathIo>,
    config: &ThrottleConfig,
    globals: &GlobalThrottles,
    progress: &ProgressBar,
    cancel: &CancellationToken,
) -> Result<TransferStats, FlowError> {
    config.validate()?;

    let socket = connect(addr, config.deadline()).await?;
    let mut stats = TransferStats::new(None);
    let mut transport = Transport::new(socket);
    let mut file = PathHandle::open(path_io, dest, OpenMode::Write).await?;

    let mut reader = ThrottledStream::from_config(&mut transport, config, globals);
    let mut writer = ThrottledStream::from_config(&mut file, config, globals);

    let received = pump(&mut reader, &mut writer, config.chunk_size, progress, cancel).await?;
    writer.finish().await?;

    stats.add_bytes(received);
    stats.finish();
    tracing::info!(addr, bytes = received, "Fetch finished");
    Ok(stats)
}
