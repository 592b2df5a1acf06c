//! Transfer statistics and completion summaries.

use std::time::Duration;

use bytesize::ByteSize;
use tokio::time::Instant;

/// Bytes moved and wall-clock time for one transfer.
#[derive(Debug, Clone)]
pub struct TransferStats {
    pub bytes_total: Option<u64>,
    pub bytes_done: u64,
    pub started: Instant,
    pub finished: Option<Instant>,
}

impl TransferStats {
    /// Start tracking a transfer; `bytes_total` is unknown for sockets.
    pub fn new(bytes_total: Option<u64>) -> Self {
        Self {
            bytes_total,
            bytes_done: 0,
            started: Instant::now(),
            finished: None,
        }
    }

    pub fn add_bytes(&mut self, bytes: u64) {
        self.bytes_done += bytes;
    }

    /// Freeze the elapsed time.
    pub fn finish(&mut self) {
        self.finished = Some(Instant::now());
    }

    /// Elapsed time from start to finish, or to now if still running.
    pub fn elapsed(&self) -> Duration {
        self.finished
            .unwrap_or_else(Instant::now)
            .saturating_duration_since(self.started)
    }

    /// Average throughput in bytes per second.
    pub fn throughput_bps(&self) -> u64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            (self.bytes_done as f64 / secs) as u64
        } else {
            0
        }
    }

    /// One-line completion summary:
    ///
    /// ```text
    /// Completed: 300.0 KB in 3.0s @ 100.0 KB/s
    /// ```
    pub fn summary(&self) -> String {
        format!(
            "Completed: {} in {:.1}s @ {}/s",
            ByteSize(self.bytes_done),
            self.elapsed().as_secs_f64(),
            ByteSize(self.throughput_bps()),
        )
    }

    /// Print the summary to stderr unless quiet.
    pub fn print_summary(&self, quiet: bool) {
        if !quiet {
            eprintln!("{}", self.summary());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stats_start_at_zero() {
        let stats = TransferStats::new(Some(1000));
        assert_eq!(stats.bytes_total, Some(1000));
        assert_eq!(stats.bytes_done, 0);
        assert!(stats.finished.is_none());
    }

    #[test]
    fn add_bytes_accumulates() {
        let mut stats = TransferStats::new(None);
        stats.add_bytes(100);
        stats.add_bytes(200);
        assert_eq!(stats.bytes_done, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn throughput_over_frozen_elapsed() {
        let mut stats = TransferStats::new(None);
        stats.add_bytes(300 * 1024);
        tokio::time::advance(Duration::from_secs(3)).await;
        stats.finish();
        tokio::time::advance(Duration::from_secs(10)).await;

        assert_eq!(stats.elapsed(), Duration::from_secs(3));
        assert_eq!(stats.throughput_bps(), 100 * 1024);
        assert!(stats.summary().starts_with("Completed:"));
        assert!(stats.summary().contains("3.0s"));
    }

    #[tokio::test(start_paused = true)]
    async fn summary_formats_size_time_and_rate() {
        let mut stats = TransferStats::new(Some(300_000));
        stats.add_bytes(300_000);
        tokio::time::advance(Duration::from_secs(3)).await;
        stats.finish();

        assert_eq!(stats.summary(), "Completed: 300.0 KB in 3.0s @ 100.0 KB/s");
    }
}
