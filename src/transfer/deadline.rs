//! Wall-clock bound for a single pending operation.

use std::future::Future;
use std::time::Duration;

use crate::error::FlowError;

/// Upper bound on how long one operation may take. Unset or zero means the
/// operation runs unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline {
    after: Option<Duration>,
}

impl Deadline {
    pub fn new(after: Option<Duration>) -> Self {
        Self {
            after: after.filter(|d| !d.is_zero()),
        }
    }

    pub fn unbounded() -> Self {
        Self { after: None }
    }

    pub fn after(&self) -> Option<Duration> {
        self.after
    }

    /// Run `operation` under this deadline.
    ///
    /// If the bound elapses first, the operation's future is dropped, which
    /// cancels it and releases whatever it held, and `FlowError::Timeout` is
    /// returned. Errors from the operation itself pass through unchanged.
    pub async fn run<F, T, E>(&self, operation: &'static str, fut: F) -> Result<T, FlowError>
    where
        F: Future<Output = Result<T, E>>,
        FlowError: From<E>,
    {
        let Some(after) = self.after else {
            return fut.await.map_err(FlowError::from);
        };

        match tokio::time::timeout(after, fut).await {
            Ok(result) => result.map_err(FlowError::from),
            Err(_) => {
                tracing::warn!(operation, after_ms = after.as_millis() as u64, "Deadline exceeded");
                Err(FlowError::Timeout { operation, after })
            }
        }
    }
}

impl From<Option<Duration>> for Deadline {
    fn from(after: Option<Duration>) -> Self {
        Deadline::new(after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::time::sleep;

    async fn finishes_after(d: Duration, done: Arc<AtomicBool>) -> Result<u32, std::io::Error> {
        sleep(d).await;
        done.store(true, Ordering::SeqCst);
        Ok(7)
    }

    #[tokio::test(start_paused = true)]
    async fn completes_within_bound() {
        let done = Arc::new(AtomicBool::new(false));
        let deadline = Deadline::new(Some(Duration::from_secs(2)));
        let value = deadline
            .run("read", finishes_after(Duration::from_secs(1), done.clone()))
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_and_cancels() {
        let done = Arc::new(AtomicBool::new(false));
        let deadline = Deadline::new(Some(Duration::from_secs(1)));
        let err = deadline
            .run("write", finishes_after(Duration::from_secs(2), done.clone()))
            .await
            .unwrap_err();

        match err {
            FlowError::Timeout { operation, after } => {
                assert_eq!(operation, "write");
                assert_eq!(after, Duration::from_secs(1));
            }
            other => panic!("Expected Timeout, got: {:?}", other),
        }

        // The operation was dropped, so its effect never lands.
        sleep(Duration::from_secs(5)).await;
        assert!(!done.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_means_unbounded() {
        let deadline = Deadline::new(Some(Duration::ZERO));
        assert_eq!(deadline, Deadline::unbounded());

        let done = Arc::new(AtomicBool::new(false));
        let value = deadline
            .run("read", finishes_after(Duration::from_secs(3600), done))
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn operation_errors_pass_through() {
        let deadline = Deadline::new(Some(Duration::from_secs(1)));
        let err = deadline
            .run("read", async {
                Err::<(), _>(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
            })
            .await
            .unwrap_err();
        assert!(!err.is_timeout());
        assert!(matches!(err, FlowError::Io { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn shorter_inner_deadline_fires_first() {
        let outer = Deadline::new(Some(Duration::from_secs(10)));
        let inner = Deadline::new(Some(Duration::from_secs(1)));
        let done = Arc::new(AtomicBool::new(false));

        let err = outer
            .run(
                "transfer",
                inner.run("read", finishes_after(Duration::from_secs(5), done)),
            )
            .await
            .unwrap_err();

        match err {
            FlowError::Timeout { operation, .. } => assert_eq!(operation, "read"),
            other => panic!("Expected inner Timeout, got: {:?}", other),
        }
    }
}
