//! Composition of a per-connection throttle with process-wide shared ones.

use std::time::Duration;

use tokio::time::sleep;

use crate::config::types::ThrottleConfig;
use crate::transfer::throttle::{RateLimit, SharedThrottle, Throttle};

/// Every throttle that applies to one direction of one stream.
///
/// Limits apply independently to the same bytes: each member accounts the
/// chunk and the caller waits only for the slowest of them.
#[derive(Debug, Default)]
pub struct ThrottleGroup {
    local: Throttle,
    shared: Vec<SharedThrottle>,
}

impl ThrottleGroup {
    pub fn new(local: RateLimit) -> Self {
        Self {
            local: Throttle::new(local),
            shared: Vec::new(),
        }
    }

    /// A group that never waits until something is attached or limited.
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_shared(mut self, shared: SharedThrottle) -> Self {
        self.attach(shared);
        self
    }

    pub fn local_limit(&self) -> RateLimit {
        self.local.limit()
    }

    pub fn set_local_limit(&mut self, limit: RateLimit) {
        self.local.set_limit(limit);
    }

    /// Add a shared throttle. Attaching the same throttle twice is a no-op.
    pub fn attach(&mut self, shared: SharedThrottle) {
        if !self.shared.iter().any(|s| s.same_as(&shared)) {
            self.shared.push(shared);
        }
    }

    /// Remove a shared throttle. Returns whether it was a member.
    pub fn detach(&mut self, shared: &SharedThrottle) -> bool {
        let before = self.shared.len();
        self.shared.retain(|s| !s.same_as(shared));
        before != self.shared.len()
    }

    pub fn shared_len(&self) -> usize {
        self.shared.len()
    }

    /// Open every member's measurement window that is not already running.
    pub fn start(&mut self) {
        self.local.start();
        for shared in &self.shared {
            shared.start();
        }
    }

    /// Account `bytes` on every member and return the longest required wait.
    pub fn reserve(&mut self, bytes: u64) -> Duration {
        self.shared
            .iter()
            .map(|s| s.reserve(bytes))
            .fold(self.local.reserve(bytes), Duration::max)
    }

    /// Account `bytes` on every member, then suspend once for the maximum.
    pub async fn consume(&mut self, bytes: u64) {
        let wait = self.reserve(bytes);
        if !wait.is_zero() {
            tracing::trace!(bytes, wait_ms = wait.as_millis() as u64, "Group throttle wait");
            sleep(wait).await;
        }
    }
}

/// Read and write throttles shared by every connection of one client or
/// server instance. Cloning shares the same underlying throttles.
#[derive(Debug, Clone, Default)]
pub struct GlobalThrottles {
    read: SharedThrottle,
    write: SharedThrottle,
}

impl GlobalThrottles {
    pub fn new(read: RateLimit, write: RateLimit) -> Self {
        Self {
            read: SharedThrottle::new(read),
            write: SharedThrottle::new(write),
        }
    }

    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::new(config.read_speed_limit_global, config.write_speed_limit_global)
    }

    pub fn read(&self) -> &SharedThrottle {
        &self.read
    }

    pub fn write(&self) -> &SharedThrottle {
        &self.write
    }

    pub fn set_read_limit(&self, limit: RateLimit) {
        tracing::info!(limit = %limit, "Global read limit updated");
        self.read.set_limit(limit);
    }

    pub fn set_write_limit(&self, limit: RateLimit) {
        tracing::info!(limit = %limit, "Global write limit updated");
        self.write.set_limit(limit);
    }

    /// Read-side group for a new connection.
    pub fn read_group(&self, local: RateLimit) -> ThrottleGroup {
        ThrottleGroup::new(local).with_shared(self.read.clone())
    }

    /// Write-side group for a new connection.
    pub fn write_group(&self, local: RateLimit) -> ThrottleGroup {
        ThrottleGroup::new(local).with_shared(self.write.clone())
    }
}
