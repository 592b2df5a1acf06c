//! Rate throttling for chunked transfers.
//!
//! A [`Throttle`] keeps a measurement window: the instant the window opened
//! and the bytes accounted since. After each accounted chunk it returns how
//! long the caller must stay suspended so that `transferred / elapsed` does
//! not exceed the limit. Time that already passed inside the raw I/O counts
//! toward the window, so a transfer whose storage is slower than the limit
//! never waits on top of the storage delay.
//!
//! `parse_bandwidth` converts human-readable strings like "100KiB/s" into a
//! [`RateLimit`].

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use tokio::time::{sleep, Instant};

use crate::error::FlowError;

/// Slack (time elapsed beyond what the accounted bytes needed) after which
/// the window is restarted. Bounds how much idle time can be spent as burst.
pub const IDLE_RESET: Duration = Duration::from_secs(1);

/// Keywords accepted in place of a number to disable a limit.
const UNLIMITED_KEYWORDS: &[&str] = &["unlimited", "none", "off"];

/// A transfer-rate ceiling in bytes per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimit {
    #[default]
    Unlimited,
    BytesPerSec(u64),
}

impl RateLimit {
    /// Build a limit from a signed byte rate, rejecting zero and negatives.
    pub fn from_bytes_per_sec(bps: i64) -> Result<Self, FlowError> {
        if bps < 0 {
            return Err(FlowError::Config(format!(
                "Bandwidth limit cannot be negative: {}",
                bps
            )));
        }
        if bps == 0 {
            return Err(FlowError::Config(
                "Bandwidth limit must be greater than 0 (use 'unlimited' to disable)".to_string(),
            ));
        }
        Ok(RateLimit::BytesPerSec(bps as u64))
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, RateLimit::Unlimited)
    }

    pub fn bytes_per_sec(&self) -> Option<u64> {
        match self {
            RateLimit::Unlimited => None,
            RateLimit::BytesPerSec(bps) => Some(*bps),
        }
    }

    /// Time needed to move `bytes` at this rate. Zero when unlimited.
    pub fn time_for(&self, bytes: u64) -> Duration {
        match self {
            RateLimit::Unlimited => Duration::ZERO,
            RateLimit::BytesPerSec(bps) => Duration::from_secs_f64(bytes as f64 / *bps as f64),
        }
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimit::Unlimited => write!(f, "unlimited"),
            RateLimit::BytesPerSec(bps) => write!(f, "{}/s", bytesize::ByteSize(*bps)),
        }
    }
}

impl FromStr for RateLimit {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_bandwidth(s)
    }
}

impl Serialize for RateLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RateLimit::Unlimited => serializer.serialize_str("unlimited"),
            RateLimit::BytesPerSec(bps) => serializer.serialize_u64(*bps),
        }
    }
}

impl<'de> Deserialize<'de> for RateLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(bps) => RateLimit::from_bytes_per_sec(bps).map_err(de::Error::custom),
            Raw::Text(text) => parse_bandwidth(&text).map_err(de::Error::custom),
        }
    }
}

/// Parse a human-readable bandwidth string into a [`RateLimit`].
///
/// Accepts formats like "10MB/s", "500KiB/s", "1024" and the keywords
/// "unlimited", "none" and "off". The "/s" suffix is optional. Units follow
/// the `bytesize` crate: SI (MB = 1,000,000) and IEC (MiB = 1,048,576).
pub fn parse_bandwidth(s: &str) -> Result<RateLimit, FlowError> {
    let s = s.trim();
    if UNLIMITED_KEYWORDS
        .iter()
        .any(|kw| s.eq_ignore_ascii_case(kw))
    {
        return Ok(RateLimit::Unlimited);
    }

    let size_str = if s.to_lowercase().ends_with("/s") {
        &s[..s.len() - 2]
    } else {
        s
    };

    if let Ok(bps) = size_str.trim().parse::<i64>() {
        return RateLimit::from_bytes_per_sec(bps);
    }

    let bytes: bytesize::ByteSize = size_str.trim().parse().map_err(|_| {
        FlowError::Config(format!(
            "Invalid bandwidth format: '{}'. Use formats like '10MB/s', '500KiB/s' or 'unlimited'",
            s
        ))
    })?;

    match bytes.as_u64() {
        0 => Err(FlowError::Config(
            "Bandwidth limit must be greater than 0 (use 'unlimited' to disable)".to_string(),
        )),
        bps => Ok(RateLimit::BytesPerSec(bps)),
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    transferred: u64,
}

/// Single-owner rate throttle.
#[derive(Debug)]
pub struct Throttle {
    limit: RateLimit,
    window: Option<Window>,
}

impl Throttle {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            window: None,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(RateLimit::Unlimited)
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Replace the limit. The measurement window restarts now, so bytes moved
    /// under the old limit are never charged.
    pub fn set_limit(&mut self, limit: RateLimit) {
        if limit != self.limit {
            tracing::debug!(old = %self.limit, new = %limit, "Throttle limit changed");
        }
        self.limit = limit;
        self.window = None;
        self.start();
    }

    /// Open the measurement window unless one is already running.
    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    /// Open the measurement window at `now` unless one is already running.
    ///
    /// A transfer calls this before its first raw I/O so the time spent
    /// moving the first chunk counts as elapsed.
    pub fn start_at(&mut self, now: Instant) {
        if !self.limit.is_unlimited() && self.window.is_none() {
            self.window = Some(Window {
                start: now,
                transferred: 0,
            });
        }
    }

    /// Account `bytes` and return how long the caller must wait.
    pub fn reserve(&mut self, bytes: u64) -> Duration {
        self.reserve_at(bytes, Instant::now())
    }

    /// Account `bytes` as of `now` and return the required wait.
    ///
    /// Never suspends; [`Throttle::consume`] and the group layer do that.
    pub fn reserve_at(&mut self, bytes: u64, now: Instant) -> Duration {
        if self.limit.is_unlimited() || bytes == 0 {
            return Duration::ZERO;
        }

        let window = self.window.get_or_insert(Window {
            start: now,
            transferred: 0,
        });

        let elapsed = now.saturating_duration_since(window.start);
        window.transferred = window.transferred.saturating_add(bytes);
        let required = self.limit.time_for(window.transferred);

        if elapsed > required + IDLE_RESET {
            tracing::debug!(
                idle_ms = (elapsed - required).as_millis() as u64,
                "Throttle window reset after idle period"
            );
            // Restart as if this chunk had just been moved at exactly the limit.
            let charged = self.limit.time_for(bytes);
            *window = Window {
                start: now.checked_sub(charged).unwrap_or(now),
                transferred: bytes,
            };
            return Duration::ZERO;
        }

        required.saturating_sub(elapsed)
    }

    /// Account `bytes` and suspend for whatever the limit requires.
    pub async fn consume(&mut self, bytes: u64) {
        let wait = self.reserve(bytes);
        if !wait.is_zero() {
            tracing::trace!(bytes, wait_ms = wait.as_millis() as u64, "Throttle wait");
            sleep(wait).await;
        }
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Reference-counted throttle shared by many connections.
///
/// Accounting happens under a mutex that is released before any waiting, so
/// concurrent consumers never interleave their window updates and never hold
/// the lock across a suspension point.
#[derive(Debug, Clone, Default)]
pub struct SharedThrottle {
    inner: Arc<Mutex<Throttle>>,
}

impl SharedThrottle {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Throttle::new(limit))),
        }
    }

    pub fn limit(&self) -> RateLimit {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .limit()
    }

    pub fn set_limit(&self, limit: RateLimit) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_limit(limit)
    }

    pub fn reserve(&self, bytes: u64) -> Duration {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reserve(bytes)
    }

    pub fn start(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .start()
    }

    /// Whether two handles refer to the same throttle.
    pub fn same_as(&self, other: &SharedThrottle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
