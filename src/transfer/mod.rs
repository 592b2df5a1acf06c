//! Throttled, deadline-bounded transfers.
//!
//! Leaves first: [`throttle`] computes per-limit waits, [`group`] combines a
//! connection's own throttle with the process-wide ones, [`deadline`] bounds
//! single operations, and [`stream`] threads both through chunked I/O.

pub mod copy;
pub mod deadline;
pub mod group;
pub mod stats;
pub mod stream;
pub mod throttle;

pub use deadline::Deadline;
pub use group::{GlobalThrottles, ThrottleGroup};
pub use stream::{RawIo, ThrottledStream, Transport};
pub use throttle::{parse_bandwidth, RateLimit, SharedThrottle, Throttle};
