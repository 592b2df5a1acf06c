//! Bandwidth throttling and deadline-bounded I/O for file transfers.
//!
//! Protocol code moves data through a [`transfer::ThrottledStream`], which
//! bounds every raw call with a [`transfer::Deadline`] and paces the bytes
//! through per-connection and process-wide throttles. Storage access goes
//! through a pluggable [`backend::PathIo`].

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod net;
pub mod progress;
pub mod transfer;

pub use error::FlowError;
