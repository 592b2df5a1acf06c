//! Data-connection plumbing over TCP.
//!
//! A data connection carries raw file bytes until the sender closes its
//! write side, the way a stream-mode FTP data channel does.

pub mod data;
