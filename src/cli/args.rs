use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::config::types::ThrottleConfig;
use crate::transfer::throttle::RateLimit;

#[derive(Parser, Debug)]
#[command(
    name = "flowcap",
    version,
    about = "Bandwidth-capped, deadline-bounded file transfers"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v for verbose, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode: suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file to use instead of config.toml in the config directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy a local file through throttled storage I/O
    Cp(CpArgs),

    /// Serve a file to every peer that connects
    Serve(ServeArgs),

    /// Download from a serving peer into a local file
    Fetch(FetchArgs),
}

#[derive(clap::Args, Debug)]
pub struct CpArgs {
    /// Source file
    pub source: PathBuf,

    /// Destination file
    pub dest: PathBuf,

    #[command(flatten)]
    pub limits: LimitArgs,
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// File to serve
    pub file: PathBuf,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:9741")]
    pub bind: String,

    #[command(flatten)]
    pub limits: LimitArgs,
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Peer address (host:port)
    pub addr: String,

    /// Destination file
    pub dest: PathBuf,

    #[command(flatten)]
    pub limits: LimitArgs,
}

/// Limit flags shared by every transfer command. Each overrides the config file.
#[derive(clap::Args, Debug, Default)]
pub struct LimitArgs {
    /// Per-connection read limit (e.g., "100KiB/s", "10MB/s", "unlimited")
    #[arg(long)]
    pub read_limit: Option<RateLimit>,

    /// Per-connection write limit
    #[arg(long)]
    pub write_limit: Option<RateLimit>,

    /// Read limit shared by all connections of this process
    #[arg(long)]
    pub read_limit_global: Option<RateLimit>,

    /// Write limit shared by all connections of this process
    #[arg(long)]
    pub write_limit_global: Option<RateLimit>,

    /// Bound on each connect, read and write (e.g., "30s", "500ms"; 0 disables)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Bytes requested per read
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Simulate storage that moves only this many bytes per second
    #[arg(long)]
    pub storage_rate: Option<RateLimit>,
}

impl LimitArgs {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut ThrottleConfig) {
        if let Some(limit) = self.read_limit {
            config.read_speed_limit = limit;
        }
        if let Some(limit) = self.write_limit {
            config.write_speed_limit = limit;
        }
        if let Some(limit) = self.read_limit_global {
            config.read_speed_limit_global = limit;
        }
        if let Some(limit) = self.write_limit_global {
            config.write_speed_limit_global = limit;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = Some(timeout);
        }
        if let Some(size) = self.chunk_size {
            config.chunk_size = size;
        }
        if let Some(rate) = self.storage_rate {
            config.storage_rate = rate;
        }
    }
}
