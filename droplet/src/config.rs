//! Resolved runtime settings.

use droplet_core::{AllocatorConfig, Retention};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Sweep period in normal operation.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Sweep period in debug mode.
pub const DEBUG_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Default retention, in days.
pub const DEFAULT_EXPIRE_DAYS: u64 = 3;

/// Default upload limit, in MiB.
pub const DEFAULT_MAX_SIZE_MB: u64 = 100;

/// Default listen address.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8088";

/// Everything the server and the one-shot sweep need, validated once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Storage root, before it is created.
    pub root: PathBuf,
    /// Debug mode: every file expires and sweeps run often.
    pub debug: bool,
    /// Token generation and collision handling.
    pub allocator: AllocatorConfig,
    /// How long uploads are kept.
    pub retention: Retention,
    /// Time between sweeps.
    pub sweep_interval: Duration,
    /// Address the HTTP server binds.
    pub listen: SocketAddr,
    /// Largest accepted upload, in bytes.
    pub max_size: u64,
    /// Build `http://` download URLs instead of `https://`.
    pub insecure: bool,
}
