//! Centralized configuration constants for the hub client.

use std::time::Duration;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    /// Default hub endpoint, overridable via `HF_ENDPOINT`.
    pub const DEFAULT_ENDPOINT: &'static str = "https://huggingface.co";
    pub const USER_AGENT: &'static str = "hubcache/0.1.0";

    /// Total timeout for API requests (metadata, repo listing).
    pub const API_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Per-phase socket timeouts for the transfer client. The transfer
    /// client has no total timeout: multi-gigabyte downloads run longer
    /// than any reasonable deadline, so only individual socket phases
    /// are bounded.
    pub const SOCKET_PHASE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Ceiling for buffered file writes during transfer and for the
    /// copy buffer in the symlink fallback.
    pub const DOWNLOAD_CHUNK_SIZE: usize = 32 * 1024;

    /// Suffix for in-flight blob downloads. A `<etag>.incomplete` file
    /// exists only while the matching lock is held.
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".incomplete";

    /// A read gap longer than this counts toward the stall budget.
    pub const STALL_CHECK_THRESHOLD: Duration = Duration::from_secs(30);
    /// Cumulative stall budget before the transfer is aborted.
    pub const STALL_ABORT_THRESHOLD: Duration = Duration::from_secs(120);

    /// Retry envelope for the transfer wrapper.
    pub const RETRY_INITIAL_DELAY: Duration = Duration::from_secs(1);
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);
    pub const RETRY_MAX_ELAPSED: Duration = Duration::from_secs(300);

    /// Default width of the snapshot worker semaphore.
    pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
    /// Capacity of the snapshot error channel.
    pub const ERROR_CHANNEL_CAPACITY: usize = 100;
}

/// Cache directory and environment configuration.
pub struct CacheConfig;

impl CacheConfig {
    /// Environment precedence for the cache root, first non-empty wins
    /// after any explicit argument: `$XDG_CACHE_HOME/huggingface/hub`,
    /// `$HF_HUB_CACHE`, `$HF_HOME/hub`, `~/.cache/huggingface/hub`.
    pub const XDG_CACHE_ENV: &'static str = "XDG_CACHE_HOME";
    pub const HUB_CACHE_ENV: &'static str = "HF_HUB_CACHE";
    pub const HF_HOME_ENV: &'static str = "HF_HOME";
    pub const ENDPOINT_ENV: &'static str = "HF_ENDPOINT";
    pub const TOKEN_ENV: &'static str = "HF_TOKEN";
    pub const OFFLINE_ENV: &'static str = "HF_HUB_OFFLINE";

    pub const BLOBS_DIR: &'static str = "blobs";
    pub const SNAPSHOTS_DIR: &'static str = "snapshots";
    pub const REFS_DIR: &'static str = "refs";
    pub const LOCKS_DIR: &'static str = ".locks";
}
