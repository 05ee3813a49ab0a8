//! Tunable defaults.
//!
//! Centralized location for timeouts, intervals and sizes used by the
//! streaming, metrics and backend layers.

use std::time::Duration;

/// HTTP server defaults
pub mod server {
    pub const DEFAULT_HOST: &str = "0.0.0.0";
    pub const DEFAULT_PORT: u16 = 9733;
}

/// Log streaming
pub mod logs {
    use super::Duration;

    /// Lines returned when the request does not ask for a count
    pub const DEFAULT_LINES: usize = 100;

    /// Upper bound on requested historical lines
    pub const MAX_LINES: usize = 10_000;

    /// Historical lines replayed after a log source restart
    pub const RESTART_LINES: usize = 10;

    /// Delay before re-opening a log source that exited
    pub const RESTART_DELAY: Duration = Duration::from_millis(500);

    /// Bounded wait for new data while following
    pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Consecutive restarts without progress before giving up
    pub const MAX_CONSECUTIVE_RESTARTS: u32 = 10;

    /// An attempt that stays up this long counts as progress even if it only replayed backlog
    pub const STABLE_RUN: Duration = Duration::from_secs(30);

    /// Capacity of the per-session line and error channels
    pub const CHANNEL_CAPACITY: usize = 256;
}

/// Event stream framing
pub mod events {
    use super::Duration;

    /// Heartbeat interval for log and exec streams
    pub const LOG_HEARTBEAT: Duration = Duration::from_secs(5);

    /// Heartbeat interval for live status streams
    pub const STATUS_HEARTBEAT: Duration = Duration::from_secs(2);

    /// Snapshot period for live status streams
    pub const STATUS_INTERVAL: Duration = Duration::from_secs(2);
}

/// CPU sampling
pub mod metrics {
    use super::Duration;

    /// Samples closer together than this report 0% without moving the baseline
    pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

    /// Wire value for a CPU reading with no data
    pub const NO_DATA_SENTINEL: f64 = -1.0;

    /// Baselines not refreshed within this window are evicted
    pub const BASELINE_TTL: Duration = Duration::from_secs(600);

    /// Period of the baseline eviction task
    pub const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

    /// Default mount point of the cgroup hierarchy
    pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";
}

/// systemd backend
pub mod systemd {
    use super::Duration;

    /// Timeout for start/stop/restart and property queries
    pub const UNIT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Job result reported by a successful unit operation
    pub const JOB_RESULT_DONE: &str = "done";

    pub const SERVICE_SUFFIX: &str = ".service";

    /// Concurrent property queries while assembling the service list
    pub const LIST_CONCURRENCY: usize = 8;
}

/// Container runtime backend
pub mod container {
    use super::Duration;

    /// Grace period given to stop and restart
    pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);

    /// Client-side timeout for runtime API calls, in seconds
    pub const API_TIMEOUT_SECS: u64 = 120;

    /// Length of the displayed container id
    pub const SHORT_ID_LEN: usize = 12;

    /// Concurrent inspect calls while assembling the container list
    pub const LIST_CONCURRENCY: usize = 8;

    /// How often exec output is checked for process exit
    pub const EXEC_MONITOR_INTERVAL: Duration = Duration::from_millis(100);

    /// Unix sockets probed when no host is configured
    pub const SOCKET_CANDIDATES: &[&str] = &["/var/run/docker.sock", "/run/podman/podman.sock"];
}
