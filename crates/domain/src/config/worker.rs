use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// WorkerPool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Target number of ready (hot) workers.
    #[serde(default = "d_target_size")]
    pub target_size: usize,
    /// Maximum workers spawned in parallel during a single populate pass.
    #[serde(default = "d_max_parallel_spawn")]
    pub max_parallel_spawn: usize,
    /// How long `get_worker`'s emergency spawn path waits for a worker's
    /// init ack before giving up with `WorkerInitFailure`.
    #[serde(default = "d_worker_init_timeout_ms")]
    pub worker_init_timeout_ms: u64,
    /// Base delay before retrying a failed spawn.
    #[serde(default = "d_spawn_retry_delay_ms")]
    pub spawn_retry_delay_ms: u64,
    /// Upper bound on the exponential spawn-retry backoff.
    #[serde(default = "d_spawn_retry_delay_max_ms")]
    pub spawn_retry_delay_max_ms: u64,
    /// Logged as a warning when a worker takes longer than this to start.
    #[serde(default = "d_slow_start_threshold_ms")]
    pub slow_start_threshold_ms: u64,
    /// Grace period for `terminate → join → kill` shutdown escalation.
    #[serde(default = "d_shutdown_join_ms")]
    pub shutdown_join_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            target_size: d_target_size(),
            max_parallel_spawn: d_max_parallel_spawn(),
            worker_init_timeout_ms: d_worker_init_timeout_ms(),
            spawn_retry_delay_ms: d_spawn_retry_delay_ms(),
            spawn_retry_delay_max_ms: d_spawn_retry_delay_max_ms(),
            slow_start_threshold_ms: d_slow_start_threshold_ms(),
            shutdown_join_ms: d_shutdown_join_ms(),
        }
    }
}

impl WorkerPoolConfig {
    /// Clamp `target_size` to a sane non-zero bound and cap
    /// `max_parallel_spawn` so a single populate pass never schedules more
    /// spawns than the pool is targeting.
    pub fn clamped(&self) -> WorkerPoolConfig {
        let mut c = self.clone();
        c.target_size = c.target_size.clamp(1, 64);
        c.max_parallel_spawn = c.max_parallel_spawn.clamp(1, c.target_size.max(1));
        c
    }
}

fn d_target_size() -> usize {
    4
}
fn d_max_parallel_spawn() -> usize {
    2
}
fn d_worker_init_timeout_ms() -> u64 {
    15_000
}
fn d_spawn_retry_delay_ms() -> u64 {
    500
}
fn d_spawn_retry_delay_max_ms() -> u64 {
    30_000
}
fn d_slow_start_threshold_ms() -> u64 {
    3_000
}
fn d_shutdown_join_ms() -> u64 {
    1_000
}
