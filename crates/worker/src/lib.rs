//! Process-isolated worker pool: spawns and maintains a hot ready queue
//! of worker processes, speaks the duplex-pipe protocol to each one,
//! arbitrates the StartupCache owner/waiter handshake between them, and
//! rate-limits the provider calls each worker makes.

pub mod handle;
pub mod pool;
pub mod process;
pub mod ratelimit;
pub mod reconnect;
pub mod startup_cache;

pub use handle::Worker;
pub use pool::{WorkerCommandFactory, WorkerPool};
pub use process::{PooledWorker, WorkerConn};
pub use ratelimit::{RateLimiter, RetryHandler, RetryableKind};
pub use reconnect::SpawnBackoff;
pub use startup_cache::{CacheReply, ResolveOutcome, StartupCache};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to spawn worker process: {0}")]
    Spawn(String),
    #[error("worker did not send init ack within the configured timeout")]
    InitTimeout,
    #[error("worker reported init failure: {0}")]
    InitFailed(String),
    #[error("no worker is ready and a spawn is already in flight")]
    NotReady,
}

impl From<WorkerError> for forge_domain::Error {
    fn from(err: WorkerError) -> Self {
        forge_domain::Error::WorkerInitFailure(err.to_string())
    }
}
