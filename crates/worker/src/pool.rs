//! Keeps N fully initialized worker processes hot so `get_worker` can
//! hand one out with zero startup latency, then immediately backfills.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use forge_domain::config::{RateLimitConfig, WorkerPoolConfig};
use forge_store::Store;
use parking_lot::Mutex;
use tokio::process::Command;
use tracing::{info, warn};
use uuid::Uuid;

use crate::handle::Worker;
use crate::process::PooledWorker;
use crate::ratelimit::{RateLimiter, RetryHandler};
use crate::reconnect::SpawnBackoff;
use crate::startup_cache::StartupCache;
use crate::WorkerError;

/// Retries a provider call makes through a leased [`Worker`] before giving
/// up on a [`forge_domain::Error::ModelRetryable`] failure. The worker pool
/// config has no dedicated field for this -- it's a property of the retry
/// policy, not of how many processes we keep warm.
const DEFAULT_MAX_PROVIDER_RETRIES: u32 = 3;

/// Builds the `tokio::process::Command` used to launch a worker. Kept as
/// a trait so the gateway can plug in its own binary/args without this
/// crate knowing the executable path.
pub trait WorkerCommandFactory: Send + Sync {
    fn build(&self) -> Command;
}

struct PoolState {
    ready: VecDeque<PooledWorker>,
    spawning_count: usize,
    total_workers: usize,
    current_parallel_spawn: usize,
    consecutive_failures: u32,
}

pub struct WorkerPool {
    config: WorkerPoolConfig,
    backoff: SpawnBackoff,
    factory: Arc<dyn WorkerCommandFactory>,
    startup_cache: Arc<StartupCache>,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryHandler,
    state: Mutex<PoolState>,
    shutting_down: AtomicBool,
    spawned_total: AtomicUsize,
}

impl WorkerPool {
    pub fn new(
        config: WorkerPoolConfig,
        rate_limit: RateLimitConfig,
        store: Arc<Store>,
        factory: Arc<dyn WorkerCommandFactory>,
    ) -> Arc<Self> {
        let config = config.clamped();
        let backoff = SpawnBackoff::from_config(&config);
        let retry = RetryHandler::new(&rate_limit, DEFAULT_MAX_PROVIDER_RETRIES);
        let rate_limiter = Arc::new(RateLimiter::new(rate_limit, store));
        let pool = Arc::new(Self {
            state: Mutex::new(PoolState {
                ready: VecDeque::new(),
                spawning_count: 0,
                total_workers: 0,
                current_parallel_spawn: 1,
                consecutive_failures: 0,
            }),
            config,
            backoff,
            factory,
            startup_cache: Arc::new(StartupCache::new()),
            rate_limiter,
            retry,
            shutting_down: AtomicBool::new(false),
            spawned_total: AtomicUsize::new(0),
        });
        pool.clone().populate_pool();
        pool
    }

    pub fn startup_cache(&self) -> Arc<StartupCache> {
        self.startup_cache.clone()
    }

    /// Lease a rate-limited, retrying handle to route a provider call
    /// through. Does not consume a process from the ready queue -- callers
    /// that also need a worker process should pair this with
    /// [`WorkerPool::get_worker`].
    pub fn acquire_worker(&self) -> Worker {
        Worker::new(self.rate_limiter.clone(), self.retry.clone())
    }

    /// Schedules `min(needed, current_parallel_spawn)` spawns in parallel,
    /// where `needed = target_size - ready.size - spawning_count`.
    fn populate_pool(self: Arc<Self>) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let (to_spawn, parallel) = {
            let state = self.state.lock();
            let needed = self
                .config
                .target_size
                .saturating_sub(state.ready.len())
                .saturating_sub(state.spawning_count);
            (needed, state.current_parallel_spawn)
        };
        let batch = to_spawn.min(parallel);
        if batch == 0 {
            return;
        }
        {
            let mut state = self.state.lock();
            state.spawning_count += batch;
        }
        for _ in 0..batch {
            let pool = self.clone();
            tokio::spawn(async move {
                pool.spawn_one().await;
            });
        }
    }

    async fn spawn_one(self: Arc<Self>) {
        let worker_id = format!("worker-{}", Uuid::new_v4());
        let command = self.factory.build();
        let cache = self.startup_cache.clone();
        let cache_worker_id = worker_id.clone();
        let result = PooledWorker::spawn(
            worker_id.clone(),
            command,
            Duration::from_millis(self.config.worker_init_timeout_ms),
            move |msg| match msg {
                forge_protocol::WorkerMessage::StartupCacheRequest { key, request_id } => {
                    let reply = cache.request(key, &cache_worker_id);
                    Some(reply.into_parent_message(key.clone(), request_id.clone()))
                }
                _ => None,
            },
        )
        .await;

        match result {
            Ok(worker) => {
                self.spawned_total.fetch_add(1, Ordering::SeqCst);
                let mut state = self.state.lock();
                state.total_workers += 1;
                state.spawning_count = state.spawning_count.saturating_sub(1);
                state.consecutive_failures = 0;
                state.current_parallel_spawn = (state.current_parallel_spawn + 1)
                    .min(self.config.max_parallel_spawn);
                if worker.startup.as_millis() as u64 > self.config.slow_start_threshold_ms {
                    warn!(worker_id = %worker.worker_id, startup_ms = worker.startup.as_millis() as u64, "slow worker startup");
                } else {
                    info!(worker_id = %worker.worker_id, "worker ready");
                }
                state.ready.push_back(worker);
            }
            Err(err) => {
                warn!(worker_id = %worker_id, error = %err, "worker spawn failed");
                let delay = {
                    let mut state = self.state.lock();
                    state.spawning_count = state.spawning_count.saturating_sub(1);
                    state.current_parallel_spawn = state.current_parallel_spawn.saturating_sub(1).max(1);
                    state.consecutive_failures += 1;
                    self.backoff.delay_for_failures(state.consecutive_failures)
                };
                let pool = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    pool.populate_pool();
                });
                return;
            }
        }
        self.populate_pool();
    }

    /// Non-blocking acquire, falling back to a synchronous emergency spawn
    /// if the ready queue and in-flight spawns are both empty.
    pub async fn get_worker(self: &Arc<Self>) -> Result<PooledWorker, WorkerError> {
        loop {
            let mut state = self.state.lock();
            state.ready.retain_mut(|w| !w.is_dead());
            drop(state);
            self.clone().populate_pool();

            let dequeued = {
                let mut state = self.state.lock();
                state.ready.pop_front()
            };
            if let Some(worker) = dequeued {
                let pool = self.clone();
                tokio::spawn(async move {
                    pool.populate_pool();
                });
                return Ok(worker);
            }

            let spawning = self.state.lock().spawning_count;
            if spawning == 0 {
                return self.emergency_spawn().await;
            }
            return Err(WorkerError::NotReady);
        }
    }

    async fn emergency_spawn(self: &Arc<Self>) -> Result<PooledWorker, WorkerError> {
        let worker_id = format!("worker-{}", Uuid::new_v4());
        let command = self.factory.build();
        let cache = self.startup_cache.clone();
        let cache_worker_id = worker_id.clone();
        let worker = PooledWorker::spawn(
            worker_id,
            command,
            Duration::from_millis(self.config.worker_init_timeout_ms),
            move |msg| match msg {
                forge_protocol::WorkerMessage::StartupCacheRequest { key, request_id } => {
                    let reply = cache.request(key, &cache_worker_id);
                    Some(reply.into_parent_message(key.clone(), request_id.clone()))
                }
                _ => None,
            },
        )
        .await?;
        self.spawned_total.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.state.lock();
            state.total_workers += 1;
        }
        let pool = self.clone();
        tokio::spawn(async move {
            pool.populate_pool();
        });
        Ok(worker)
    }

    pub fn ready_len(&self) -> usize {
        self.state.lock().ready.len()
    }

    pub fn total_workers(&self) -> usize {
        self.state.lock().total_workers
    }

    pub async fn shutdown(self: &Arc<Self>) -> usize {
        self.shutting_down.store(true, Ordering::SeqCst);
        let drained: Vec<PooledWorker> = {
            let mut state = self.state.lock();
            state.ready.drain(..).collect()
        };
        let count = drained.len();
        let join_ms = Duration::from_millis(self.config.shutdown_join_ms);
        for worker in drained {
            worker.terminate(join_ms).await;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoFactory;

    impl WorkerCommandFactory for EchoFactory {
        fn build(&self) -> Command {
            // `cat` echoes stdin to stdout; it never sends a valid init
            // frame, so these tests only exercise construction/shutdown
            // bookkeeping, not a live ready queue.
            Command::new("cat")
        }
    }

    #[tokio::test]
    async fn construction_schedules_population_without_panicking() {
        let config = WorkerPoolConfig {
            target_size: 1,
            worker_init_timeout_ms: 50,
            ..Default::default()
        };
        let pool = WorkerPool::new(
            config,
            RateLimitConfig::default(),
            Arc::new(Store::in_memory()),
            Arc::new(EchoFactory),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        // `cat` never sends an init frame, so every spawn attempt times
        // out and the ready queue stays empty; shutdown just confirms
        // the pool didn't panic while retrying spawns.
        assert_eq!(pool.ready_len(), 0);
        assert_eq!(pool.shutdown().await, 0);
    }

    #[test]
    fn acquire_worker_returns_a_usable_handle_without_touching_the_ready_queue() {
        let config = WorkerPoolConfig { target_size: 0, ..Default::default() };
        let pool = WorkerPool::new(
            config,
            RateLimitConfig::default(),
            Arc::new(Store::in_memory()),
            Arc::new(EchoFactory),
        );
        let _worker = pool.acquire_worker();
        assert_eq!(pool.total_workers(), 0);
    }
}
