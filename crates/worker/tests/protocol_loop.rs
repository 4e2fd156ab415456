//! Integration test: spawns a tiny external process that speaks the
//! length-prefixed framing protocol over stdio, and drives it through
//! `PooledWorker` exactly as the pool would. A second group of tests
//! drives the pool/rate-limit/retry stack end to end without any child
//! process at all, since that stack's only real dependency is a
//! provider call.
//!
//! The fake worker is a `python3` one-liner rather than a built binary —
//! this crate has no worker binary of its own to spawn, and the point
//! of the test is to exercise the framing/handshake code on a real OS
//! pipe, not to implement a worker.

use std::process::Stdio;
use std::time::Duration;

use forge_protocol::{ParentMessage, WorkerMessage};
use forge_worker::PooledWorker;
use tokio::process::Command;

/// Reads one length-prefixed JSON frame from stdin, writes one back, in
/// a loop, until stdin closes. Sends an `init` frame first.
const FAKE_WORKER_PY: &str = r#"
import sys, struct, json

def write(obj):
    body = json.dumps(obj).encode()
    sys.stdout.buffer.write(struct.pack(">I", len(body)))
    sys.stdout.buffer.write(body)
    sys.stdout.buffer.flush()

def read():
    head = sys.stdin.buffer.read(4)
    if len(head) < 4:
        return None
    (n,) = struct.unpack(">I", head)
    body = sys.stdin.buffer.read(n)
    return json.loads(body)

write({"type": "init", "success": True, "error": None})
while True:
    msg = read()
    if msg is None:
        break
    if msg.get("type") == "stop":
        break
"#;

fn fake_worker_command() -> Command {
    let mut cmd = Command::new("python3");
    cmd.arg("-c").arg(FAKE_WORKER_PY);
    cmd
}

#[tokio::test]
async fn pooled_worker_completes_init_handshake() {
    let worker = PooledWorker::spawn(
        "test-worker".into(),
        fake_worker_command(),
        Duration::from_secs(5),
        |_msg| None,
    )
    .await
    .expect("fake worker should complete init");

    assert_eq!(worker.worker_id, "test-worker");
}

#[tokio::test]
async fn pooled_worker_terminates_cleanly_on_stop() {
    let worker = PooledWorker::spawn(
        "test-worker".into(),
        fake_worker_command(),
        Duration::from_secs(5),
        |_msg| None,
    )
    .await
    .expect("fake worker should complete init");

    worker.terminate(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn init_timeout_kills_a_process_that_never_acks() {
    let mut cmd = Command::new("sleep");
    cmd.arg("5").stdin(Stdio::piped()).stdout(Stdio::piped());

    let result = PooledWorker::spawn(
        "slow-worker".into(),
        cmd,
        Duration::from_millis(100),
        |_msg: &WorkerMessage| None,
    )
    .await;

    assert!(matches!(
        result,
        Err(forge_worker::WorkerError::InitTimeout)
    ));
}

#[tokio::test]
async fn conn_can_send_a_cancel_message_after_init() {
    let mut worker = PooledWorker::spawn(
        "test-worker".into(),
        fake_worker_command(),
        Duration::from_secs(5),
        |_msg| None,
    )
    .await
    .expect("fake worker should complete init");

    worker
        .conn
        .send(&ParentMessage::Cancel {
            request_id: "r1".into(),
        })
        .await
        .expect("send should succeed over a live pipe");

    worker.terminate(Duration::from_secs(2)).await;
}

/// Sends a `startup_cache_request` before `init`, then asserts it got a
/// reply on the same pipe before it can move on to sending `init` — the
/// handshake loop in `process.rs` must write that reply inline, not drop
/// it on the floor.
const CACHE_PROBE_WORKER_PY: &str = r#"
import sys, struct, json

def write(obj):
    body = json.dumps(obj).encode()
    sys.stdout.buffer.write(struct.pack(">I", len(body)))
    sys.stdout.buffer.write(body)
    sys.stdout.buffer.flush()

def read():
    head = sys.stdin.buffer.read(4)
    if len(head) < 4:
        return None
    (n,) = struct.unpack(">I", head)
    body = sys.stdin.buffer.read(n)
    return json.loads(body)

write({"type": "startup_cache_request", "key": "probe", "request_id": "r1"})
reply = read()
assert reply is not None and reply.get("type", "").startswith("startup_cache"), reply
write({"type": "init", "success": True, "error": None})
while True:
    msg = read()
    if msg is None or msg.get("type") == "stop":
        break
"#;

#[tokio::test]
async fn init_handshake_answers_a_startup_cache_request_before_init_completes() {
    let mut cmd = Command::new("python3");
    cmd.arg("-c").arg(CACHE_PROBE_WORKER_PY);

    let worker = PooledWorker::spawn(
        "cache-probe-worker".into(),
        cmd,
        Duration::from_secs(5),
        |msg| match msg {
            WorkerMessage::StartupCacheRequest { key, request_id } => {
                Some(ParentMessage::StartupCacheMiss { key: key.clone(), request_id: request_id.clone() })
            }
            _ => None,
        },
    )
    .await
    .expect("worker should complete init after its cache probe is answered");

    worker.terminate(Duration::from_secs(2)).await;
}

/// Drives `WorkerPool::acquire_worker` -> `Worker::chat` -> `RateLimiter`
/// without spawning any OS process — the pool only needs its factory to
/// build *something*; the provider call is what exercises the rate-limit
/// and retry machinery end to end.
mod rate_limited_chat {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use forge_domain::capability::LlmCapabilities;
    use forge_domain::config::{RateLimitConfig, ScopeLimits, WorkerPoolConfig};
    use forge_domain::error::{Error, Result};
    use forge_domain::stream::{BoxStream, StreamEvent};
    use forge_domain::tool::Message;
    use forge_providers::{ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider};
    use forge_store::Store;
    use forge_worker::{WorkerCommandFactory, WorkerPool};
    use tokio::process::Command;

    struct DeadFactory;

    impl WorkerCommandFactory for DeadFactory {
        fn build(&self) -> Command {
            // Never actually spawned by these tests: `acquire_worker`
            // does not touch the ready queue or the factory at all.
            Command::new("true")
        }
    }

    struct CountingProvider {
        fail_first: AtomicUsize,
        capabilities: LlmCapabilities,
    }

    #[async_trait]
    impl LlmProvider for CountingProvider {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
            if self.fail_first.fetch_sub(1, Ordering::SeqCst) > 0 {
                return Err(Error::ModelRetryable {
                    provider: "stub".into(),
                    message: "rate limited".into(),
                    retry_after_ms: Some(5),
                });
            }
            Ok(ChatResponse {
                content: "ok".into(),
                tool_calls: vec![],
                usage: None,
                model: "stub".into(),
                finish_reason: Some("stop".into()),
            })
        }

        async fn chat_stream(&self, _req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            unimplemented!()
        }

        async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
            unimplemented!()
        }

        fn capabilities(&self) -> &LlmCapabilities {
            &self.capabilities
        }

        fn provider_id(&self) -> &str {
            "stub"
        }
    }

    fn req() -> ChatRequest {
        ChatRequest {
            messages: vec![Message::user("hi")],
            tools: vec![],
            temperature: None,
            max_tokens: None,
            json_mode: false,
            model: None,
        }
    }

    #[tokio::test]
    async fn worker_retries_a_retryable_failure_and_eventually_succeeds() {
        let rate_limit = RateLimitConfig { advised_retry_buffer_ms: 0, ..Default::default() };
        let pool = WorkerPool::new(
            WorkerPoolConfig { target_size: 0, ..Default::default() },
            rate_limit,
            Arc::new(Store::in_memory()),
            Arc::new(DeadFactory),
        );
        let worker = pool.acquire_worker();
        let provider = CountingProvider {
            fail_first: AtomicUsize::new(2),
            capabilities: LlmCapabilities::default(),
        };

        let response = worker.chat(&provider, req()).await.expect("should retry past transient failures");
        assert_eq!(response.content, "ok");
    }

    #[tokio::test]
    async fn worker_honors_a_configured_per_minute_request_limit() {
        let mut rate_limit = RateLimitConfig::default();
        rate_limit.max_wait_ms = 0;
        rate_limit.scopes.insert(
            "global".into(),
            ScopeLimits { requests_per_minute: Some(1), ..Default::default() },
        );

        let pool = WorkerPool::new(
            WorkerPoolConfig { target_size: 0, ..Default::default() },
            rate_limit,
            Arc::new(Store::in_memory()),
            Arc::new(DeadFactory),
        );
        let provider = CountingProvider {
            fail_first: AtomicUsize::new(0),
            capabilities: LlmCapabilities::default(),
        };

        let first = pool.acquire_worker().chat(&provider, req()).await;
        assert!(first.is_ok());

        // Same pool means the same shared `RateLimiter`/`Store`, so the
        // second worker sees the first request's usage immediately.
        let second = pool.acquire_worker().chat(&provider, req()).await;
        assert!(matches!(second, Err(Error::RateLimited(_))));
    }
}
