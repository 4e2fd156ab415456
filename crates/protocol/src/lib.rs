//! Wire protocol spoken on a worker's duplex pipe: command dispatch,
//! streamed results, and the StartupCache owner/waiter handshake.
//!
//! Messages are framed with a 4-byte big-endian length prefix followed
//! by a JSON body, so either side can read a complete message off a
//! plain OS pipe without a higher-level transport.

use serde::{Deserialize, Serialize};

pub mod framing;

/// Parent → worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ParentMessage {
    /// Run a generation turn.
    #[serde(rename = "chat")]
    Chat {
        request_id: String,
        chat_id: String,
        plan_id: String,
        task_id: String,
        prompt: serde_json::Value,
    },
    /// Ask the worker to exit gracefully.
    #[serde(rename = "stop")]
    Stop,
    /// Abort the in-flight command, if any.
    #[serde(rename = "cancel")]
    Cancel { request_id: String },
    /// Push a fresh config snapshot (e.g. after a rate-limit override).
    #[serde(rename = "config_reload")]
    ConfigReload { config: serde_json::Value },
    /// Reply to a `startup_cache_request`.
    #[serde(rename = "startup_cache_hit")]
    StartupCacheHit {
        key: String,
        request_id: String,
        value: serde_json::Value,
    },
    #[serde(rename = "startup_cache_miss")]
    StartupCacheMiss { key: String, request_id: String },
    #[serde(rename = "startup_cache_wait")]
    StartupCacheWait { key: String, request_id: String },
    /// Ack of a `startup_cache_update`/`startup_cache_update_failed`.
    #[serde(rename = "startup_cache_ack")]
    StartupCacheAck { key: String, request_id: String },
}

/// Worker → parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    /// Sent once, immediately after the worker finishes initializing.
    #[serde(rename = "init")]
    Init { success: bool, error: Option<String> },
    /// Incremental generation output.
    #[serde(rename = "chat_chunk")]
    ChatChunk { request_id: String, text: String },
    /// Terminal message for a `chat` command.
    #[serde(rename = "chat_done")]
    ChatDone {
        request_id: String,
        output: serde_json::Value,
        usage: Option<UsageReport>,
    },
    #[serde(rename = "chat_error")]
    ChatError { request_id: String, message: String },
    #[serde(rename = "chat_cancelled")]
    ChatCancelled { request_id: String },
    /// Worker wants the owner/waiter protocol run for `key`.
    #[serde(rename = "startup_cache_request")]
    StartupCacheRequest { key: String, request_id: String },
    /// Owner publishes the value it produced.
    #[serde(rename = "startup_cache_update")]
    StartupCacheUpdate {
        key: String,
        request_id: String,
        value: serde_json::Value,
    },
    /// Owner failed to produce the value; parent promotes the next waiter.
    #[serde(rename = "startup_cache_update_failed")]
    StartupCacheUpdateFailed {
        key: String,
        request_id: String,
        error: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UsageReport {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_message_tag_roundtrips() {
        let msg = ParentMessage::Cancel {
            request_id: "r1".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"cancel\""));
        let back: ParentMessage = serde_json::from_str(&json).unwrap();
        match back {
            ParentMessage::Cancel { request_id } => assert_eq!(request_id, "r1"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn worker_init_message_roundtrips() {
        let msg = WorkerMessage::Init {
            success: true,
            error: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: WorkerMessage = serde_json::from_str(&json).unwrap();
        match back {
            WorkerMessage::Init { success, error } => {
                assert!(success);
                assert!(error.is_none());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn startup_cache_request_roundtrips() {
        let msg = WorkerMessage::StartupCacheRequest {
            key: "model_catalog".into(),
            request_id: "req-1".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: WorkerMessage = serde_json::from_str(&json).unwrap();
        match back {
            WorkerMessage::StartupCacheRequest { key, request_id } => {
                assert_eq!(key, "model_catalog");
                assert_eq!(request_id, "req-1");
            }
            _ => panic!("wrong variant"),
        }
    }
}
