use crate::ops::{self, Operation};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An immutable, content-addressed snapshot of committed operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub ctx_id: String,
    pub base_ctx_id: String,
    pub ops: Vec<Operation>,
    pub meta: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Per-chat snapshot log. `root` is the conventional base_ctx_id a chat
/// starts from before any operations are committed.
#[derive(Default)]
struct ChatLog {
    snapshots: HashMap<String, Snapshot>,
    /// Insertion order, most recent last — drives `list_snapshots`.
    order: Vec<String>,
}

/// Ordered log of semantic operations with content-addressed snapshots.
///
/// Two commits with identical `(base_ctx_id, ops)` within the same chat
/// produce identical `new_ctx_id`, and the second commit is a no-op that
/// returns the existing snapshot's id rather than duplicating storage.
#[derive(Default)]
pub struct ContextStore {
    chats: RwLock<HashMap<String, ChatLog>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically append `ops` to a new snapshot derived from `base_ctx_id`.
    ///
    /// Returns `None` when `ops` is empty — there is nothing to commit, and
    /// no snapshot is created. `meta` is stored alongside the snapshot for
    /// attribution (task id, tool name, timing) but never affects the
    /// content address.
    pub fn commit_operations(
        &self,
        chat_id: &str,
        base_ctx_id: &str,
        ops: Vec<Operation>,
        meta: serde_json::Value,
    ) -> Option<String> {
        if ops.is_empty() {
            return None;
        }

        let new_ctx_id = ops::fingerprint(base_ctx_id, &ops);

        let mut chats = self.chats.write();
        let log = chats.entry(chat_id.to_string()).or_default();

        if log.snapshots.contains_key(&new_ctx_id) {
            return Some(new_ctx_id);
        }

        log.snapshots.insert(
            new_ctx_id.clone(),
            Snapshot {
                ctx_id: new_ctx_id.clone(),
                base_ctx_id: base_ctx_id.to_string(),
                ops,
                meta,
                created_at: chrono::Utc::now(),
            },
        );
        log.order.push(new_ctx_id.clone());

        Some(new_ctx_id)
    }

    /// Read-only lookup of a single snapshot by id.
    pub fn get_snapshot(&self, chat_id: &str, ctx_id: &str) -> Option<Snapshot> {
        self.chats.read().get(chat_id)?.snapshots.get(ctx_id).cloned()
    }

    /// The most recent `limit` snapshots for a chat, newest first.
    pub fn list_snapshots(&self, chat_id: &str, limit: usize) -> Vec<Snapshot> {
        let chats = self.chats.read();
        let Some(log) = chats.get(chat_id) else {
            return Vec::new();
        };
        log.order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| log.snapshots.get(id).cloned())
            .collect()
    }

    /// Walk from `ctx_id` back through `base_ctx_id` links, collecting every
    /// snapshot's operations in application order (oldest first). Stops at
    /// the first id with no recorded snapshot (the chat's root context).
    pub fn resolve_chain(&self, chat_id: &str, ctx_id: &str) -> Vec<Snapshot> {
        let chats = self.chats.read();
        let Some(log) = chats.get(chat_id) else {
            return Vec::new();
        };

        let mut chain = Vec::new();
        let mut current = ctx_id.to_string();
        while let Some(snapshot) = log.snapshots.get(&current) {
            chain.push(snapshot.clone());
            current = snapshot.base_ctx_id.clone();
        }
        chain.reverse();
        chain
    }
}
