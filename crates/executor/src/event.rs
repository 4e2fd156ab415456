//! The progress events an [`crate::executor::Executor`] run emits, and the
//! envelope a consumer (the demonstration CLI, a future SSE bridge) wraps
//! them in.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One step of plan execution, tagged the way the rest of the crate's
/// wire types are.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    TaskStateChanged {
        plan_id: String,
        task_id: String,
        state: String,
        attempt: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        ctx_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ContextCommitted {
        plan_id: String,
        task_id: String,
        base_ctx_id: String,
        new_ctx_id: String,
        ops: Vec<Value>,
    },
    ToolCalled {
        plan_id: String,
        task_id: String,
        attempt: u32,
        tool: String,
        latency_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
}

/// Wraps an [`EventKind`] with a sequence number monotonic per plan run,
/// so a consumer printing one JSON object per line can detect drops or
/// reordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub seq: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Sink an [`Executor`](crate::executor::Executor) run pushes
/// [`RunEvent`]s to. A `Vec`-backed sink is enough for the demonstration
/// CLI and for tests; a future SSE bridge would implement this against a
/// channel instead.
pub trait EventSink {
    fn emit(&mut self, kind: EventKind);
}

/// Assigns sequence numbers and collects events in emission order.
#[derive(Default)]
pub struct RecordingSink {
    next_seq: u64,
    pub events: Vec<RunEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, kind: EventKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(RunEvent { seq, kind });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_assigns_monotonic_seq() {
        let mut sink = RecordingSink::new();
        sink.emit(EventKind::ToolCalled {
            plan_id: "p1".into(),
            task_id: "t1".into(),
            attempt: 1,
            tool: "noop".into(),
            latency_ms: 5,
            provider: None,
            model: None,
        });
        sink.emit(EventKind::ToolCalled {
            plan_id: "p1".into(),
            task_id: "t2".into(),
            attempt: 1,
            tool: "noop".into(),
            latency_ms: 5,
            provider: None,
            model: None,
        });
        assert_eq!(sink.events[0].seq, 0);
        assert_eq!(sink.events[1].seq, 1);
    }

    #[test]
    fn run_event_serializes_with_flattened_kind() {
        let event = RunEvent {
            seq: 3,
            kind: EventKind::ContextCommitted {
                plan_id: "p1".into(),
                task_id: "t1".into(),
                base_ctx_id: "root".into(),
                new_ctx_id: "ctx1".into(),
                ops: vec![],
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["seq"], 3);
        assert_eq!(json["type"], "context_committed");
        assert_eq!(json["new_ctx_id"], "ctx1");
    }
}
