//! Per-execution records: one [`TaskAttempt`] per try of a [`crate::plan::TaskDef`],
//! and the [`ToolCallRecord`] left behind once a tool actually runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::TaskDef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Pending,
    Running,
    Done,
    Failed,
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptState::Done | AttemptState::Failed)
    }
}

/// A single execution of a task within a plan, keyed by
/// `(plan_id, task_id, attempt_no)` with `attempt_no` monotonic from 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAttempt {
    pub plan_id: String,
    pub task_id: String,
    pub attempt_no: u32,
    /// Snapshot of the TaskDef as planned, so a later plan edit can't
    /// retroactively change what this attempt is understood to have run.
    pub definition: TaskDef,
    pub base_ctx_id: String,
    pub state: AttemptState,
    pub new_ctx_id: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub tokens: Option<u64>,
    pub cost: Option<f64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskAttempt {
    pub fn new_pending(
        plan_id: impl Into<String>,
        attempt_no: u32,
        definition: TaskDef,
        base_ctx_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            plan_id: plan_id.into(),
            task_id: definition.task_id.clone(),
            attempt_no,
            definition,
            base_ctx_id: base_ctx_id.into(),
            state: AttemptState::Pending,
            new_ctx_id: None,
            provider: None,
            model: None,
            tokens: None,
            cost: None,
            error: None,
            created_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) {
        self.state = AttemptState::Running;
        self.started_at = Some(now);
    }

    pub fn finish_done(
        &mut self,
        new_ctx_id: Option<String>,
        provider: Option<String>,
        model: Option<String>,
        tokens: Option<u64>,
        cost: Option<f64>,
        now: DateTime<Utc>,
    ) {
        self.state = AttemptState::Done;
        self.new_ctx_id = new_ctx_id;
        self.provider = provider;
        self.model = model;
        self.tokens = tokens;
        self.cost = cost;
        self.finished_at = Some(now);
    }

    pub fn finish_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.state = AttemptState::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(now);
    }
}

/// A completed tool invocation, keyed by the same
/// `(plan_id, task_id, attempt_no)` triple as its [`TaskAttempt`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub plan_id: String,
    pub task_id: String,
    pub attempt_no: u32,
    pub tool: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub input_hash: String,
    pub output_hash: Option<String>,
    /// Operations committed to context by this call, if any.
    pub ops: Vec<serde_json::Value>,
    pub latency_ms: u64,
    pub tokens: Option<u64>,
    pub cost: Option<f64>,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation records (§3.1 ambient additions)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    pub chat_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub message_id: String,
    pub chat_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
