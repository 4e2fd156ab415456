//! Durable store for plans, task attempts, tool call records, and the
//! minimal conversation tables the executor is exercised against.
//!
//! Persists to a single JSON file under the configured state path,
//! following the same load-on-construct / explicit-flush pattern the
//! donor used for its session store: an in-memory `RwLock`-guarded
//! snapshot that's the source of truth at runtime, written to disk only
//! when [`Store::flush`] is called.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use forge_domain::attempt::{ChatRecord, MessageRecord, TaskAttempt, ToolCallRecord};
use forge_domain::error::{Error, Result};
use forge_domain::plan::{PlanRecord, PlanStatus};

use crate::ratelimit::{self, RateLimitUsage, UsageWindow};

/// Everything the store persists, bundled for a single JSON round-trip.
#[derive(Default, Serialize, Deserialize)]
struct StoreState {
    chats: HashMap<String, ChatRecord>,
    messages: HashMap<String, Vec<MessageRecord>>,
    plans: HashMap<String, PlanRecord>,
    /// Keyed by `"{plan_id}/{task_id}"`, ordered by ascending `attempt_no`.
    attempts: HashMap<String, Vec<TaskAttempt>>,
    tool_calls: HashMap<String, Vec<ToolCallRecord>>,
    rate_limit_usage: HashMap<String, RateLimitUsage>,
}

fn attempt_key(plan_id: &str, task_id: &str) -> String {
    format!("{plan_id}/{task_id}")
}

pub struct Store {
    state_path: PathBuf,
    state: RwLock<StoreState>,
}

impl Store {
    /// Load or create the store at `state_path/store.json`.
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;
        let state_path = state_path.join("store.json");

        let state = if state_path.exists() {
            let raw = std::fs::read_to_string(&state_path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            StoreState::default()
        };

        tracing::info!(
            plans = state.plans.len(),
            chats = state.chats.len(),
            path = %state_path.display(),
            "store loaded"
        );

        Ok(Self {
            state_path,
            state: RwLock::new(state),
        })
    }

    /// An ephemeral, in-memory-only store used by tests and the `run`
    /// CLI subcommand when no state directory is configured.
    pub fn in_memory() -> Self {
        Self {
            state_path: PathBuf::new(),
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Persist the current state to disk. No-op for [`Store::in_memory`].
    pub fn flush(&self) -> Result<()> {
        if self.state_path.as_os_str().is_empty() {
            return Ok(());
        }
        let state = self.state.read();
        let json = serde_json::to_string_pretty(&*state)
            .map_err(|e| Error::Other(format!("serializing store: {e}")))?;
        std::fs::write(&self.state_path, json).map_err(Error::Io)?;
        Ok(())
    }

    // ── chats / messages ────────────────────────────────────────────

    pub fn get_or_create_chat(&self, chat_id: &str) -> ChatRecord {
        let mut state = self.state.write();
        state
            .chats
            .entry(chat_id.to_string())
            .or_insert_with(|| ChatRecord {
                chat_id: chat_id.to_string(),
                created_at: Utc::now(),
            })
            .clone()
    }

    pub fn append_message(&self, message: MessageRecord) {
        let mut state = self.state.write();
        state
            .messages
            .entry(message.chat_id.clone())
            .or_default()
            .push(message);
    }

    pub fn list_messages(&self, chat_id: &str) -> Vec<MessageRecord> {
        self.state
            .read()
            .messages
            .get(chat_id)
            .cloned()
            .unwrap_or_default()
    }

    // ── plans ───────────────────────────────────────────────────────

    /// Insert a plan record. Plans are immutable once persisted —
    /// re-inserting the same `plan_id` is an error.
    pub fn insert_plan(&self, record: PlanRecord) -> Result<()> {
        let mut state = self.state.write();
        if state.plans.contains_key(&record.plan.plan_id) {
            return Err(Error::Other(format!(
                "plan '{}' already persisted",
                record.plan.plan_id
            )));
        }
        state.plans.insert(record.plan.plan_id.clone(), record);
        Ok(())
    }

    pub fn get_plan(&self, plan_id: &str) -> Option<PlanRecord> {
        self.state.read().plans.get(plan_id).cloned()
    }

    pub fn update_plan_status(&self, plan_id: &str, status: PlanStatus) -> Option<PlanRecord> {
        let mut state = self.state.write();
        let record = state.plans.get_mut(plan_id)?;
        record.status = status;
        record.updated_at = Utc::now();
        Some(record.clone())
    }

    pub fn list_plans(&self, limit: usize) -> Vec<PlanRecord> {
        let state = self.state.read();
        let mut plans: Vec<_> = state.plans.values().cloned().collect();
        plans.sort_by_key(|p| std::cmp::Reverse(p.created_at));
        plans.truncate(limit);
        plans
    }

    // ── task attempts ───────────────────────────────────────────────

    /// Begin a new attempt for `(plan_id, task_id)`: `attempt_no` is one
    /// past the highest attempt already recorded for this task (1 if
    /// none exist), enforcing the monotonic-attempt invariant.
    pub fn begin_attempt(
        &self,
        plan_id: &str,
        definition: forge_domain::plan::TaskDef,
        base_ctx_id: &str,
    ) -> TaskAttempt {
        let mut state = self.state.write();
        let key = attempt_key(plan_id, &definition.task_id);
        let attempts = state.attempts.entry(key).or_default();
        let attempt_no = attempts.last().map(|a| a.attempt_no + 1).unwrap_or(1);
        let attempt = TaskAttempt::new_pending(plan_id, attempt_no, definition, base_ctx_id, Utc::now());
        attempts.push(attempt.clone());
        attempt
    }

    /// Overwrite the stored copy of an attempt after a state transition
    /// (start/finish_done/finish_failed). Errors if no attempt with this
    /// `attempt_no` was previously begun.
    pub fn record_attempt(&self, attempt: TaskAttempt) -> Result<()> {
        let mut state = self.state.write();
        let key = attempt_key(&attempt.plan_id, &attempt.task_id);
        let attempts = state.attempts.entry(key).or_default();
        match attempts.iter_mut().find(|a| a.attempt_no == attempt.attempt_no) {
            Some(slot) => {
                *slot = attempt;
                Ok(())
            }
            None => Err(Error::Other(format!(
                "no attempt {} recorded for task '{}' in plan '{}'",
                attempt.attempt_no, attempt.task_id, attempt.plan_id
            ))),
        }
    }

    pub fn list_attempts(&self, plan_id: &str, task_id: &str) -> Vec<TaskAttempt> {
        self.state
            .read()
            .attempts
            .get(&attempt_key(plan_id, task_id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn latest_attempt(&self, plan_id: &str, task_id: &str) -> Option<TaskAttempt> {
        self.state
            .read()
            .attempts
            .get(&attempt_key(plan_id, task_id))
            .and_then(|attempts| attempts.last().cloned())
    }

    // ── tool calls ──────────────────────────────────────────────────

    pub fn insert_tool_call(&self, record: ToolCallRecord) {
        let mut state = self.state.write();
        state
            .tool_calls
            .entry(attempt_key(&record.plan_id, &record.task_id))
            .or_default()
            .push(record);
    }

    pub fn list_tool_calls(&self, plan_id: &str, task_id: &str) -> Vec<ToolCallRecord> {
        self.state
            .read()
            .tool_calls
            .get(&attempt_key(plan_id, task_id))
            .cloned()
            .unwrap_or_default()
    }

    // ── rate-limit usage checkpoints ────────────────────────────────

    pub fn record_rate_limit_usage(
        &self,
        scope_key: &str,
        window: UsageWindow,
        request_delta: u64,
        token_delta: u64,
    ) -> RateLimitUsage {
        let mut state = self.state.write();
        ratelimit::record_usage(
            &mut state.rate_limit_usage,
            scope_key,
            window,
            request_delta,
            token_delta,
            Utc::now(),
        )
    }

    pub fn get_rate_limit_usage(&self, scope_key: &str, window: UsageWindow) -> Option<RateLimitUsage> {
        self.state
            .read()
            .rate_limit_usage
            .get(&ratelimit::usage_key(scope_key, window))
            .cloned()
    }

    pub fn reset_rate_limit_window(&self, scope_key: &str, window: UsageWindow) {
        let mut state = self.state.write();
        ratelimit::reset_usage(&mut state.rate_limit_usage, scope_key, window, Utc::now());
    }

    /// Adjust a scope/window's `token_count` by a signed delta, clamped at
    /// zero. Used to settle a reservation once actual token usage is known.
    pub fn settle_rate_limit_tokens(&self, scope_key: &str, window: UsageWindow, delta: i64) -> RateLimitUsage {
        let mut state = self.state.write();
        ratelimit::settle_tokens(&mut state.rate_limit_usage, scope_key, window, delta, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_domain::plan::{PlanIR, TaskDef};
    use forge_domain::value::ParamValue;
    use std::collections::BTreeMap;

    fn task(id: &str) -> TaskDef {
        TaskDef {
            task_id: id.into(),
            tool: "noop".into(),
            params: ParamValue::default(),
            depends_on: vec![],
            reads: vec![],
            writes: vec![],
            retries: 0,
            timeout_ms: None,
            policy: BTreeMap::new(),
        }
    }

    fn plan_record(plan_id: &str) -> PlanRecord {
        let mut tasks = BTreeMap::new();
        tasks.insert("t1".to_string(), task("t1"));
        let plan = PlanIR {
            plan_id: plan_id.into(),
            base_ctx_id: "root".into(),
            tasks,
            metadata: BTreeMap::new(),
            version: 1,
        };
        let fingerprint = plan.fingerprint();
        PlanRecord {
            plan,
            fingerprint,
            status: PlanStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn get_or_create_chat_is_idempotent() {
        let store = Store::in_memory();
        let a = store.get_or_create_chat("c1");
        let b = store.get_or_create_chat("c1");
        assert_eq!(a.created_at, b.created_at);
    }

    #[test]
    fn messages_are_listed_in_append_order() {
        let store = Store::in_memory();
        for i in 0..3 {
            store.append_message(MessageRecord {
                message_id: format!("m{i}"),
                chat_id: "c1".into(),
                role: forge_domain::attempt::MessageRole::User,
                content: format!("hi {i}"),
                created_at: Utc::now(),
            });
        }
        let messages = store.list_messages("c1");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].message_id, "m0");
    }

    #[test]
    fn inserting_the_same_plan_id_twice_errors() {
        let store = Store::in_memory();
        store.insert_plan(plan_record("p1")).unwrap();
        let err = store.insert_plan(plan_record("p1")).unwrap_err();
        assert!(matches!(err, Error::Other(_)));
    }

    #[test]
    fn update_plan_status_is_reflected_in_get_plan() {
        let store = Store::in_memory();
        store.insert_plan(plan_record("p1")).unwrap();
        store.update_plan_status("p1", PlanStatus::Running);
        assert_eq!(store.get_plan("p1").unwrap().status, PlanStatus::Running);
    }

    #[test]
    fn list_plans_is_newest_first() {
        let store = Store::in_memory();
        let mut older = plan_record("p1");
        older.created_at = Utc::now() - chrono::Duration::seconds(10);
        store.insert_plan(older).unwrap();
        store.insert_plan(plan_record("p2")).unwrap();
        let plans = store.list_plans(10);
        assert_eq!(plans[0].plan.plan_id, "p2");
    }

    #[test]
    fn begin_attempt_assigns_sequential_attempt_numbers() {
        let store = Store::in_memory();
        let a1 = store.begin_attempt("p1", task("t1"), "root");
        let a2 = store.begin_attempt("p1", task("t1"), "ctx1");
        assert_eq!(a1.attempt_no, 1);
        assert_eq!(a2.attempt_no, 2);
    }

    #[test]
    fn record_attempt_updates_the_stored_copy() {
        let store = Store::in_memory();
        let mut attempt = store.begin_attempt("p1", task("t1"), "root");
        attempt.start(Utc::now());
        attempt.finish_done(Some("ctx1".into()), None, None, None, None, Utc::now());
        store.record_attempt(attempt).unwrap();

        let latest = store.latest_attempt("p1", "t1").unwrap();
        assert_eq!(latest.state, forge_domain::attempt::AttemptState::Done);
        assert_eq!(latest.new_ctx_id.as_deref(), Some("ctx1"));
    }

    #[test]
    fn record_attempt_without_begin_errors() {
        let store = Store::in_memory();
        let attempt = TaskAttempt::new_pending("p1", 1, task("t1"), "root", Utc::now());
        let err = store.record_attempt(attempt).unwrap_err();
        assert!(matches!(err, Error::Other(_)));
    }

    #[test]
    fn distinct_tasks_have_independent_attempt_sequences() {
        let store = Store::in_memory();
        store.begin_attempt("p1", task("a"), "root");
        let b1 = store.begin_attempt("p1", task("b"), "root");
        assert_eq!(b1.attempt_no, 1);
    }

    #[test]
    fn tool_calls_accumulate_per_task() {
        let store = Store::in_memory();
        store.insert_tool_call(ToolCallRecord {
            plan_id: "p1".into(),
            task_id: "t1".into(),
            attempt_no: 1,
            tool: "exec".into(),
            provider: None,
            model: None,
            input_hash: "abc".into(),
            output_hash: None,
            ops: vec![],
            latency_ms: 10,
            tokens: None,
            cost: None,
            created_at: Utc::now(),
        });
        assert_eq!(store.list_tool_calls("p1", "t1").len(), 1);
    }

    #[test]
    fn rate_limit_usage_round_trips() {
        let store = Store::in_memory();
        store.record_rate_limit_usage("global", UsageWindow::Minute, 1, 100);
        let usage = store
            .get_rate_limit_usage("global", UsageWindow::Minute)
            .unwrap();
        assert_eq!(usage.request_count, 1);
        assert_eq!(usage.token_count, 100);
    }
}
