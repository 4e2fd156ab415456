//! Runs a validated [`PlanIR`] to completion against a `Store`,
//! `ContextStore`, and `ToolRegistry`: topological execution, parameter
//! templating, per-attempt persistence, and context commits.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};

use std::sync::Arc;

use forge_context::ContextStore;
use forge_domain::error::{Error, Result};
use forge_domain::execution::ExecutionContext;
use forge_domain::plan::PlanIR;
use forge_domain::value::ParamValue;
use forge_planner::Planner;
use forge_store::Store;
use forge_tools::ToolRegistry;
use forge_worker::WorkerPool;

use crate::event::{EventKind, EventSink};

/// What a completed task contributed, kept around so later tasks can
/// resolve `{{task.<id>.output}}` against it.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub output: Value,
    pub metadata: Value,
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub final_ctx_id: String,
    pub task_results: HashMap<String, TaskResult>,
}

pub struct Executor<'a> {
    store: &'a Store,
    context: &'a ContextStore,
    tools: &'a ToolRegistry,
}

impl<'a> Executor<'a> {
    pub fn new(store: &'a Store, context: &'a ContextStore, tools: &'a ToolRegistry) -> Self {
        Self { store, context, tools }
    }

    /// Run every task of `plan` in topological order, emitting progress
    /// to `sink`. One task failure aborts the run: already-completed
    /// attempts and their committed contexts remain persisted.
    pub async fn execute(
        &self,
        chat_id: &str,
        plan: &PlanIR,
        sink: &mut impl EventSink,
    ) -> Result<ExecutionOutcome> {
        plan.validate()?;
        let order = plan.topological_order()?;

        let mut task_results: HashMap<String, TaskResult> = HashMap::new();
        let mut task_contexts: HashMap<String, String> = HashMap::new();
        let mut latest_ctx = plan.base_ctx_id.clone();

        for task_id in &order {
            let task = plan
                .tasks
                .get(task_id)
                .ok_or_else(|| Error::InvalidPlan(format!("task '{task_id}' vanished from plan")))?;

            let base_ctx = if task.depends_on.is_empty() {
                latest_ctx.clone()
            } else {
                task.depends_on
                    .iter()
                    .rev()
                    .find_map(|dep| task_contexts.get(dep).cloned())
                    .unwrap_or_else(|| latest_ctx.clone())
            };

            let mut attempt = self.store.begin_attempt(&plan.plan_id, task.clone(), &base_ctx);
            sink.emit(EventKind::TaskStateChanged {
                plan_id: plan.plan_id.clone(),
                task_id: task_id.clone(),
                state: "pending".into(),
                attempt: attempt.attempt_no,
                ctx_id: None,
                error: None,
            });

            attempt.start(Utc::now());
            self.store.record_attempt(attempt.clone())?;
            sink.emit(EventKind::TaskStateChanged {
                plan_id: plan.plan_id.clone(),
                task_id: task_id.clone(),
                state: "running".into(),
                attempt: attempt.attempt_no,
                ctx_id: None,
                error: None,
            });

            let resolved = task.params.resolve_templates(&|id| {
                task_results
                    .get(id)
                    .map(|r| ParamValue::from(r.output.clone()).stringify())
                    .unwrap_or_default()
            });

            let exec_ctx = ExecutionContext {
                chat_id: chat_id.to_string(),
                plan_id: plan.plan_id.clone(),
                task_id: task_id.clone(),
                ctx_id: Some(base_ctx.clone()),
            };

            let started = Instant::now();
            let result = match self.tools.invoke(&task.tool, resolved.clone(), &exec_ctx).await {
                Ok(result) => result,
                Err(err) => {
                    attempt.finish_failed(err.user_facing(), Utc::now());
                    self.store.record_attempt(attempt.clone())?;
                    sink.emit(EventKind::TaskStateChanged {
                        plan_id: plan.plan_id.clone(),
                        task_id: task_id.clone(),
                        state: "failed".into(),
                        attempt: attempt.attempt_no,
                        ctx_id: None,
                        error: Some(err.user_facing()),
                    });
                    return Err(err);
                }
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            let new_ctx_id = if result.ops.is_empty() {
                None
            } else {
                let meta = serde_json::json!({ "task_id": task_id, "tool": task.tool });
                match self
                    .context
                    .commit_operations(chat_id, &base_ctx, result.ops.clone(), meta)
                {
                    Some(new_ctx_id) => {
                        sink.emit(EventKind::ContextCommitted {
                            plan_id: plan.plan_id.clone(),
                            task_id: task_id.clone(),
                            base_ctx_id: base_ctx.clone(),
                            new_ctx_id: new_ctx_id.clone(),
                            ops: result.ops.clone(),
                        });
                        Some(new_ctx_id)
                    }
                    None => None,
                }
            };

            let provider = result.provider().map(str::to_string);
            let model = result.model().map(str::to_string);
            let tokens = result.total_tokens();
            let cost = result.metadata.get("cost").and_then(Value::as_f64);

            sink.emit(EventKind::ToolCalled {
                plan_id: plan.plan_id.clone(),
                task_id: task_id.clone(),
                attempt: attempt.attempt_no,
                tool: task.tool.clone(),
                latency_ms,
                provider: provider.clone(),
                model: model.clone(),
            });

            attempt.finish_done(new_ctx_id.clone(), provider.clone(), model.clone(), tokens, cost, Utc::now());
            self.store.record_attempt(attempt.clone())?;
            sink.emit(EventKind::TaskStateChanged {
                plan_id: plan.plan_id.clone(),
                task_id: task_id.clone(),
                state: "done".into(),
                attempt: attempt.attempt_no,
                ctx_id: new_ctx_id.clone(),
                error: None,
            });

            let output_hash = hex::encode(Sha256::digest(serde_json::to_vec(&result.output).unwrap_or_default()));
            self.store.insert_tool_call(forge_domain::attempt::ToolCallRecord {
                plan_id: plan.plan_id.clone(),
                task_id: task_id.clone(),
                attempt_no: attempt.attempt_no,
                tool: task.tool.clone(),
                provider,
                model,
                input_hash: resolved.canonical_hash_hex(),
                output_hash: Some(output_hash),
                ops: result.ops.clone(),
                latency_ms,
                tokens,
                cost,
                created_at: Utc::now(),
            });

            if let Some(ref new_ctx) = new_ctx_id {
                task_contexts.insert(task_id.clone(), new_ctx.clone());
                latest_ctx = new_ctx.clone();
            }
            task_results.insert(
                task_id.clone(),
                TaskResult {
                    output: result.output,
                    metadata: result.metadata,
                },
            );
        }

        Ok(ExecutionOutcome {
            final_ctx_id: latest_ctx,
            task_results,
        })
    }

    /// Lease a [`forge_worker::Worker`] from `pool`, plan against it, then
    /// run the resulting plan through [`Executor::execute`]. This is the
    /// path that takes a chat turn from a raw user message to a completed
    /// run; `execute` alone only replays an already-validated `PlanIR`.
    pub async fn plan_and_execute(
        &self,
        chat_id: &str,
        plan_id: impl Into<String>,
        base_ctx_id: impl Into<String>,
        user_message: &str,
        planner: &Planner<'_>,
        pool: &Arc<WorkerPool>,
        sink: &mut impl EventSink,
    ) -> Result<(PlanIR, ExecutionOutcome)> {
        let worker = pool.acquire_worker();
        let plan = planner
            .plan(&worker, plan_id, base_ctx_id, user_message, self.tools)
            .await?;
        let outcome = self.execute(chat_id, &plan, sink).await?;
        Ok((plan, outcome))
    }
}
