//! `forge run --plan <file.json>` — load a PlanIR, execute it against an
//! in-memory Store/ContextStore, and print one JSON event per line.

use std::sync::Arc;

use chrono::Utc;
use forge_context::ContextStore;
use forge_domain::plan::{PlanIR, PlanRecord, PlanStatus};
use forge_executor::{EventKind, Executor, RunEvent};
use forge_store::Store;
use forge_tools::{
    ExecTool, FileAppendTool, FileDeleteTool, FileListTool, FileMoveTool, FileReadTool,
    FileWriteTool, ProcessManager, ProcessTool, ToolRegistry, ToolSpec,
};

struct LinePrinter {
    next_seq: u64,
}

impl forge_executor::EventSink for LinePrinter {
    fn emit(&mut self, kind: EventKind) {
        let event = RunEvent { seq: self.next_seq, kind };
        self.next_seq += 1;
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("failed to serialize event: {e}"),
        }
    }
}

fn default_registry(config: &forge_domain::config::Config) -> ToolRegistry {
    let manager = Arc::new(ProcessManager::new(config.tools.exec.clone()));
    let workspace = config.workspace.path.clone();

    let mut registry = ToolRegistry::new();
    registry.register(ToolSpec::new(
        "exec",
        "run a shell command to completion",
        vec!["write"],
        Arc::new(ExecTool::new(manager.clone(), config.tools.exec_security.clone())),
    ));
    registry.register(ToolSpec::new(
        "process",
        "manage long-running background processes",
        vec!["write"],
        Arc::new(ProcessTool::new(manager)),
    ));
    registry.register(ToolSpec::new(
        "file.read",
        "read a workspace file",
        vec!["read"],
        Arc::new(FileReadTool::new(workspace.clone())),
    ));
    registry.register(ToolSpec::new(
        "file.write",
        "overwrite a workspace file",
        vec!["write"],
        Arc::new(FileWriteTool::new(workspace.clone())),
    ));
    registry.register(ToolSpec::new(
        "file.append",
        "append to a workspace file",
        vec!["write"],
        Arc::new(FileAppendTool::new(workspace.clone())),
    ));
    registry.register(ToolSpec::new(
        "file.move",
        "move or rename a workspace file",
        vec!["write"],
        Arc::new(FileMoveTool::new(workspace.clone())),
    ));
    registry.register(ToolSpec::new(
        "file.delete",
        "delete a workspace file",
        vec!["write"],
        Arc::new(FileDeleteTool::new(workspace.clone())),
    ));
    registry.register(ToolSpec::new(
        "file.list",
        "list workspace directory contents",
        vec!["read"],
        Arc::new(FileListTool::new(workspace)),
    ));
    registry
}

pub async fn run(config: &forge_domain::config::Config, plan_path: &str, chat_id: &str) -> anyhow::Result<()> {
    let raw =
        std::fs::read_to_string(plan_path).map_err(|e| anyhow::anyhow!("reading {plan_path}: {e}"))?;
    let plan: PlanIR = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("parsing {plan_path} as PlanIR: {e}"))?;
    plan.validate().map_err(|e| anyhow::anyhow!("invalid plan: {}", e.user_facing()))?;

    let store = Store::in_memory();
    let context = ContextStore::new();
    let tools = default_registry(config);
    let executor = Executor::new(&store, &context, &tools);

    let now = Utc::now();
    let fingerprint = plan.fingerprint();
    store.insert_plan(PlanRecord {
        plan: plan.clone(),
        fingerprint,
        status: PlanStatus::Running,
        created_at: now,
        updated_at: now,
    })?;

    let mut sink = LinePrinter { next_seq: 0 };
    let outcome = executor.execute(chat_id, &plan, &mut sink).await;

    match outcome {
        Ok(outcome) => {
            store.update_plan_status(&plan.plan_id, PlanStatus::Done);
            eprintln!("plan {} done, final_ctx_id={}", plan.plan_id, outcome.final_ctx_id);
            Ok(())
        }
        Err(e) => {
            store.update_plan_status(&plan.plan_id, PlanStatus::Failed);
            Err(anyhow::anyhow!("plan {} failed: {}", plan.plan_id, e.user_facing()))
        }
    }
}
