//! Builds the planner's system prompt from a tool catalog, and extracts
//! the JSON plan document an LLM response is expected to carry.

use std::collections::BTreeMap;

use forge_domain::error::{Error, Result};
use forge_domain::plan::TaskDef;
use forge_domain::value::ParamValue;
use forge_tools::ToolSpec;
use serde::Deserialize;

/// The shape a planning LLM call is asked to return: everything needed
/// to build a [`forge_domain::plan::PlanIR`] except `plan_id` and
/// `base_ctx_id`, which the caller assigns.
#[derive(Debug)]
pub struct PlanDocument {
    pub tasks: BTreeMap<String, TaskDef>,
    pub metadata: BTreeMap<String, ParamValue>,
}

/// Mirrors [`TaskDef`] but without `task_id` — the model only ever sees
/// the task as a map entry, not a field of itself; `task_id` is
/// backfilled from the map key after deserialization.
#[derive(Debug, Deserialize)]
struct RawTask {
    tool: String,
    #[serde(default)]
    params: ParamValue,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    reads: Vec<String>,
    #[serde(default)]
    writes: Vec<String>,
    #[serde(default)]
    retries: u32,
    #[serde(default)]
    timeout_ms: Option<u64>,
    #[serde(default)]
    policy: BTreeMap<String, ParamValue>,
}

#[derive(Debug, Deserialize)]
struct RawPlanDocument {
    tasks: BTreeMap<String, RawTask>,
    #[serde(default)]
    metadata: BTreeMap<String, ParamValue>,
}

pub fn build_system_prompt(catalog: &[&ToolSpec]) -> String {
    let mut tools = String::new();
    for spec in catalog {
        tools.push_str(&format!(
            "- {} ({}): {}\n",
            spec.name,
            spec.effects.join(","),
            spec.description
        ));
    }

    format!(
        "You are a task planner. Given a user request, produce a JSON plan \
         document with a single top-level object of the form:\n\
         {{\"tasks\": {{\"<task_id>\": {{\"tool\": \"<name>\", \"params\": {{...}}, \
         \"depends_on\": [\"<task_id>\", ...]}}, ...}}}}\n\n\
         Rules:\n\
         - Use 1 to 5 tasks for a typical request; give each task a short, \
         descriptive task_id.\n\
         - Every \"tool\" value must be one of the tools listed below.\n\
         - Every \"depends_on\" entry must name another task_id in this same \
         plan; do not create cycles.\n\
         - To use the output of an earlier task as a parameter, write the \
         exact string \"{{{{task.<task_id>.output}}}}\" and list that task_id \
         in \"depends_on\".\n\
         - The final task should usually set params.commit_to_context = true; \
         intermediate tasks usually should not.\n\
         - Respond with the JSON document only, no surrounding prose.\n\n\
         Available tools:\n{tools}"
    )
}

/// Strip an optional ```json ... ``` or ``` ... ``` fence, parse the
/// remainder, and backfill each task's `task_id` from its map key.
pub fn parse_plan_document(raw: &str) -> Result<PlanDocument> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(str::trim_start)
        .unwrap_or(trimmed);
    let body = body.strip_suffix("```").map(str::trim_end).unwrap_or(body);

    let doc: RawPlanDocument = serde_json::from_str(body)
        .map_err(|e| Error::InvalidPlan(format!("planner response is not a valid plan document: {e}")))?;

    let tasks = doc
        .tasks
        .into_iter()
        .map(|(task_id, raw)| {
            let def = TaskDef {
                task_id: task_id.clone(),
                tool: raw.tool,
                params: raw.params,
                depends_on: raw.depends_on,
                reads: raw.reads,
                writes: raw.writes,
                retries: raw.retries,
                timeout_ms: raw.timeout_ms,
                policy: raw.policy,
            };
            (task_id, def)
        })
        .collect();

    Ok(PlanDocument { tasks, metadata: doc.metadata })
}
