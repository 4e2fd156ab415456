//! Produces a validated [`PlanIR`] from a user message and a tool
//! catalog via a single LLM call, re-validating the result as data
//! before the executor ever sees it.

use forge_domain::error::{Error, Result};
use forge_domain::plan::PlanIR;
use forge_domain::tool::Message;
use forge_providers::{ChatRequest, LlmProvider};
use forge_tools::ToolRegistry;
use forge_worker::Worker;

use crate::prompt::{build_system_prompt, parse_plan_document};

pub struct Planner<'a> {
    provider: &'a dyn LlmProvider,
    max_tasks: usize,
}

impl<'a> Planner<'a> {
    pub fn new(provider: &'a dyn LlmProvider) -> Self {
        Self { provider, max_tasks: 5 }
    }

    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    /// Run one planning LLM call and return a validated [`PlanIR`].
    /// `plan_id` is caller-assigned (typically a fresh uuid) so the
    /// caller controls how plan identity is minted; `base_ctx_id` is the
    /// context the plan's first tasks will read against.
    pub async fn plan(
        &self,
        worker: &Worker,
        plan_id: impl Into<String>,
        base_ctx_id: impl Into<String>,
        user_message: &str,
        tools: &ToolRegistry,
    ) -> Result<PlanIR> {
        let catalog = tools.get_all_tools();
        let system_prompt = build_system_prompt(&catalog);

        let response = worker
            .chat(
                self.provider,
                ChatRequest {
                    messages: vec![Message::system(system_prompt), Message::user(user_message)],
                    tools: vec![],
                    temperature: Some(0.0),
                    max_tokens: None,
                    json_mode: true,
                    model: None,
                },
            )
            .await?;

        let doc = parse_plan_document(&response.content)?;

        if doc.tasks.is_empty() || doc.tasks.len() > self.max_tasks {
            return Err(Error::InvalidPlan(format!(
                "plan has {} tasks, expected 1..={}",
                doc.tasks.len(),
                self.max_tasks
            )));
        }

        let known_tools = tools.list();
        for (id, task) in &doc.tasks {
            if !known_tools.contains(&task.tool) {
                return Err(Error::InvalidPlan(format!(
                    "task '{id}' names tool '{}' which is not in the catalog",
                    task.tool
                )));
            }
        }

        let plan = PlanIR {
            plan_id: plan_id.into(),
            base_ctx_id: base_ctx_id.into(),
            tasks: doc.tasks,
            metadata: doc.metadata,
            version: 1,
        };

        plan.validate()?;
        check_template_references(&plan)?;

        Ok(plan)
    }
}

/// Every `{{task.<id>.output}}` reference in a task's params must name a
/// task that exists in the plan and is listed in that task's
/// `depends_on` — a template referencing an undeclared dependency would
/// read whatever `task_results` happens to hold rather than the value
/// the planner intended.
fn check_template_references(plan: &PlanIR) -> Result<()> {
    for (task_id, task) in &plan.tasks {
        let mut referenced = Vec::new();
        collect_template_ids(&task.params, &mut referenced);
        for dep_id in referenced {
            if !plan.tasks.contains_key(&dep_id) {
                return Err(Error::InvalidPlan(format!(
                    "task '{task_id}' references unknown task '{dep_id}' in a template"
                )));
            }
            if !task.depends_on.contains(&dep_id) {
                return Err(Error::InvalidPlan(format!(
                    "task '{task_id}' references '{dep_id}' in a template but does not list it in depends_on"
                )));
            }
        }
    }
    Ok(())
}

fn collect_template_ids(value: &forge_domain::value::ParamValue, out: &mut Vec<String>) {
    use forge_domain::value::ParamValue;
    match value {
        ParamValue::Str(s) => {
            const PREFIX: &str = "{{task.";
            const SUFFIX: &str = ".output}}";
            let mut rest = s.as_str();
            while let Some(start) = rest.find(PREFIX) {
                let after = &rest[start + PREFIX.len()..];
                match after.find(SUFFIX) {
                    Some(end) => {
                        out.push(after[..end].to_string());
                        rest = &after[end + SUFFIX.len()..];
                    }
                    None => break,
                }
            }
        }
        ParamValue::List(items) => {
            for item in items {
                collect_template_ids(item, out);
            }
        }
        ParamValue::Map(entries) => {
            for v in entries.values() {
                collect_template_ids(v, out);
            }
        }
        _ => {}
    }
}
