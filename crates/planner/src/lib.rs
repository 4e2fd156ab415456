//! Turns a user message into a validated [`forge_domain::plan::PlanIR`]
//! via a single LLM call against the registered tool catalog.

pub mod planner;
pub mod prompt;

pub use planner::Planner;
pub use prompt::{build_system_prompt, parse_plan_document, PlanDocument};
