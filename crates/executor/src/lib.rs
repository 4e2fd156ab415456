//! Executes a validated [`forge_domain::plan::PlanIR`] task by task:
//! parameter templating, attempt persistence, tool dispatch, and
//! context commits, emitting a progress event at every state
//! transition.

pub mod event;
pub mod executor;

pub use event::{EventKind, EventSink, RecordingSink, RunEvent};
pub use executor::{Executor, ExecutionOutcome, TaskResult};
