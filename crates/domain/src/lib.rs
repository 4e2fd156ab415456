pub mod attempt;
pub mod capability;
pub mod config;
pub mod error;
pub mod execution;
pub mod plan;
pub mod stream;
pub mod tool;
pub mod value;

pub use attempt::{AttemptState, ChatRecord, MessageRecord, MessageRole, TaskAttempt, ToolCallRecord};
pub use capability::{LlmCapabilities, ModelRole, ToolSupport};
pub use config::Config;
pub use error::{Error, Result};
pub use execution::{ExecutionContext, ToolResult};
pub use plan::{PlanIR, PlanRecord, PlanStatus, TaskDef};
pub use stream::{BoxStream, StreamEvent, Usage};
pub use tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition};
pub use value::ParamValue;
