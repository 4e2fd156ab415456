//! Incremental parser for the `<AGENT_DECISION>` streaming answer
//! grammar, turning raw model-stream chunks into granular message and
//! tool-call events, with an auto-execution bridge for streaming
//! write-through tools.

pub mod event;
pub mod holdback;
pub mod parser;

pub use event::ParseEvent;
pub use holdback::closing_tag_holdback;
pub use parser::StreamParser;
