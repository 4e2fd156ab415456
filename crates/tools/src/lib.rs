//! Built-in tools registered against the ToolRegistry.
//!
//! `exec`/`process` follow OpenClaw semantics (foreground/background
//! command execution with a session manager); `file.*` are workspace-
//! scoped file operations. Each is adapted to the `ToolHandler` trait
//! so the executor can dispatch to any of them uniformly.

pub mod exec;
pub mod file_ops;
pub mod manager;
pub mod process;
pub mod registry;

pub use exec::ExecTool;
pub use file_ops::{
    FileAppendTool, FileDeleteTool, FileListTool, FileMoveTool, FileReadTool, FileWriteTool,
};
pub use manager::ProcessManager;
pub use process::ProcessTool;
pub use registry::{ToolHandler, ToolRegistry, ToolSpec};
