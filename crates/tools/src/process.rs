//! Process tool — manage background process sessions.
//!
//! Actions: list, poll, log, write, kill, clear, remove.

use std::sync::Arc;

use async_trait::async_trait;
use forge_domain::error::{Error, Result};
use forge_domain::execution::{ExecutionContext, ToolResult};
use forge_domain::value::ParamValue;
use serde::{Deserialize, Serialize};

use crate::manager::ProcessManager;
use crate::registry::ToolHandler;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessRequest {
    pub action: ProcessAction,
    /// Session ID (required for all actions except `list` and `clear`).
    #[serde(default)]
    pub session_id: Option<String>,
    /// For `poll`: byte offset to read from.
    #[serde(default)]
    pub offset: Option<usize>,
    /// For `log`: byte limit.
    #[serde(default)]
    pub limit: Option<usize>,
    /// For `log`: number of tail lines (default 200).
    #[serde(default)]
    pub tail_lines: Option<usize>,
    /// For `write`: data to send to stdin.
    #[serde(default)]
    pub data: Option<String>,
    /// For `write`: close stdin after sending.
    #[serde(default)]
    pub eof: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessAction {
    List,
    Poll,
    Log,
    Write,
    Kill,
    Clear,
    Remove,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// True once a session guarded by `Write`/`Kill`/`Remove` both exists and
/// is owned by `task_id`. A missing session still gets the normal "not
/// found" response so callers can't distinguish "wrong task" from
/// "wrong id" by probing.
fn owned_session(manager: &ProcessManager, sid: &str, task_id: &str) -> std::result::Result<(), ProcessResponse> {
    match manager.get(sid) {
        Some(session) if session.read().is_owned_by(task_id) => Ok(()),
        Some(_) => Err(ProcessResponse {
            success: false,
            error: Some("session belongs to a different task".into()),
            data: None,
        }),
        None => Err(ProcessResponse {
            success: false,
            error: Some("session not found".into()),
            data: None,
        }),
    }
}

/// Execute a process management action. `task_id` scopes the mutating
/// actions (`write`/`kill`/`remove`) to sessions spawned by the calling
/// task — `exec` tags every session it creates with the task that ran it.
pub async fn handle_process(
    manager: &ProcessManager,
    req: ProcessRequest,
    task_id: &str,
) -> ProcessResponse {
    match req.action {
        ProcessAction::List => {
            let sessions = manager.list();
            ProcessResponse {
                success: true,
                error: None,
                data: Some(serde_json::json!({
                    "sessions": sessions,
                    "count": sessions.len(),
                })),
            }
        }

        ProcessAction::Poll => {
            let sid = match &req.session_id {
                Some(s) => s.as_str(),
                None => {
                    return ProcessResponse {
                        success: false,
                        error: Some("session_id required for poll".into()),
                        data: None,
                    }
                }
            };
            match manager.poll(sid, req.offset.unwrap_or(0)) {
                Some(result) => ProcessResponse {
                    success: true,
                    error: None,
                    data: Some(serde_json::to_value(result).unwrap_or_default()),
                },
                None => ProcessResponse {
                    success: false,
                    error: Some("session not found".into()),
                    data: None,
                },
            }
        }

        ProcessAction::Log => {
            let sid = match &req.session_id {
                Some(s) => s.as_str(),
                None => {
                    return ProcessResponse {
                        success: false,
                        error: Some("session_id required for log".into()),
                        data: None,
                    }
                }
            };
            match manager.log(sid, req.offset, req.limit, req.tail_lines) {
                Some(log) => ProcessResponse {
                    success: true,
                    error: None,
                    data: Some(serde_json::json!({ "log": log })),
                },
                None => ProcessResponse {
                    success: false,
                    error: Some("session not found".into()),
                    data: None,
                },
            }
        }

        ProcessAction::Write => {
            let sid = match &req.session_id {
                Some(s) => s.as_str(),
                None => {
                    return ProcessResponse {
                        success: false,
                        error: Some("session_id required for write".into()),
                        data: None,
                    }
                }
            };
            if let Err(denied) = owned_session(manager, sid, task_id) {
                return denied;
            }
            let data = req.data.unwrap_or_default().into_bytes();
            let ok = manager.write_stdin(sid, data, req.eof).await;
            ProcessResponse {
                success: ok,
                error: if ok { None } else { Some("session not found or stdin closed".into()) },
                data: None,
            }
        }

        ProcessAction::Kill => {
            let sid = match &req.session_id {
                Some(s) => s.as_str(),
                None => {
                    return ProcessResponse {
                        success: false,
                        error: Some("session_id required for kill".into()),
                        data: None,
                    }
                }
            };
            if let Err(denied) = owned_session(manager, sid, task_id) {
                return denied;
            }
            let ok = manager.kill(sid);
            ProcessResponse {
                success: ok,
                error: if ok { None } else { Some("session not found or not running".into()) },
                data: None,
            }
        }

        ProcessAction::Clear => {
            let cleared = manager.clear_finished();
            ProcessResponse {
                success: true,
                error: None,
                data: Some(serde_json::json!({ "cleared": cleared })),
            }
        }

        ProcessAction::Remove => {
            let sid = match &req.session_id {
                Some(s) => s.as_str(),
                None => {
                    return ProcessResponse {
                        success: false,
                        error: Some("session_id required for remove".into()),
                        data: None,
                    }
                }
            };
            if let Err(denied) = owned_session(manager, sid, task_id) {
                return denied;
            }
            let ok = manager.remove(sid);
            ProcessResponse {
                success: ok,
                error: if ok { None } else { Some("session not found".into()) },
                data: None,
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolHandler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Registers as `process`: manage background sessions started by `exec`.
pub struct ProcessTool {
    manager: Arc<ProcessManager>,
}

impl ProcessTool {
    pub fn new(manager: Arc<ProcessManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl ToolHandler for ProcessTool {
    async fn call(&self, params: ParamValue, ctx: &ExecutionContext) -> Result<ToolResult> {
        let value: serde_json::Value = params.into();
        let req: ProcessRequest =
            serde_json::from_value(value).map_err(|e| Error::ToolFailure {
                tool: "process".into(),
                task_id: ctx.task_id.clone(),
                message: format!("invalid process params: {e}"),
            })?;

        let response = handle_process(&self.manager, req, &ctx.task_id).await;
        if !response.success {
            return Err(Error::ToolFailure {
                tool: "process".into(),
                task_id: ctx.task_id.clone(),
                message: response.error.unwrap_or_else(|| "process action failed".into()),
            });
        }
        let output = serde_json::to_value(&response).unwrap_or_default();
        Ok(ToolResult::new(output))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{OutputBuffer, ProcessSession};
    use forge_domain::config::ExecConfig;

    fn manager_with_session(owner: &str) -> (ProcessManager, String) {
        let manager = ProcessManager::new(ExecConfig::default());
        let id = uuid::Uuid::new_v4().to_string();
        let session = ProcessSession {
            id: id.clone(),
            command: "echo hi".into(),
            workdir: None,
            started_at: chrono::Utc::now(),
            finished_at: None,
            status: crate::manager::ProcessStatus::Running,
            exit_code: None,
            output: OutputBuffer::new(1000),
            stdin_tx: None,
            kill_tx: None,
            name: Some(owner.to_string()),
        };
        manager.register(session);
        (manager, id)
    }

    #[tokio::test]
    async fn kill_from_a_different_task_is_denied() {
        let (manager, sid) = manager_with_session("task-a");
        let req = ProcessRequest {
            action: ProcessAction::Kill,
            session_id: Some(sid),
            offset: None,
            limit: None,
            tail_lines: None,
            data: None,
            eof: false,
        };
        let resp = handle_process(&manager, req, "task-b").await;
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("different task"));
    }

    #[tokio::test]
    async fn remove_from_the_owning_task_is_permitted() {
        let (manager, sid) = manager_with_session("task-a");
        let req = ProcessRequest {
            action: ProcessAction::Remove,
            session_id: Some(sid.clone()),
            offset: None,
            limit: None,
            tail_lines: None,
            data: None,
            eof: false,
        };
        let resp = handle_process(&manager, req, "task-a").await;
        assert!(resp.success);
        assert!(manager.get(&sid).is_none());
    }

    #[tokio::test]
    async fn list_and_poll_are_not_scoped_by_task() {
        let (manager, sid) = manager_with_session("task-a");
        let req = ProcessRequest {
            action: ProcessAction::Poll,
            session_id: Some(sid),
            offset: None,
            limit: None,
            tail_lines: None,
            data: None,
            eof: false,
        };
        let resp = handle_process(&manager, req, "someone-else").await;
        assert!(resp.success);
    }
}
