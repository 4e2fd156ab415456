//! File operation tools — safe, auditable file I/O constrained to a workspace root.
//!
//! Each tool takes a `workspace_root: &Path` parameter that constrains where
//! files can be accessed.  Paths containing `..` after canonicalization or
//! resolving outside the workspace are rejected.
//!
//! All functions return `Result<Value, String>` with structured JSON results.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forge_domain::error::{Error, Result as ForgeResult};
use forge_domain::execution::{ExecutionContext, ToolResult};
use forge_domain::value::ParamValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::registry::ToolHandler;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
pub struct FileReadRequest {
    pub path: String,
    /// Line number to start from (0-indexed).
    #[serde(default)]
    pub offset: Option<usize>,
    /// Maximum number of lines to return.
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileWriteRequest {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileAppendRequest {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileMoveRequest {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileDeleteRequest {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileListRequest {
    #[serde(default = "default_dot")]
    pub path: String,
}

fn default_dot() -> String {
    ".".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub size: u64,
    pub modified: String,
    pub is_dir: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Path validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate and resolve a requested path within a workspace root.
///
/// 1. Rejects paths that contain `..` components in the raw input.
/// 2. Joins the requested path onto the workspace root.
/// 3. Canonicalizes the workspace root and checks the resolved path
///    is still contained within it.
///
/// Returns the validated absolute path.
pub fn validate_path(workspace_root: &Path, requested: &str) -> Result<PathBuf, String> {
    // Reject absolute paths — all paths must be relative to the workspace.
    let requested_path = Path::new(requested);
    if requested_path.is_absolute() {
        return Err(format!(
            "absolute paths are not allowed; use a path relative to the workspace root (got '{requested}')"
        ));
    }

    // Reject raw `..` components before any resolution.
    for component in requested_path.components() {
        if matches!(component, Component::ParentDir) {
            return Err("path must not contain '..' components".to_owned());
        }
    }

    // Canonicalize the workspace root (must exist).
    let canonical_root = workspace_root
        .canonicalize()
        .map_err(|e| format!("cannot resolve workspace root '{}': {e}", workspace_root.display()))?;

    // Build the candidate path.
    let candidate = canonical_root.join(requested_path);

    // If the target already exists we can canonicalize directly.
    // Otherwise we canonicalize the longest existing prefix and append
    // the remaining components, then check containment.
    let resolved = if candidate.exists() {
        candidate
            .canonicalize()
            .map_err(|e| format!("cannot resolve path '{}': {e}", candidate.display()))?
    } else {
        // Walk up to the nearest existing ancestor.
        let mut existing = candidate.as_path();
        let mut tail_parts: Vec<&std::ffi::OsStr> = Vec::new();
        loop {
            if existing.exists() {
                break;
            }
            match existing.parent() {
                Some(parent) => {
                    if let Some(file_name) = existing.file_name() {
                        tail_parts.push(file_name);
                    }
                    existing = parent;
                }
                None => break,
            }
        }
        let mut resolved = existing
            .canonicalize()
            .map_err(|e| format!("cannot resolve ancestor of '{}': {e}", candidate.display()))?;
        for part in tail_parts.into_iter().rev() {
            resolved.push(part);
        }
        resolved
    };

    // Containment check.
    if !resolved.starts_with(&canonical_root) {
        return Err(format!(
            "path '{}' resolves outside workspace root '{}'",
            requested,
            canonical_root.display()
        ));
    }

    Ok(resolved)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool implementations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Read file contents with optional line offset and limit.
pub async fn file_read(workspace_root: &Path, req: FileReadRequest) -> Result<Value, String> {
    let path = validate_path(workspace_root, &req.path)?;

    let content = fs::read_to_string(&path)
        .await
        .map_err(|e| format!("failed to read '{}': {e}", path.display()))?;

    let lines: Vec<&str> = content.lines().collect();
    let total_lines = lines.len();

    let offset = req.offset.unwrap_or(0);
    let limit = req.limit.unwrap_or(total_lines.saturating_sub(offset));

    let selected: Vec<&str> = lines
        .into_iter()
        .skip(offset)
        .take(limit)
        .collect();

    let result_content = selected.join("\n");

    Ok(serde_json::json!({
        "path": req.path,
        "content": result_content,
        "total_lines": total_lines,
        "offset": offset,
        "lines_returned": selected.len(),
    }))
}

/// Write/create a file atomically (write to .tmp sibling, then rename).
pub async fn file_write(workspace_root: &Path, req: FileWriteRequest) -> Result<Value, String> {
    let path = validate_path(workspace_root, &req.path)?;

    // Ensure parent directory exists.
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("failed to create parent directory: {e}"))?;
    }

    // Atomic write: write to uniquely-named .tmp sibling, sync, then rename.
    let tmp_name = format!(
        ".{}.{}.tmp",
        path.file_name()
            .unwrap_or_default()
            .to_string_lossy(),
        uuid::Uuid::new_v4().as_simple()
    );
    let tmp_path = path.with_file_name(tmp_name);

    let mut file = fs::File::create(&tmp_path)
        .await
        .map_err(|e| format!("failed to create temp file '{}': {e}", tmp_path.display()))?;

    file.write_all(req.content.as_bytes())
        .await
        .map_err(|e| format!("failed to write temp file: {e}"))?;

    file.flush()
        .await
        .map_err(|e| format!("failed to flush temp file: {e}"))?;

    file.sync_data()
        .await
        .map_err(|e| format!("failed to sync temp file: {e}"))?;

    // Rename into place.
    fs::rename(&tmp_path, &path)
        .await
        .map_err(|e| {
            // Best-effort cleanup of the temp file.
            let tmp = tmp_path.clone();
            tokio::spawn(async move { let _ = fs::remove_file(&tmp).await; });
            format!("failed to rename temp file into place: {e}")
        })?;

    let bytes_written = req.content.len();

    Ok(serde_json::json!({
        "path": req.path,
        "bytes_written": bytes_written,
        "success": true,
    }))
}

/// Append content to an existing file.
pub async fn file_append(workspace_root: &Path, req: FileAppendRequest) -> Result<Value, String> {
    let path = validate_path(workspace_root, &req.path)?;

    // Ensure parent directory exists.
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("failed to create parent directory: {e}"))?;
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
        .map_err(|e| format!("failed to open '{}' for append: {e}", path.display()))?;

    file.write_all(req.content.as_bytes())
        .await
        .map_err(|e| format!("failed to append to '{}': {e}", path.display()))?;

    file.flush()
        .await
        .map_err(|e| format!("failed to flush '{}': {e}", path.display()))?;

    Ok(serde_json::json!({
        "path": req.path,
        "bytes_appended": req.content.len(),
        "success": true,
    }))
}

/// Move/rename a file or directory.
pub async fn file_move(workspace_root: &Path, req: FileMoveRequest) -> Result<Value, String> {
    let source = validate_path(workspace_root, &req.source)?;
    let destination = validate_path(workspace_root, &req.destination)?;

    if !source.exists() {
        return Err(format!("source '{}' does not exist", req.source));
    }

    // Ensure destination parent exists.
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("failed to create destination parent directory: {e}"))?;
    }

    fs::rename(&source, &destination)
        .await
        .map_err(|e| format!("failed to move '{}' to '{}': {e}", req.source, req.destination))?;

    Ok(serde_json::json!({
        "source": req.source,
        "destination": req.destination,
        "success": true,
    }))
}

/// Delete a file or empty directory.
pub async fn file_delete(workspace_root: &Path, req: FileDeleteRequest) -> Result<Value, String> {
    let path = validate_path(workspace_root, &req.path)?;

    let metadata = fs::metadata(&path)
        .await
        .map_err(|e| format!("failed to stat '{}': {e}", req.path))?;

    if metadata.is_dir() {
        fs::remove_dir(&path)
            .await
            .map_err(|e| format!("failed to remove directory '{}' (must be empty): {e}", req.path))?;
    } else {
        fs::remove_file(&path)
            .await
            .map_err(|e| format!("failed to remove file '{}': {e}", req.path))?;
    }

    Ok(serde_json::json!({
        "path": req.path,
        "success": true,
    }))
}

/// List directory contents with metadata.
pub async fn file_list(workspace_root: &Path, req: FileListRequest) -> Result<Value, String> {
    let path = validate_path(workspace_root, &req.path)?;

    let mut read_dir = fs::read_dir(&path)
        .await
        .map_err(|e| format!("failed to read directory '{}': {e}", req.path))?;

    let mut entries: Vec<DirEntry> = Vec::new();

    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| format!("failed to read directory entry: {e}"))?
    {
        let metadata = entry
            .metadata()
            .await
            .map_err(|e| format!("failed to read metadata for '{}': {e}", entry.path().display()))?;

        let modified = metadata
            .modified()
            .ok()
            .map(|t| {
                let dt: DateTime<Utc> = t.into();
                dt.to_rfc3339()
            })
            .unwrap_or_default();

        let name = entry
            .file_name()
            .to_string_lossy()
            .to_string();

        entries.push(DirEntry {
            name,
            size: metadata.len(),
            modified,
            is_dir: metadata.is_dir(),
        });
    }

    // Sort by name for deterministic output.
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(serde_json::json!({
        "path": req.path,
        "entries": entries,
        "count": entries.len(),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolHandler registrations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Each tool is scoped to a fixed workspace root at construction time.
// `file.write` and `file.append` emit a context op describing the
// mutation — these are the write-through tools the streaming parser's
// auto-exec allowlist targets; the others are read-only or advisory
// and emit no ops.

fn params_err(tool: &str, task_id: &str, e: serde_json::Error) -> Error {
    Error::ToolFailure {
        tool: tool.into(),
        task_id: task_id.into(),
        message: format!("invalid params: {e}"),
    }
}

fn tool_err(tool: &str, task_id: &str, message: String) -> Error {
    Error::ToolFailure {
        tool: tool.into(),
        task_id: task_id.into(),
        message,
    }
}

pub struct FileReadTool {
    workspace_root: PathBuf,
}

impl FileReadTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl ToolHandler for FileReadTool {
    async fn call(&self, params: ParamValue, ctx: &ExecutionContext) -> ForgeResult<ToolResult> {
        let req: FileReadRequest = serde_json::from_value(params.into())
            .map_err(|e| params_err("file.read", &ctx.task_id, e))?;
        let output = file_read(&self.workspace_root, req)
            .await
            .map_err(|e| tool_err("file.read", &ctx.task_id, e))?;
        Ok(ToolResult::new(output))
    }
}

pub struct FileWriteTool {
    workspace_root: PathBuf,
}

impl FileWriteTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl ToolHandler for FileWriteTool {
    async fn call(&self, params: ParamValue, ctx: &ExecutionContext) -> ForgeResult<ToolResult> {
        let req: FileWriteRequest = serde_json::from_value(params.into())
            .map_err(|e| params_err("file.write", &ctx.task_id, e))?;
        let path = req.path.clone();
        let output = file_write(&self.workspace_root, req)
            .await
            .map_err(|e| tool_err("file.write", &ctx.task_id, e))?;
        let op = serde_json::json!({ "type": "file.write", "path": path });
        Ok(ToolResult::new(output).with_ops(vec![op]))
    }
}

pub struct FileAppendTool {
    workspace_root: PathBuf,
}

impl FileAppendTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl ToolHandler for FileAppendTool {
    async fn call(&self, params: ParamValue, ctx: &ExecutionContext) -> ForgeResult<ToolResult> {
        let req: FileAppendRequest = serde_json::from_value(params.into())
            .map_err(|e| params_err("file.append", &ctx.task_id, e))?;
        let path = req.path.clone();
        let output = file_append(&self.workspace_root, req)
            .await
            .map_err(|e| tool_err("file.append", &ctx.task_id, e))?;
        let op = serde_json::json!({ "type": "file.append", "path": path });
        Ok(ToolResult::new(output).with_ops(vec![op]))
    }
}

pub struct FileMoveTool {
    workspace_root: PathBuf,
}

impl FileMoveTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl ToolHandler for FileMoveTool {
    async fn call(&self, params: ParamValue, ctx: &ExecutionContext) -> ForgeResult<ToolResult> {
        let req: FileMoveRequest = serde_json::from_value(params.into())
            .map_err(|e| params_err("file.move", &ctx.task_id, e))?;
        let output = file_move(&self.workspace_root, req)
            .await
            .map_err(|e| tool_err("file.move", &ctx.task_id, e))?;
        Ok(ToolResult::new(output))
    }
}

pub struct FileDeleteTool {
    workspace_root: PathBuf,
}

impl FileDeleteTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl ToolHandler for FileDeleteTool {
    async fn call(&self, params: ParamValue, ctx: &ExecutionContext) -> ForgeResult<ToolResult> {
        let req: FileDeleteRequest = serde_json::from_value(params.into())
            .map_err(|e| params_err("file.delete", &ctx.task_id, e))?;
        let output = file_delete(&self.workspace_root, req)
            .await
            .map_err(|e| tool_err("file.delete", &ctx.task_id, e))?;
        Ok(ToolResult::new(output))
    }
}

pub struct FileListTool {
    workspace_root: PathBuf,
}

impl FileListTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl ToolHandler for FileListTool {
    async fn call(&self, params: ParamValue, ctx: &ExecutionContext) -> ForgeResult<ToolResult> {
        let req: FileListRequest = serde_json::from_value(params.into())
            .map_err(|e| params_err("file.list", &ctx.task_id, e))?;
        let output = file_list(&self.workspace_root, req)
            .await
            .map_err(|e| tool_err("file.list", &ctx.task_id, e))?;
        Ok(ToolResult::new(output))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
