//! Events emitted while feeding an agent's streaming answer through
//! [`crate::parser::StreamParser`], plus the per-segment state it tracks
//! between `feed_answer` calls.

use std::collections::BTreeMap;

use serde::Serialize;

/// One parse event. `index` on the tool-call variants is the call's
/// position within the answer, starting at zero, stable across chunks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum ParseEvent {
    AgentResponseStart,
    AgentResponseAppend { text: String },
    AgentResponseComplete,

    ToolCallStart { index: usize },
    /// Emitted once `<TOOL>` and/or `<REASON>` close; either may be
    /// `None` if the model omitted that field.
    ToolCallField { index: usize, tool: Option<String>, reason: Option<String> },
    /// A named param's value grew; `value` is the full accumulated value
    /// so far, not just the delta.
    ToolCallParamUpdate { index: usize, name: String, value: String, len: usize },
    /// A named param's value reached its closing `</PARAM>`.
    ToolCallParam { index: usize, name: String, value: String },
    ToolCallComplete { index: usize },

    /// A streaming tool (`file.write`, `file.append`) received enough of
    /// its `content` param to execute speculatively. `params` holds
    /// every param captured so far, not just `content`.
    ToolCallAutoExec { index: usize, tool: String, params: BTreeMap<String, String> },
}

#[derive(Debug, Default)]
pub(crate) struct MessageState {
    pub started: bool,
    pub complete: bool,
    pub emitted_len: usize,
}

#[derive(Debug, Default)]
pub(crate) struct ParamState {
    pub value: String,
    pub emitted_len: usize,
    pub complete: bool,
}

#[derive(Debug, Default)]
pub(crate) struct ToolCallState {
    /// Absolute offset into the parser's buffer where this call's body
    /// (everything after `<TOOL_CALL>`) begins.
    pub body_start: usize,
    pub tool: Option<String>,
    pub reason: Option<String>,
    pub fields_emitted: bool,
    pub complete: bool,
    pub params: BTreeMap<String, ParamState>,
    pub last_auto_exec_len: Option<usize>,
}
