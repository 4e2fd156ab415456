//! Incremental parser for the `<AGENT_DECISION>` answer grammar:
//!
//! ```text
//! <AGENT_DECISION>
//! <MESSAGE>...</MESSAGE>
//! <TOOL_CALL>
//!   <TOOL>name</TOOL>
//!   <REASON>...</REASON>
//!   <PARAM name="k">literal value, may contain &, <, > unescaped</PARAM>
//! </TOOL_CALL>
//! <STATUS>AWAIT_TOOL | COMPLETE</STATUS>
//! </AGENT_DECISION>
//! ```
//!
//! The grammar is regex-delimited, not XML: `<PARAM>` bodies are taken
//! literally and never entity-decoded. The parser is fed chunks as they
//! arrive and reprocesses its whole buffer each time, since a chunk
//! boundary may land anywhere, including inside a tag.

use std::collections::BTreeMap;

use crate::event::{MessageState, ParseEvent, ToolCallState};
use crate::holdback::closing_tag_holdback;

/// Tools allowed to execute before their `<TOOL_CALL>` has fully closed,
/// keyed by their streaming `content` param. Kept narrow and explicit:
/// a tool only belongs here if a partial write is safe to repeat with a
/// longer prefix.
const AUTO_EXEC_ALLOWLIST: &[&str] = &["file.write", "file.append"];

#[derive(Debug, Default)]
pub struct StreamParser {
    buffer: String,
    message: MessageState,
    tools: Vec<ToolCallState>,
    finalized: bool,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of the model's stream and return every event the
    /// new content produces. Safe to call with empty chunks.
    pub fn feed_answer(&mut self, chunk: &str) -> Vec<ParseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        self.process_message(&mut events);
        self.scan_new_tool_calls(&mut events);

        for index in 0..self.tools.len() {
            if !self.tools[index].complete {
                self.process_tool(index, &mut events);
            }
        }

        events
    }

    /// Close out any message or tool call still open when the
    /// underlying stream ends.
    pub fn finalize(&mut self) -> Vec<ParseEvent> {
        let mut events = Vec::new();

        if self.message.started && !self.message.complete {
            self.message.complete = true;
            events.push(ParseEvent::AgentResponseComplete);
        }

        for index in 0..self.tools.len() {
            if !self.tools[index].complete {
                self.tools[index].complete = true;
                events.push(ParseEvent::ToolCallComplete { index });
            }
        }

        self.finalized = true;
        events
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn process_message(&mut self, events: &mut Vec<ParseEvent>) {
        if self.message.complete {
            return;
        }

        const OPEN: &str = "<MESSAGE>";
        const CLOSE: &str = "</MESSAGE>";

        let Some(start) = self.buffer.find(OPEN) else { return };
        if !self.message.started {
            self.message.started = true;
            events.push(ParseEvent::AgentResponseStart);
        }

        let body = &self.buffer[start + OPEN.len()..];
        if let Some(end) = body.find(CLOSE) {
            let full = &body[..end];
            if full.len() > self.message.emitted_len {
                let delta = full[self.message.emitted_len..].to_string();
                events.push(ParseEvent::AgentResponseAppend { text: delta });
            }
            self.message.emitted_len = full.len();
            self.message.complete = true;
            events.push(ParseEvent::AgentResponseComplete);
        } else {
            let holdback = closing_tag_holdback(body, CLOSE);
            let emit_upto = body.len().saturating_sub(holdback);
            if emit_upto > self.message.emitted_len {
                let delta = body[self.message.emitted_len..emit_upto].to_string();
                self.message.emitted_len = emit_upto;
                events.push(ParseEvent::AgentResponseAppend { text: delta });
            }
        }
    }

    fn scan_new_tool_calls(&mut self, events: &mut Vec<ParseEvent>) {
        const OPEN: &str = "<TOOL_CALL>";

        let mut seen = 0usize;
        let mut search_from = 0usize;
        while let Some(rel) = self.buffer[search_from..].find(OPEN) {
            let abs = search_from + rel;
            if seen == self.tools.len() {
                self.tools.push(ToolCallState { body_start: abs + OPEN.len(), ..Default::default() });
                events.push(ParseEvent::ToolCallStart { index: seen });
            }
            seen += 1;
            search_from = abs + OPEN.len();
        }
    }

    fn process_tool(&mut self, index: usize, events: &mut Vec<ParseEvent>) {
        const CLOSE: &str = "</TOOL_CALL>";
        let body_start = self.tools[index].body_start;

        let (body, tool_closing) = {
            let rest = &self.buffer[body_start..];
            match rest.find(CLOSE) {
                Some(end) => (rest[..end].to_string(), true),
                None => (rest.to_string(), false),
            }
        };

        let tool_name = extract_closed_field(&body, "TOOL");
        let reason = extract_closed_field(&body, "REASON");
        if (tool_name.is_some() || reason.is_some())
            && (tool_name != self.tools[index].tool || reason != self.tools[index].reason)
        {
            self.tools[index].tool = tool_name.clone();
            self.tools[index].reason = reason.clone();
            self.tools[index].fields_emitted = true;
            events.push(ParseEvent::ToolCallField { index, tool: tool_name, reason });
        }

        self.process_params(index, &body, events);
        self.maybe_auto_exec(index, events);

        if tool_closing && !self.tools[index].complete {
            self.tools[index].complete = true;
            tracing::trace!(index, tool = ?self.tools[index].tool, "tool call closed");
            events.push(ParseEvent::ToolCallComplete { index });
        }
    }

    fn process_params(&mut self, index: usize, body: &str, events: &mut Vec<ParseEvent>) {
        const PREFIX: &str = "<PARAM name=\"";
        const CLOSE: &str = "</PARAM>";

        let mut starts = Vec::new();
        let mut search_from = 0usize;
        while let Some(rel) = body[search_from..].find(PREFIX) {
            let abs = search_from + rel;
            starts.push(abs);
            search_from = abs + PREFIX.len();
        }

        for (i, &open_pos) in starts.iter().enumerate() {
            let after_name_start = &body[open_pos + PREFIX.len()..];
            let Some(name_len) = after_name_start.find('"') else { continue };
            let name = after_name_start[..name_len].to_string();

            let Some(tag_close_rel) = after_name_start[name_len..].find('>') else { continue };
            let content_start = open_pos + PREFIX.len() + name_len + tag_close_rel + 1;
            let region_end = starts.get(i + 1).copied().unwrap_or(body.len());
            if content_start > region_end {
                continue;
            }
            let region = &body[content_start..region_end];

            let state = self.tools[index].params.entry(name.clone()).or_default();
            if state.complete {
                continue;
            }

            if let Some(end) = region.find(CLOSE) {
                let full = region[..end].trim().to_string();
                state.value = full.clone();
                state.emitted_len = region[..end].len();
                state.complete = true;
                events.push(ParseEvent::ToolCallParam { index, name, value: full });
            } else {
                let holdback = closing_tag_holdback(region, CLOSE);
                let emit_upto = region.len().saturating_sub(holdback);
                if emit_upto > state.emitted_len {
                    state.value = region[..emit_upto].to_string();
                    state.emitted_len = emit_upto;
                    events.push(ParseEvent::ToolCallParamUpdate {
                        index,
                        name,
                        value: state.value.clone(),
                        len: state.emitted_len,
                    });
                }
            }
        }
    }

    fn maybe_auto_exec(&mut self, index: usize, events: &mut Vec<ParseEvent>) {
        let tool_name = match &self.tools[index].tool {
            Some(t) if AUTO_EXEC_ALLOWLIST.contains(&t.as_str()) => t.clone(),
            _ => return,
        };

        let len = match self.tools[index].params.get("content") {
            Some(content) if !content.value.is_empty() => content.value.len(),
            _ => return,
        };

        if self.tools[index].last_auto_exec_len == Some(len) {
            return;
        }
        self.tools[index].last_auto_exec_len = Some(len);

        let params: BTreeMap<String, String> =
            self.tools[index].params.iter().map(|(k, v)| (k.clone(), v.value.clone())).collect();

        tracing::debug!(index, tool = %tool_name, content_len = len, "auto-executing streaming tool call");
        events.push(ParseEvent::ToolCallAutoExec { index, tool: tool_name, params });
    }
}

fn extract_closed_field(body: &str, name: &str) -> Option<String> {
    let open = format!("<{name}>");
    let close = format!("</{name}>");
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)?;
    Some(body[start..start + end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(parser: &mut StreamParser, chunks: &[&str]) -> Vec<ParseEvent> {
        let mut all = Vec::new();
        for chunk in chunks {
            all.extend(parser.feed_answer(chunk));
        }
        all
    }

    #[test]
    fn message_only_stream_emits_start_append_complete() {
        let mut parser = StreamParser::new();
        let events = run(&mut parser, &["<AGENT_DECISION>\n<MESSAGE>hello ", "world</MESSAGE>\n<STATUS>COMPLETE</STATUS>"]);
        assert_eq!(events[0], ParseEvent::AgentResponseStart);
        assert!(events.contains(&ParseEvent::AgentResponseAppend { text: "hello ".into() }));
        assert!(events.contains(&ParseEvent::AgentResponseComplete));
    }

    #[test]
    fn chunk_boundary_inside_closing_tag_never_leaks_a_partial_tag() {
        let mut parser = StreamParser::new();
        let events = run(&mut parser, &["<MESSAGE>hi there</MESS", "AGE>"]);
        let appended: String = events
            .iter()
            .filter_map(|e| match e {
                ParseEvent::AgentResponseAppend { text } => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(appended, "hi there");
        assert!(!appended.contains('<'));
        assert!(events.contains(&ParseEvent::AgentResponseComplete));
    }

    #[test]
    fn tool_call_fields_and_param_stream_then_complete() {
        let mut parser = StreamParser::new();
        let events = run(
            &mut parser,
            &[
                "<TOOL_CALL>\n<TOOL>exec</TOOL>\n<REASON>because</REASON>\n<PARAM name=\"cmd\">ls ",
                "-la</PARAM>\n</TOOL_CALL>",
            ],
        );
        assert!(events.contains(&ParseEvent::ToolCallStart { index: 0 }));
        assert!(events
            .iter()
            .any(|e| matches!(e, ParseEvent::ToolCallField { index: 0, tool: Some(t), reason: Some(r) } if t == "exec" && r == "because")));
        assert!(events.contains(&ParseEvent::ToolCallParam { index: 0, name: "cmd".into(), value: "ls -la".into() }));
        assert!(events.contains(&ParseEvent::ToolCallComplete { index: 0 }));
    }

    #[test]
    fn param_update_events_carry_a_strictly_growing_length() {
        let mut parser = StreamParser::new();
        let mut lens = Vec::new();
        for chunk in ["<TOOL_CALL><TOOL>file.write</TOOL><PARAM name=\"content\">a", "bc", "def"] {
            for event in parser.feed_answer(chunk) {
                if let ParseEvent::ToolCallParamUpdate { len, .. } = event {
                    lens.push(len);
                }
            }
        }
        for pair in lens.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn auto_exec_never_fires_twice_with_the_same_signature() {
        let mut parser = StreamParser::new();
        let mut signatures = Vec::new();
        for chunk in [
            "<TOOL_CALL><TOOL>file.write</TOOL><PARAM name=\"path\">a.txt</PARAM><PARAM name=\"content\">one",
            " two",
            " three</PARAM></TOOL_CALL>",
        ] {
            for event in parser.feed_answer(chunk) {
                if let ParseEvent::ToolCallAutoExec { params, .. } = event {
                    signatures.push(params.get("content").cloned().unwrap_or_default().len());
                }
            }
        }
        assert!(signatures.len() >= 2);
        for pair in signatures.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        assert_eq!(signatures.iter().collect::<std::collections::HashSet<_>>().len(), signatures.len());
    }

    #[test]
    fn non_allowlisted_tool_never_triggers_auto_exec() {
        let mut parser = StreamParser::new();
        let events = run(&mut parser, &["<TOOL_CALL><TOOL>exec</TOOL><PARAM name=\"content\">rm -rf /</PARAM></TOOL_CALL>"]);
        assert!(!events.iter().any(|e| matches!(e, ParseEvent::ToolCallAutoExec { .. })));
    }

    #[test]
    fn finalize_closes_a_still_open_message_and_tool_call() {
        let mut parser = StreamParser::new();
        parser.feed_answer("<MESSAGE>partial");
        parser.feed_answer("<TOOL_CALL><TOOL>exec</TOOL>");
        let events = parser.finalize();
        assert!(events.contains(&ParseEvent::AgentResponseComplete));
        assert!(events.contains(&ParseEvent::ToolCallComplete { index: 0 }));
        assert!(parser.is_finalized());
    }

    #[test]
    fn multiple_sequential_tool_calls_get_independent_indices() {
        let mut parser = StreamParser::new();
        let events = run(
            &mut parser,
            &["<TOOL_CALL><TOOL>a</TOOL></TOOL_CALL><TOOL_CALL><TOOL>b</TOOL></TOOL_CALL>"],
        );
        assert!(events.contains(&ParseEvent::ToolCallStart { index: 0 }));
        assert!(events.contains(&ParseEvent::ToolCallStart { index: 1 }));
        assert!(events.contains(&ParseEvent::ToolCallComplete { index: 0 }));
        assert!(events.contains(&ParseEvent::ToolCallComplete { index: 1 }));
    }
}
