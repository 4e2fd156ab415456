use crate::format;
use crate::report::{RenderReport, SnapshotReport};
use crate::store::Snapshot;
use crate::truncation::{self, Section};

/// Deterministic renderer that turns a resolved chain of snapshots into
/// prompt text.
///
/// Pure function: accepts a pre-resolved chain (oldest first, as returned
/// by [`crate::store::ContextStore::resolve_chain`]) and caps, and returns
/// the assembled prompt text plus a machine-readable report.
pub struct ContextRenderer {
    pub max_per_snapshot: usize,
    pub total_max: usize,
}

impl ContextRenderer {
    pub fn new(max_per_snapshot: usize, total_max: usize) -> Self {
        Self {
            max_per_snapshot,
            total_max,
        }
    }

    pub fn render(&self, chain: &[Snapshot]) -> (String, RenderReport) {
        let mut sections: Vec<Section> = Vec::with_capacity(chain.len());

        for snapshot in chain {
            let raw = serde_json::to_string_pretty(&snapshot.ops)
                .unwrap_or_else(|_| "[]".to_string());
            let raw_chars = raw.len();
            let (truncated_content, was_truncated) =
                truncation::truncate_per_snapshot(&raw, self.max_per_snapshot);

            sections.push(Section {
                ctx_id: snapshot.ctx_id.clone(),
                content: truncated_content,
                raw_chars,
                truncated_per_snapshot: was_truncated,
                truncated_total_cap: false,
                included: true,
            });
        }

        truncation::apply_total_cap(&mut sections, self.total_max);

        let mut assembled = String::new();
        let mut snapshot_reports = Vec::with_capacity(sections.len());

        for section in &sections {
            snapshot_reports.push(SnapshotReport {
                ctx_id: section.ctx_id.clone(),
                raw_chars: section.raw_chars,
                injected_chars: if section.included {
                    section.content.len()
                } else {
                    0
                },
                truncated_per_snapshot: section.truncated_per_snapshot,
                truncated_total_cap: section.truncated_total_cap,
                included: section.included,
            });

            if section.included && !section.content.is_empty() {
                assembled.push_str(&format::format_snapshot_section(
                    &section.ctx_id,
                    &section.content,
                    section.raw_chars,
                    section.truncated_per_snapshot,
                    section.truncated_total_cap,
                ));
                assembled.push('\n');
            }
        }

        let report = RenderReport {
            snapshots: snapshot_reports,
            total_injected_chars: assembled.len(),
        };

        (assembled, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn snapshot(ctx_id: &str, base: &str, ops: Vec<serde_json::Value>) -> Snapshot {
        Snapshot {
            ctx_id: ctx_id.to_string(),
            base_ctx_id: base.to_string(),
            ops,
            meta: json!({}),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_chain_renders_empty_text() {
        let renderer = ContextRenderer::new(1000, 10000);
        let (text, report) = renderer.render(&[]);
        assert!(text.is_empty());
        assert!(report.snapshots.is_empty());
    }

    #[test]
    fn single_snapshot_is_rendered_with_its_ctx_id() {
        let renderer = ContextRenderer::new(1000, 10000);
        let chain = vec![snapshot("ctx1", "root", vec![json!({"op": "set"})])];
        let (text, report) = renderer.render(&chain);
        assert!(text.contains("CONTEXT_SNAPSHOT: ctx1"));
        assert_eq!(report.snapshots.len(), 1);
        assert!(report.snapshots[0].included);
    }

    #[test]
    fn oversized_snapshot_is_truncated_per_snapshot() {
        let renderer = ContextRenderer::new(10, 10000);
        let big_ops = vec![json!({"op": "a".repeat(200)})];
        let chain = vec![snapshot("ctx1", "root", big_ops)];
        let (_, report) = renderer.render(&chain);
        assert!(report.snapshots[0].truncated_per_snapshot);
    }

    #[test]
    fn total_cap_drops_later_snapshots() {
        let renderer = ContextRenderer::new(10000, 5);
        let chain = vec![
            snapshot("ctx1", "root", vec![json!({"op": "a".repeat(50)})]),
            snapshot("ctx2", "ctx1", vec![json!({"op": "b".repeat(50)})]),
        ];
        let (_, report) = renderer.render(&chain);
        assert!(!report.snapshots[1].included);
    }
}
