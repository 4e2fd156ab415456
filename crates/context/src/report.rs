use serde::{Deserialize, Serialize};

/// Per-snapshot report within a context render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotReport {
    pub ctx_id: String,
    pub raw_chars: usize,
    pub injected_chars: usize,
    pub truncated_per_snapshot: bool,
    pub truncated_total_cap: bool,
    pub included: bool,
}

/// Full report of a context render — returned alongside the assembled
/// prompt text so callers can attribute token spend back to snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderReport {
    pub snapshots: Vec<SnapshotReport>,
    pub total_injected_chars: usize,
}
