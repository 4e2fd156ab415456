/// Format one snapshot's operations as a prompt section with
/// machine-inspectable delimiters.
pub fn format_snapshot_section(
    ctx_id: &str,
    content: &str,
    raw_chars: usize,
    truncated_per_snapshot: bool,
    truncated_total_cap: bool,
) -> String {
    let injected_chars = content.len();
    format!(
        "\
=== CONTEXT_SNAPSHOT: {ctx_id} ===
RAW_CHARS: {raw_chars}
INJECTED_CHARS: {injected_chars}
TRUNCATED_PER_SNAPSHOT: {truncated_per_snapshot}
TRUNCATED_TOTAL_CAP: {truncated_total_cap}
--- BEGIN ---
{content}
--- END ---
"
    )
}
