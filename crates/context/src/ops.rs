use sha2::{Digest, Sha256};

/// A single semantic operation appended to a context snapshot.
///
/// The ContextStore treats operations as opaque — their shape and meaning
/// are owned entirely by whichever tool produced them. We only need to
/// serialize them deterministically for content-addressing and render them
/// as text for prompt injection.
pub type Operation = serde_json::Value;

/// Derive a content address for `(base_ctx_id, ops)`.
///
/// Serialization uses `serde_json`'s map ordering, which for `Value` is
/// insertion order, not sorted — callers that need identical fingerprints
/// across differently-ordered object keys must normalize before calling
/// this. For our use (ops emitted fresh by a single tool call) insertion
/// order is already stable.
pub fn fingerprint(base_ctx_id: &str, ops: &[Operation]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(base_ctx_id.as_bytes());
    hasher.update(b"\0");
    for op in ops {
        let canonical = serde_json::to_vec(op).expect("Value always serializes");
        hasher.update(&canonical);
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_inputs_produce_identical_fingerprint() {
        let ops = vec![json!({"op": "set", "key": "a", "value": 1})];
        let a = fingerprint("root", &ops);
        let b = fingerprint("root", &ops);
        assert_eq!(a, b);
    }

    #[test]
    fn different_base_ctx_changes_fingerprint() {
        let ops = vec![json!({"op": "set"})];
        assert_ne!(fingerprint("root", &ops), fingerprint("other", &ops));
    }

    #[test]
    fn different_ops_change_fingerprint() {
        let a = fingerprint("root", &[json!({"op": "a"})]);
        let b = fingerprint("root", &[json!({"op": "b"})]);
        assert_ne!(a, b);
    }

    #[test]
    fn empty_ops_still_produce_a_stable_fingerprint() {
        let a = fingerprint("root", &[]);
        let b = fingerprint("root", &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_is_hex_sha256_length() {
        let fp = fingerprint("root", &[json!({"op": "set"})]);
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
