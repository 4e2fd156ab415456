//! The dynamically-typed params tree carried by a [`crate::plan::TaskDef`].
//!
//! Mirrors the shape `serde_json::Value` already has, but keeps scalars
//! distinct from maps/lists so template resolution and fingerprint
//! hashing can walk the tree uniformly without re-deriving type tags
//! from a generic `Value` at every call site.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One node of a task's `params` tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
}

impl Default for ParamValue {
    fn default() -> Self {
        ParamValue::Map(BTreeMap::new())
    }
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Stringify a scalar the way template substitution does: strings
    /// pass through unquoted, other scalars use their JSON rendering.
    pub fn stringify(&self) -> String {
        match self {
            ParamValue::Null => String::new(),
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Num(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            ParamValue::Str(s) => s.clone(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }

    /// Recursively replace every `{{task.<id>.output}}` occurrence in
    /// string leaves using `resolve`. Maps and lists are walked
    /// structurally; other scalars pass through unchanged.
    pub fn resolve_templates(&self, resolve: &impl Fn(&str) -> String) -> ParamValue {
        match self {
            ParamValue::Str(s) => ParamValue::Str(substitute_templates(s, resolve)),
            ParamValue::List(items) => {
                ParamValue::List(items.iter().map(|v| v.resolve_templates(resolve)).collect())
            }
            ParamValue::Map(entries) => ParamValue::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.resolve_templates(resolve)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Canonical bytes for content-addressing: map keys are already
    /// sorted (`BTreeMap`), so two structurally-identical trees that
    /// differ only in the original key order hash identically.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // serde_json::to_vec on a BTreeMap-backed value already emits
        // keys in sorted order, which is exactly the determinism the
        // fingerprint needs.
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn canonical_hash_hex(&self) -> String {
        let digest = Sha256::digest(self.canonical_bytes());
        hex::encode(digest)
    }
}

impl From<serde_json::Value> for ParamValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => ParamValue::Null,
            serde_json::Value::Bool(b) => ParamValue::Bool(b),
            serde_json::Value::Number(n) => ParamValue::Num(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => ParamValue::Str(s),
            serde_json::Value::Array(items) => {
                ParamValue::List(items.into_iter().map(ParamValue::from).collect())
            }
            serde_json::Value::Object(map) => {
                ParamValue::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<ParamValue> for serde_json::Value {
    fn from(v: ParamValue) -> Self {
        match v {
            ParamValue::Null => serde_json::Value::Null,
            ParamValue::Bool(b) => serde_json::Value::Bool(b),
            ParamValue::Num(n) => serde_json::json!(n),
            ParamValue::Str(s) => serde_json::Value::String(s),
            ParamValue::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            ParamValue::Map(map) => {
                serde_json::Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// Replace every `{{task.<id>.output}}` in `text` using `resolve(id)`.
/// Unrecognized `{{...}}` forms are left untouched.
fn substitute_templates(text: &str, resolve: &impl Fn(&str) -> String) -> String {
    const PREFIX: &str = "{{task.";
    const SUFFIX: &str = ".output}}";

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        match rest.find(PREFIX) {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                let after_prefix = &rest[start + PREFIX.len()..];
                match after_prefix.find(SUFFIX) {
                    Some(end) => {
                        let task_id = &after_prefix[..end];
                        out.push_str(&resolve(task_id));
                        rest = &after_prefix[end + SUFFIX.len()..];
                    }
                    None => {
                        // Unterminated template — emit the rest verbatim.
                        out.push_str(&rest[start..]);
                        break;
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_single_template() {
        let resolved = substitute_templates("use {{task.t1.output}}", &|id| {
            assert_eq!(id, "t1");
            "A".to_string()
        });
        assert_eq!(resolved, "use A");
    }

    #[test]
    fn substitutes_multiple_templates() {
        let resolved = substitute_templates(
            "{{task.a.output}}-{{task.b.output}}",
            &|id| format!("<{id}>"),
        );
        assert_eq!(resolved, "<a>-<b>");
    }

    #[test]
    fn leaves_text_without_templates_untouched() {
        let resolved = substitute_templates("plain text", &|_| "X".to_string());
        assert_eq!(resolved, "plain text");
    }

    #[test]
    fn missing_dependency_resolves_to_empty_string() {
        let resolved = substitute_templates("{{task.missing.output}}", &|_| String::new());
        assert_eq!(resolved, "");
    }

    #[test]
    fn resolve_templates_walks_nested_structure() {
        let mut map = BTreeMap::new();
        map.insert(
            "q".to_string(),
            ParamValue::Str("{{task.t1.output}}".to_string()),
        );
        map.insert(
            "n".to_string(),
            ParamValue::List(vec![ParamValue::Str("{{task.t2.output}}".to_string())]),
        );
        let tree = ParamValue::Map(map);
        let resolved = tree.resolve_templates(&|id| format!("val-{id}"));
        match resolved {
            ParamValue::Map(m) => {
                assert_eq!(m["q"].as_str(), Some("val-t1"));
                match &m["n"] {
                    ParamValue::List(items) => assert_eq!(items[0].as_str(), Some("val-t2")),
                    _ => panic!("expected list"),
                }
            }
            _ => panic!("expected map"),
        }
    }

    #[test]
    fn canonical_hash_stable_under_key_permutation() {
        let mut a = BTreeMap::new();
        a.insert("x".to_string(), ParamValue::Num(1.0));
        a.insert("y".to_string(), ParamValue::Num(2.0));

        let mut b = BTreeMap::new();
        b.insert("y".to_string(), ParamValue::Num(2.0));
        b.insert("x".to_string(), ParamValue::Num(1.0));

        assert_eq!(
            ParamValue::Map(a).canonical_hash_hex(),
            ParamValue::Map(b).canonical_hash_hex()
        );
    }

    #[test]
    fn canonical_hash_changes_with_value() {
        let mut a = BTreeMap::new();
        a.insert("x".to_string(), ParamValue::Num(1.0));
        let mut b = BTreeMap::new();
        b.insert("x".to_string(), ParamValue::Num(2.0));

        assert_ne!(
            ParamValue::Map(a).canonical_hash_hex(),
            ParamValue::Map(b).canonical_hash_hex()
        );
    }
}
