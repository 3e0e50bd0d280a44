//! Flattening of nested JSON documents into dot-joined key paths.
//!
//! Helm reports release values as an arbitrarily nested document. The
//! `helm_release` data source exposes them as a single-level mapping where
//! every leaf is addressed by the path of object keys and array indices
//! leading to it:
//!
//! ```
//! use terraform_provider_torb::flatten::flatten;
//! use serde_json::json;
//!
//! let flat = flatten(&json!({
//!     "image": {"repository": "nginx", "tag": "1.25"},
//!     "ports": [80, 443]
//! }))
//! .unwrap();
//!
//! assert_eq!(flat["image.repository"], "nginx");
//! assert_eq!(flat["ports.1"], "443");
//! ```

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// Separator placed between path segments.
pub const SEPARATOR: char = '.';

/// Errors produced while flattening a document.
#[derive(Debug, Error)]
pub enum FlattenError {
    /// The document root was not a JSON object.
    #[error("expected a JSON object at the document root, got {0}")]
    NotAnObject(&'static str),

    /// The flattened mapping could not be serialized.
    #[error("failed to encode flattened values: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Flatten a JSON object into a mapping from dot-joined paths to
/// string-encoded leaf values.
///
/// Strings are kept verbatim, other scalars use their JSON text. Empty
/// objects and arrays are leaves in their own right (`{}` / `[]`).
pub fn flatten(document: &Value) -> Result<BTreeMap<String, String>, FlattenError> {
    let root = document
        .as_object()
        .ok_or_else(|| FlattenError::NotAnObject(kind_of(document)))?;

    let mut flat = BTreeMap::new();
    for (key, value) in root {
        flatten_into(key.clone(), value, &mut flat);
    }
    Ok(flat)
}

/// Flatten a document and encode the result as a JSON object string.
///
/// An empty document yields `"{}"`.
pub fn flatten_to_string(document: &Value) -> Result<String, FlattenError> {
    let flat = flatten(document)?;
    Ok(serde_json::to_string(&flat)?)
}

fn flatten_into(path: String, value: &Value, flat: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, nested) in map {
                flatten_into(join(&path, key), nested, flat);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, nested) in items.iter().enumerate() {
                flatten_into(join(&path, &index.to_string()), nested, flat);
            }
        }
        leaf => {
            flat.insert(path, stringify(leaf));
        }
    }
}

fn join(prefix: &str, segment: &str) -> String {
    let mut path = String::with_capacity(prefix.len() + segment.len() + 1);
    path.push_str(prefix);
    path.push(SEPARATOR);
    path.push_str(segment);
    path
}

fn stringify(leaf: &Value) -> String {
    match leaf {
        Value::String(s) => s.clone(),
        // Numbers, bools, null and empty containers.
        other => other.to_string(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_document_only_stringifies_values() {
        let flat = flatten(&json!({
            "name": "web",
            "replicas": 3,
            "ratio": 0.5,
            "enabled": true,
            "owner": null
        }))
        .unwrap();

        assert_eq!(flat.len(), 5);
        assert_eq!(flat["name"], "web");
        assert_eq!(flat["replicas"], "3");
        assert_eq!(flat["ratio"], "0.5");
        assert_eq!(flat["enabled"], "true");
        assert_eq!(flat["owner"], "null");
    }

    #[test]
    fn test_nested_object() {
        let flat = flatten(&json!({"a": {"b": 1}})).unwrap();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat["a.b"], "1");

        assert_eq!(
            flatten_to_string(&json!({"a": {"b": 1}})).unwrap(),
            r#"{"a.b":"1"}"#
        );
    }

    #[test]
    fn test_arrays_are_indexed() {
        let flat = flatten(&json!({
            "ingress": {
                "hosts": [
                    {"host": "a.example.com", "paths": ["/"]},
                    {"host": "b.example.com", "paths": ["/api", "/health"]}
                ]
            }
        }))
        .unwrap();

        assert_eq!(flat["ingress.hosts.0.host"], "a.example.com");
        assert_eq!(flat["ingress.hosts.0.paths.0"], "/");
        assert_eq!(flat["ingress.hosts.1.paths.1"], "/health");
        assert_eq!(flat.len(), 5);
    }

    #[test]
    fn test_empty_document() {
        assert!(flatten(&json!({})).unwrap().is_empty());
        assert_eq!(flatten_to_string(&json!({})).unwrap(), "{}");
    }

    #[test]
    fn test_empty_containers_are_kept() {
        let flat = flatten(&json!({
            "annotations": {},
            "tolerations": [],
            "resources": {"limits": {}}
        }))
        .unwrap();

        assert_eq!(flat["annotations"], "{}");
        assert_eq!(flat["tolerations"], "[]");
        assert_eq!(flat["resources.limits"], "{}");
    }

    #[test]
    fn test_deep_nesting() {
        let mut doc = json!("leaf");
        for _ in 0..64 {
            doc = json!({ "n": doc });
        }

        let flat = flatten(&doc).unwrap();
        let expected_key = vec!["n"; 64].join(".");
        assert_eq!(flat[&expected_key], "leaf");
    }

    #[test]
    fn test_root_must_be_object() {
        let err = flatten(&json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, FlattenError::NotAnObject("array")));

        let err = flatten(&Value::Null).unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected a JSON object at the document root, got null"
        );
    }

    #[test]
    fn test_output_is_sorted() {
        let encoded = flatten_to_string(&json!({"z": 1, "a": {"y": 2, "b": 3}})).unwrap();
        assert_eq!(encoded, r#"{"a.b":"3","a.y":"2","z":"1"}"#);
    }
}
