//! Schema validation helpers.
//!
//! This module validates a `serde_json::Value` against a [`Schema`] and
//! reports problems as attribute-scoped diagnostics.
//!
//! # Example
//!
//! ```
//! use terraform_provider_torb::schema::{Schema, Attribute};
//! use terraform_provider_torb::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("release_name", Attribute::required_string())
//!     .with_attribute("namespace", Attribute::optional_string());
//!
//! let diagnostics = validate(&schema, &json!({"release_name": "web"}));
//! assert!(diagnostics.is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"release_name": "web", "namespace": 7}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("namespace".to_string()));
//! ```

use crate::schema::{Attribute, AttributeType, Diagnostic, DiagnosticSeverity, Schema};
use serde_json::Value;

/// Validate a JSON value against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
///
/// # Validation Rules
///
/// - Required attributes must be present and non-null
/// - Optional attributes may be absent or null
/// - Computed-only attributes are skipped (the provider sets these)
/// - Attribute types must match the schema
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match value {
        Value::Object(map) => map,
        // An unset block carries nothing to check.
        Value::Null => return diagnostics,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value))),
            );
            return diagnostics;
        }
    };

    for (name, attr) in &schema.block.attributes {
        validate_attribute(attr, obj.get(name), name, &mut diagnostics);
    }
    diagnostics
}

/// Validate a JSON value against a schema, returning Ok if valid or Err with diagnostics.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a JSON value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        }
        Some(v) => validate_attribute_type(&attr.attr_type, v, path, diagnostics),
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        }
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic {
        severity: DiagnosticSeverity::Error,
        summary: format!("Invalid type for attribute '{}'", path),
        detail: Some(format!(
            "Expected {}, got {}",
            expected,
            value_type_name(got)
        )),
        attribute: Some(path.to_string()),
    }
}
