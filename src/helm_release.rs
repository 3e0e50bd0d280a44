//! The `helm_release` data source.
//!
//! Reads the user-supplied values of a deployed Helm release and exposes
//! them, flattened to dot-joined keys, as a JSON object string. The type name
//! carries no provider prefix, so configurations select the provider
//! explicitly:
//!
//! ```hcl
//! data "helm_release" "web" {
//!   provider     = torb
//!   release_name = "web"
//!   namespace    = "apps"
//! }
//!
//! locals {
//!   web_values = jsondecode(data.helm_release.web.values)
//!   image_tag  = local.web_values["image.tag"]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::ProviderError;
use crate::flatten::flatten_to_string;
use crate::helm::{HelmClient, ReleaseRef, DEFAULT_NAMESPACE};
use crate::schema::{has_errors, Attribute, Diagnostic, Schema};
use crate::validation::validate;

/// Type name of the data source.
pub const TYPE_NAME: &str = "helm_release";

/// Schema of the `helm_release` data source.
pub fn schema() -> Schema {
    Schema::v0()
        .with_description("Fetches the values of a deployed Helm release.")
        .with_attribute(
            "release_name",
            Attribute::required_string().with_description("The name of the release to reference."),
        )
        .with_attribute(
            "namespace",
            Attribute::optional_computed_string()
                .with_description("The namespace the release was installed into.")
                .with_default(json!(DEFAULT_NAMESPACE)),
        )
        .with_attribute(
            "id",
            Attribute::computed_string().with_description("Unix timestamp of the read."),
        )
        .with_attribute(
            "values",
            Attribute::computed_string()
                .with_description("The release values flattened to dot-joined keys, as JSON."),
        )
}

/// Configuration of a `helm_release` block, after defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmReleaseConfig {
    /// Name of the release.
    pub release_name: String,
    /// Namespace of the release.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl HelmReleaseConfig {
    /// Decode a configuration value, filling schema defaults first.
    pub fn from_value(mut config: Value) -> Result<Self, ProviderError> {
        schema().apply_defaults(&mut config);
        Ok(serde_json::from_value(config)?)
    }

    /// The release this configuration refers to.
    pub fn release(&self) -> ReleaseRef {
        ReleaseRef::new(&self.release_name, &self.namespace)
    }
}

/// State written for a `helm_release` read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmReleaseState {
    /// Name of the release.
    pub release_name: String,
    /// Namespace of the release.
    pub namespace: String,
    /// Unix timestamp (seconds) at which the values were read.
    pub id: String,
    /// Flattened values as a JSON object string.
    pub values: String,
}

/// Validate a `helm_release` configuration.
///
/// On top of the schema checks, names must not be empty. An absent block is
/// checked as an empty one, so `release_name` is still reported missing.
pub fn validate_config(config: &Value) -> Vec<Diagnostic> {
    let empty = Value::Object(Default::default());
    let config = if config.is_null() { &empty } else { config };
    let mut diagnostics = validate(&schema(), config);

    for name in ["release_name", "namespace"] {
        if config.get(name).and_then(Value::as_str) == Some("") {
            diagnostics.push(
                Diagnostic::error(format!("Empty value for attribute '{}'", name))
                    .with_detail(format!("{} must name a Helm {}", name, noun(name)))
                    .with_attribute(name),
            );
        }
    }
    diagnostics
}

fn noun(attribute: &str) -> &'static str {
    match attribute {
        "namespace" => "namespace",
        _ => "release",
    }
}

/// Read the release values and build the data source state.
///
/// The configuration is validated first; helm is not run for an invalid one.
pub async fn read(helm: &HelmClient, config: Value) -> Result<HelmReleaseState, ProviderError> {
    let diagnostics = validate_config(&config);
    if has_errors(&diagnostics) {
        return Err(ProviderError::InvalidConfig(diagnostics));
    }

    let config = HelmReleaseConfig::from_value(config)?;
    let release = config.release();
    debug!(release = %release, "Reading helm release values");

    let document = helm.get_values(&release).await?;
    let values = flatten_to_string(&document)?;
    let id = chrono::Utc::now().timestamp().to_string();

    info!(release = %release, id = %id, "Read helm release values");
    Ok(HelmReleaseState {
        release_name: config.release_name,
        namespace: config.namespace,
        id,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttributeType;

    #[test]
    fn test_schema_shape() {
        let schema = schema();
        let attrs = &schema.block.attributes;

        assert!(attrs["release_name"].flags.required);
        assert!(attrs["namespace"].flags.optional);
        assert!(attrs["namespace"].flags.computed);
        assert_eq!(attrs["namespace"].default, Some(json!("default")));
        assert!(attrs["id"].flags.computed && !attrs["id"].flags.optional);
        assert_eq!(attrs["values"].attr_type, AttributeType::String);
    }

    #[test]
    fn test_config_defaults_namespace() {
        let config = HelmReleaseConfig::from_value(json!({"release_name": "web"})).unwrap();
        assert_eq!(config.namespace, "default");

        let config =
            HelmReleaseConfig::from_value(json!({"release_name": "web", "namespace": null}))
                .unwrap();
        assert_eq!(config.release(), ReleaseRef::new("web", "default"));
    }

    #[test]
    fn test_config_ignores_computed_attributes() {
        let config = HelmReleaseConfig::from_value(json!({
            "release_name": "web",
            "namespace": "apps",
            "id": null,
            "values": null
        }))
        .unwrap();
        assert_eq!(config.release(), ReleaseRef::new("web", "apps"));
    }

    #[test]
    fn test_config_missing_release_name() {
        let err = HelmReleaseConfig::from_value(json!({})).unwrap_err();
        assert!(matches!(err, ProviderError::Serialization(_)));
    }

    #[test]
    fn test_validate_config() {
        assert!(validate_config(&json!({"release_name": "web"})).is_empty());

        let diagnostics = validate_config(&json!({"namespace": "apps"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("release_name"));

        let diagnostics = validate_config(&json!({"release_name": "", "namespace": ""}));
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics
            .iter()
            .all(|d| d.summary.starts_with("Empty value")));
    }

    #[test]
    fn test_validate_null_config() {
        let diagnostics = validate_config(&Value::Null);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("release_name"));
        assert!(diagnostics[0].summary.contains("Missing required attribute"));
    }

    #[tokio::test]
    async fn test_read_null_config_reports_release_name() {
        let helm = HelmClient::new().with_program("torb-never-run");
        let err = read(&helm, Value::Null).await.unwrap_err();

        assert!(matches!(err, ProviderError::InvalidConfig(_)));
        let diagnostics = err.to_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("release_name"));
    }

    #[tokio::test]
    async fn test_read_rejects_empty_release_name() {
        let helm = HelmClient::new().with_program("torb-never-run");
        let err = read(&helm, json!({"release_name": ""})).await.unwrap_err();
        assert_eq!(err.to_diagnostics()[0].summary, "Empty value for attribute 'release_name'");
    }

    #[test]
    fn test_state_serialization() {
        let state = HelmReleaseState {
            release_name: "web".to_string(),
            namespace: "apps".to_string(),
            id: "1700000000".to_string(),
            values: "{}".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({
                "release_name": "web",
                "namespace": "apps",
                "id": "1700000000",
                "values": "{}"
            })
        );
    }
}
