//! The `torb` provider.

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::ProviderError;
use crate::helm::HelmClient;
use crate::helm_release;
use crate::schema::{has_errors, Attribute, Diagnostic, ProviderSchema, Schema};
use crate::server::ProviderService;
use crate::validation::validate;

/// Name the provider is registered under by the host.
pub const TYPE_NAME: &str = "torb";

/// Provider block configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderConfig {
    /// Program to run instead of `helm`.
    #[serde(default)]
    pub helm_binary: Option<String>,
    /// Kube context forwarded to every helm invocation.
    #[serde(default)]
    pub kube_context: Option<String>,
}

impl ProviderConfig {
    /// Build the helm client this configuration describes.
    pub fn helm_client(&self) -> HelmClient {
        let mut client = HelmClient::new();
        if let Some(program) = &self.helm_binary {
            client = client.with_program(program);
        }
        if let Some(context) = &self.kube_context {
            client = client.with_kube_context(context);
        }
        client
    }
}

fn provider_config_schema() -> Schema {
    Schema::v0()
        .with_attribute(
            "helm_binary",
            Attribute::optional_string()
                .with_description("Path of the helm program. Defaults to `helm` on PATH."),
        )
        .with_attribute(
            "kube_context",
            Attribute::optional_string()
                .with_description("Kubeconfig context passed to helm as `--kube-context`."),
        )
}

/// Provider exposing the `helm_release` data source.
///
/// The version is set to the release version when built for distribution
/// and `dev` for local builds.
#[derive(Debug)]
pub struct TorbProvider {
    version: String,
    helm: RwLock<HelmClient>,
}

impl TorbProvider {
    /// Create an unconfigured provider reporting the given version.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            helm: RwLock::new(HelmClient::new()),
        }
    }

    /// Create a provider that runs the given helm client until configured
    /// otherwise.
    pub fn with_helm(mut self, helm: HelmClient) -> Self {
        self.helm = RwLock::new(helm);
        self
    }

    /// The helm client currently in use.
    pub async fn helm(&self) -> HelmClient {
        self.helm.read().await.clone()
    }
}

#[async_trait::async_trait]
impl ProviderService for TorbProvider {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(provider_config_schema())
            .with_data_source(helm_release::TYPE_NAME, helm_release::schema())
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validate(&provider_config_schema(), &config);
        if config.get("helm_binary").and_then(Value::as_str) == Some("") {
            diagnostics.push(
                Diagnostic::error("Empty value for attribute 'helm_binary'")
                    .with_detail("Omit helm_binary to use `helm` from PATH")
                    .with_attribute("helm_binary"),
            );
        }
        Ok(diagnostics)
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let diagnostics = self.validate_provider_config(config.clone()).await?;
        if has_errors(&diagnostics) {
            return Ok(diagnostics);
        }

        let config: ProviderConfig = if config.is_null() {
            ProviderConfig::default()
        } else {
            serde_json::from_value(config)?
        };
        let client = config.helm_client();
        info!(
            program = %client.program(),
            kube_context = client.kube_context().unwrap_or(""),
            "Provider configured"
        );
        *self.helm.write().await = client;
        Ok(diagnostics)
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        match data_source_type {
            helm_release::TYPE_NAME => Ok(helm_release::validate_config(&config)),
            other => Err(ProviderError::UnknownDataSource(other.to_string())),
        }
    }

    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        debug!(data_source_type, "Reading data source");
        match data_source_type {
            helm_release::TYPE_NAME => {
                let helm = self.helm().await;
                let state = helm_release::read(&helm, config).await?;
                Ok(serde_json::to_value(state)?)
            }
            other => Err(ProviderError::UnknownDataSource(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_metadata() {
        let provider = TorbProvider::new("0.1.2");
        let metadata = provider.metadata();
        assert_eq!(metadata.type_name, "torb");
        assert_eq!(metadata.version, "0.1.2");
        assert_eq!(metadata.data_sources, vec!["helm_release"]);
    }

    #[test]
    fn test_provider_config_helm_client() {
        let config: ProviderConfig = serde_json::from_value(json!({
            "helm_binary": "/usr/local/bin/helm3",
            "kube_context": null
        }))
        .unwrap();

        let client = config.helm_client();
        assert_eq!(client.program(), "/usr/local/bin/helm3");
        assert_eq!(client.kube_context(), None);
    }

    #[tokio::test]
    async fn test_configure_updates_helm_client() {
        let provider = TorbProvider::new("dev");
        assert_eq!(provider.helm().await.program(), "helm");

        let diagnostics = assert_ok!(
            provider
                .configure(json!({"helm_binary": "helm3", "kube_context": "kind-dev"}))
                .await
        );
        assert!(diagnostics.is_empty());

        let helm = provider.helm().await;
        assert_eq!(helm.program(), "helm3");
        assert_eq!(helm.kube_context(), Some("kind-dev"));
    }

    #[tokio::test]
    async fn test_configure_null_keeps_defaults() {
        let provider = TorbProvider::new("dev");
        let diagnostics = assert_ok!(provider.configure(Value::Null).await);
        assert!(diagnostics.is_empty());
        assert_eq!(provider.helm().await, HelmClient::new());
    }

    #[tokio::test]
    async fn test_configure_rejects_invalid_config() {
        let provider = TorbProvider::new("dev").with_helm(HelmClient::new().with_program("mine"));

        let diagnostics = assert_ok!(provider.configure(json!({"helm_binary": ""})).await);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("helm_binary"));

        let diagnostics = assert_ok!(provider.configure(json!({"kube_context": 3})).await);
        assert!(has_errors(&diagnostics));

        // Rejected configuration leaves the client untouched.
        assert_eq!(provider.helm().await.program(), "mine");
    }

    #[tokio::test]
    async fn test_unknown_data_source() {
        let provider = TorbProvider::new("dev");

        let err = assert_err!(provider.read_data_source("helm_chart", json!({})).await);
        assert!(matches!(err, ProviderError::UnknownDataSource(name) if name == "helm_chart"));

        assert_err!(
            provider
                .validate_data_source_config("helm_chart", json!({}))
                .await
        );
    }

    #[tokio::test]
    async fn test_read_reports_launch_failure() {
        let provider = TorbProvider::new("dev")
            .with_helm(HelmClient::new().with_program("torb-missing-helm-binary"));

        let err = assert_err!(
            provider
                .read_data_source("helm_release", json!({"release_name": "web"}))
                .await
        );
        let diagnostic = err.to_diagnostic();
        assert_eq!(diagnostic.summary, "Failed to read values from Helm");
        assert!(diagnostic
            .detail
            .unwrap()
            .contains("torb-missing-helm-binary"));
    }
}
