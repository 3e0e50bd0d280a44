//! Testing utilities for provider implementations.
//!
//! Drives a [`ProviderService`] directly, without spinning up a gRPC server.
//!
//! # Example
//!
//! ```ignore
//! use terraform_provider_torb::testing::ProviderTester;
//! use terraform_provider_torb::TorbProvider;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn reads_release() {
//!     let tester = ProviderTester::new(TorbProvider::new("test"));
//!     tester.configure(json!({"helm_binary": "/opt/fake-helm"})).await.unwrap();
//!
//!     let state = tester
//!         .read_data_source("helm_release", json!({"release_name": "web"}))
//!         .await
//!         .unwrap();
//!     assert_eq!(state["namespace"], "default");
//! }
//! ```

use std::fmt;

use crate::error::ProviderError;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::server::ProviderService;
use serde_json::Value;

/// A test harness for provider implementations.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of data source type names.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    /// Validate provider configuration.
    ///
    /// Returns `Err` with the error diagnostics if there are any.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    /// Validate a data source configuration.
    pub async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_data_source_config(data_source_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Read data from a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .read_data_source(data_source_type, config)
            .await
    }

    /// Validate then read a data source, the way the host does during plan.
    pub async fn lifecycle_read(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, TestError> {
        self.validate_data_source_config(data_source_type, config.clone())
            .await?;
        Ok(self.read_data_source(data_source_type, config).await?)
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics
        .into_iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain an error scoped to the given attribute.
///
/// # Panics
///
/// Panics if no error diagnostic names the attribute.
pub fn assert_attribute_error(diagnostics: &[Diagnostic], attribute: &str) {
    let found = diagnostics.iter().any(|d| {
        matches!(d.severity, DiagnosticSeverity::Error) && d.attribute.as_deref() == Some(attribute)
    });

    assert!(
        found,
        "Expected an error for attribute '{}', got: {:?}",
        attribute,
        diagnostics
            .iter()
            .map(|d| (&d.summary, &d.attribute))
            .collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain an error whose summary or detail contains
/// the given substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics.iter().any(|d| {
        matches!(d.severity, DiagnosticSeverity::Error)
            && (d.summary.contains(substring)
                || d.detail.as_deref().is_some_and(|detail| detail.contains(substring)))
    });

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
            .collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helm::HelmClient;
    use crate::provider::TorbProvider;
    use serde_json::json;

    fn tester() -> ProviderTester<TorbProvider> {
        ProviderTester::new(TorbProvider::new("test"))
    }

    #[tokio::test]
    async fn test_tester_configure() {
        let tester = tester();
        assert!(tester.configure(json!({"kube_context": "kind"})).await.is_ok());
        assert_eq!(
            tester.provider().helm().await.kube_context(),
            Some("kind")
        );
    }

    #[tokio::test]
    async fn test_tester_configure_errors() {
        let err = tester()
            .validate_provider_config(json!({"helm_binary": false}))
            .await
            .unwrap_err();

        match err {
            TestError::Diagnostics(diags) => assert_attribute_error(&diags, "helm_binary"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_tester_schema() {
        let tester = tester();
        assert!(tester.schema().data_sources.contains_key("helm_release"));
        assert_eq!(tester.data_source_types(), vec!["helm_release"]);
    }

    #[tokio::test]
    async fn test_lifecycle_read_stops_at_validation() {
        let tester = ProviderTester::new(
            TorbProvider::new("test").with_helm(HelmClient::new().with_program("never-run")),
        );

        let err = tester
            .lifecycle_read("helm_release", json!({"release_name": ""}))
            .await
            .unwrap_err();
        assert!(matches!(err, TestError::Diagnostics(ref d) if d.len() == 1));
        assert!(err.to_string().contains("(at release_name)"));
    }

    #[tokio::test]
    async fn test_tester_stop() {
        assert!(tester().stop().await.is_ok());
    }

    #[test]
    fn test_assert_no_errors() {
        assert_no_errors(&[Diagnostic::warning("Just a warning")]);
    }

    #[test]
    #[should_panic(expected = "Expected no errors")]
    fn test_assert_no_errors_fails() {
        assert_no_errors(&[Diagnostic::error("An error")]);
    }

    #[test]
    fn test_assert_error_contains_detail() {
        let diagnostics = vec![Diagnostic::error("Failed to read values from Helm")
            .with_detail("Error: release: not found")];
        assert_error_contains(&diagnostics, "Helm");
        assert_error_contains(&diagnostics, "release: not found");
    }

    #[test]
    fn test_test_error_display() {
        let err = TestError::Diagnostics(vec![
            Diagnostic::error("First error").with_attribute("release_name"),
            Diagnostic::error("Second error").with_detail("More info"),
        ]);

        let display = format!("{}", err);
        assert!(display.contains("First error"));
        assert!(display.contains("Second error"));
        assert!(display.contains("release_name"));
        assert!(display.contains("More info"));
    }
}
