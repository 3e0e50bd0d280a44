//! Error types for the provider.

use thiserror::Error;

use crate::flatten::FlattenError;
use crate::helm::HelmError;
use crate::schema::Diagnostic;

/// Summary reported to the user when release values cannot be read.
pub const READ_VALUES_SUMMARY: &str = "Failed to read values from Helm";

/// Errors that can occur while serving the provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The configuration failed validation.
    #[error("Invalid configuration: {}", summaries(.0))]
    InvalidConfig(Vec<Diagnostic>),

    /// The requested data source type is unknown.
    #[error("Unknown data source type: {0}")]
    UnknownDataSource(String),

    /// Running helm failed.
    #[error(transparent)]
    Helm(#[from] HelmError),

    /// The values document could not be flattened.
    #[error(transparent)]
    Flatten(#[from] FlattenError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binding the listen socket failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A gRPC transport error occurred.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

impl ProviderError {
    /// Convert this error into the single diagnostic reported to the host.
    ///
    /// Failures fetching release values share one summary and carry the
    /// underlying error text, including helm's own output, as detail.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Helm(_) | Self::Flatten(_) => {
                Diagnostic::error(READ_VALUES_SUMMARY).with_detail(self.to_string())
            }
            other => Diagnostic::error(other.to_string()),
        }
    }

    /// Convert this error into the diagnostics reported to the host.
    ///
    /// Validation failures keep their attribute-scoped diagnostics; every
    /// other error becomes a single one.
    pub fn to_diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            Self::InvalidConfig(diagnostics) => diagnostics.clone(),
            other => vec![other.to_diagnostic()],
        }
    }
}

fn summaries(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.summary.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            err @ ProviderError::InvalidConfig(_) => {
                tonic::Status::invalid_argument(err.to_string())
            }
            ProviderError::UnknownDataSource(msg) => tonic::Status::not_found(msg),
            ProviderError::Helm(err) => tonic::Status::unavailable(err.to_string()),
            ProviderError::Flatten(err) => tonic::Status::internal(err.to_string()),
            ProviderError::Serialization(err) => {
                tonic::Status::invalid_argument(format!("Serialization error: {}", err))
            }
            ProviderError::Io(err) => tonic::Status::internal(format!("I/O error: {}", err)),
            ProviderError::Transport(err) => {
                tonic::Status::unavailable(format!("Transport error: {}", err))
            }
        }
    }
}
