//! Server helpers for running the provider.
//!
//! This module provides the [`ProviderService`] trait a provider implements
//! and the `serve` family of functions that expose it over gRPC with the
//! handshake protocol.
//!
//! # Signal Handling
//!
//! The server handles SIGTERM and SIGINT (CTRL+C on Windows) for graceful
//! shutdown. When a signal is received, the server:
//! 1. Stops accepting new connections
//! 2. Waits for in-flight requests to complete (bounded by a timeout)
//! 3. Calls the provider's `stop()` method
//! 4. Exits cleanly

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tonic::transport::Server;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProviderError;
use crate::schema::{has_errors, Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::types::{handshake_line, ProviderMetadata};
use crate::validation::validate;

/// Trait that provider implementations must implement.
///
/// This is a higher-level API than the raw gRPC trait, using JSON values and
/// schema types instead of protobuf messages.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Name the provider is registered under by the host.
    fn type_name(&self) -> &str;

    /// Release version of the provider.
    fn version(&self) -> &str {
        "dev"
    }

    /// Return the provider's schema including all data sources.
    fn schema(&self) -> ProviderSchema;

    /// Return provider metadata. By default, this is derived from the schema.
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            type_name: self.type_name().to_string(),
            version: self.version().to_string(),
            data_sources: self.schema().data_sources.into_keys().collect(),
        }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider configuration before configuring.
    /// By default, checks it against the provider schema.
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validate(&self.schema().provider, &config))
    }

    /// Configure the provider.
    /// Returns diagnostics (errors and warnings).
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source's configuration.
    /// By default, checks it against the data source schema.
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let schema = self.schema();
        let data_source = schema
            .data_sources
            .get(data_source_type)
            .ok_or_else(|| ProviderError::UnknownDataSource(data_source_type.to_string()))?;
        Ok(validate(data_source, &config))
    }

    /// Read data from an external source.
    async fn read_data_source(
        &self,
        data_source_type: &str,
        _config: Value,
    ) -> Result<Value, ProviderError> {
        Err(ProviderError::UnknownDataSource(data_source_type.to_string()))
    }
}

/// Wrapper that implements the generated gRPC trait.
struct ProviderGrpcService<P: ProviderService> {
    provider: Arc<P>,
}

fn diagnostics_to_proto(diagnostics: Vec<Diagnostic>) -> Vec<crate::generated::Diagnostic> {
    diagnostics
        .into_iter()
        .map(|d| crate::generated::Diagnostic {
            severity: match d.severity {
                DiagnosticSeverity::Error => crate::generated::diagnostic::Severity::Error as i32,
                DiagnosticSeverity::Warning => {
                    crate::generated::diagnostic::Severity::Warning as i32
                }
            },
            summary: d.summary,
            detail: d.detail.unwrap_or_default(),
            attribute: d.attribute.unwrap_or_default(),
        })
        .collect()
}

fn error_to_diagnostics(err: &ProviderError) -> Vec<crate::generated::Diagnostic> {
    diagnostics_to_proto(err.to_diagnostics())
}

fn schema_to_proto(schema: &crate::schema::Schema) -> crate::generated::Schema {
    let mut attributes: Vec<_> = schema
        .block
        .attributes
        .iter()
        .map(|(name, attr)| crate::generated::Attribute {
            name: name.clone(),
            r#type: serde_json::to_vec(&attr.attr_type).unwrap_or_default(),
            required: attr.flags.required,
            optional: attr.flags.optional,
            computed: attr.flags.computed,
            sensitive: attr.flags.sensitive,
            description: attr.description.clone().unwrap_or_default(),
            default_value: attr
                .default
                .as_ref()
                .map(|v| serde_json::to_vec(v).unwrap_or_default())
                .unwrap_or_default(),
        })
        .collect();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));

    crate::generated::Schema {
        version: schema.version as i64,
        block: Some(crate::generated::Block {
            attributes,
            description: schema.block.description.clone().unwrap_or_default(),
        }),
    }
}

/// Decode a JSON payload; an empty payload is null.
fn decode_json(bytes: &[u8]) -> Result<Value, ProviderError> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(bytes)?)
}

fn log_validation(operation: &str, diagnostics: &[Diagnostic]) {
    if has_errors(diagnostics) {
        warn!(
            diagnostics = diagnostics.len(),
            "{} completed with errors", operation
        );
    } else {
        info!("{} completed successfully", operation);
    }
}

#[tonic::async_trait]
impl<P: ProviderService> crate::generated::provider_server::Provider for ProviderGrpcService<P> {
    #[instrument(skip(self, _request), name = "grpc.get_metadata")]
    async fn get_metadata(
        &self,
        _request: tonic::Request<crate::generated::GetMetadataRequest>,
    ) -> Result<tonic::Response<crate::generated::GetMetadataResponse>, tonic::Status> {
        debug!("GetMetadata called");
        let metadata = self.provider.metadata();
        info!(
            type_name = %metadata.type_name,
            version = %metadata.version,
            data_sources = metadata.data_sources.len(),
            "GetMetadata completed"
        );
        Ok(tonic::Response::new(metadata.into()))
    }

    #[instrument(skip(self, _request), name = "grpc.get_schema")]
    async fn get_schema(
        &self,
        _request: tonic::Request<crate::generated::GetSchemaRequest>,
    ) -> Result<tonic::Response<crate::generated::GetSchemaResponse>, tonic::Status> {
        debug!("GetSchema called");
        let schema = self.provider.schema();
        info!(data_sources = schema.data_sources.len(), "GetSchema completed");
        Ok(tonic::Response::new(crate::generated::GetSchemaResponse {
            provider: Some(schema_to_proto(&schema.provider)),
            data_sources: schema
                .data_sources
                .iter()
                .map(|(k, v)| (k.clone(), schema_to_proto(v)))
                .collect(),
            diagnostics: vec![],
        }))
    }

    #[instrument(skip(self, request), name = "grpc.validate_provider_config")]
    async fn validate_provider_config(
        &self,
        request: tonic::Request<crate::generated::ValidateProviderConfigRequest>,
    ) -> Result<tonic::Response<crate::generated::ValidateProviderConfigResponse>, tonic::Status>
    {
        debug!("ValidateProviderConfig called");
        let req = request.into_inner();
        let result = match decode_json(&req.config) {
            Ok(config) => self.provider.validate_provider_config(config).await,
            Err(e) => Err(e),
        };

        let diagnostics = match result {
            Ok(diagnostics) => {
                log_validation("ValidateProviderConfig", &diagnostics);
                diagnostics_to_proto(diagnostics)
            }
            Err(e) => {
                error!(error = %e, "ValidateProviderConfig failed");
                error_to_diagnostics(&e)
            }
        };
        Ok(tonic::Response::new(
            crate::generated::ValidateProviderConfigResponse { diagnostics },
        ))
    }

    #[instrument(skip(self, request), name = "grpc.configure")]
    async fn configure(
        &self,
        request: tonic::Request<crate::generated::ConfigureRequest>,
    ) -> Result<tonic::Response<crate::generated::ConfigureResponse>, tonic::Status> {
        debug!("Configure called");
        let req = request.into_inner();
        let result = match decode_json(&req.config) {
            Ok(config) => self.provider.configure(config).await,
            Err(e) => Err(e),
        };

        let diagnostics = match result {
            Ok(diagnostics) => {
                log_validation("Configure", &diagnostics);
                diagnostics_to_proto(diagnostics)
            }
            Err(e) => {
                error!(error = %e, "Configure failed");
                error_to_diagnostics(&e)
            }
        };
        Ok(tonic::Response::new(crate::generated::ConfigureResponse {
            diagnostics,
        }))
    }

    #[instrument(skip(self, _request), name = "grpc.stop")]
    async fn stop(
        &self,
        _request: tonic::Request<crate::generated::StopRequest>,
    ) -> Result<tonic::Response<crate::generated::StopResponse>, tonic::Status> {
        info!("Stop called");
        let error = match self.provider.stop().await {
            Ok(()) => {
                info!("Stop completed successfully");
                String::new()
            }
            Err(e) => {
                error!(error = %e, "Stop failed");
                e.to_string()
            }
        };
        Ok(tonic::Response::new(crate::generated::StopResponse { error }))
    }

    #[instrument(skip(self, request), name = "grpc.validate_data_source_config")]
    async fn validate_data_source_config(
        &self,
        request: tonic::Request<crate::generated::ValidateDataSourceConfigRequest>,
    ) -> Result<tonic::Response<crate::generated::ValidateDataSourceConfigResponse>, tonic::Status>
    {
        let req = request.into_inner();
        debug!(data_source_type = %req.data_source_type, "ValidateDataSourceConfig called");
        let result = match decode_json(&req.config) {
            Ok(config) => {
                self.provider
                    .validate_data_source_config(&req.data_source_type, config)
                    .await
            }
            Err(e) => Err(e),
        };

        let diagnostics = match result {
            Ok(diagnostics) => {
                log_validation("ValidateDataSourceConfig", &diagnostics);
                diagnostics_to_proto(diagnostics)
            }
            Err(e) => {
                error!(data_source_type = %req.data_source_type, error = %e, "ValidateDataSourceConfig failed");
                error_to_diagnostics(&e)
            }
        };
        Ok(tonic::Response::new(
            crate::generated::ValidateDataSourceConfigResponse { diagnostics },
        ))
    }

    #[instrument(skip(self, request), name = "grpc.read_data_source")]
    async fn read_data_source(
        &self,
        request: tonic::Request<crate::generated::ReadDataSourceRequest>,
    ) -> Result<tonic::Response<crate::generated::ReadDataSourceResponse>, tonic::Status> {
        let req = request.into_inner();
        debug!(data_source_type = %req.data_source_type, "ReadDataSource called");
        let result = match decode_json(&req.config) {
            Ok(config) => {
                self.provider
                    .read_data_source(&req.data_source_type, config)
                    .await
            }
            Err(e) => Err(e),
        };

        match result.and_then(|state| Ok(serde_json::to_vec(&state)?)) {
            Ok(state) => {
                info!(data_source_type = %req.data_source_type, "ReadDataSource completed successfully");
                Ok(tonic::Response::new(
                    crate::generated::ReadDataSourceResponse {
                        state,
                        diagnostics: vec![],
                    },
                ))
            }
            Err(e) => {
                error!(data_source_type = %req.data_source_type, error = %e, "ReadDataSource failed");
                Ok(tonic::Response::new(
                    crate::generated::ReadDataSourceResponse {
                        state: vec![],
                        diagnostics: error_to_diagnostics(&e),
                    },
                ))
            }
        }
    }
}

/// Options for configuring the provider server.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Timeout for graceful shutdown. After receiving a shutdown signal,
    /// the server waits this long for in-flight requests to complete.
    /// Default: 30 seconds.
    pub shutdown_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServeOptions {
    /// Create new serve options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT, CTRL+C on Windows).
///
/// If no handler can be installed the future never resolves; the host then
/// stops the provider by killing the process.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!(error = %e, "Failed to install signal handlers");
                    return std::future::pending::<()>().await;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        }
    }

    #[cfg(windows)]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install CTRL+C handler");
            return std::future::pending::<()>().await;
        }
        info!("Received CTRL+C, initiating graceful shutdown");
    }

    #[cfg(not(any(unix, windows)))]
    {
        std::future::pending::<()>().await;
    }
}

/// Serve a provider implementation as a gRPC server.
///
/// This function:
/// 1. Binds an ephemeral port on 127.0.0.1
/// 2. Outputs the handshake line to stdout
/// 3. Serves until SIGTERM/SIGINT, then shuts down gracefully
///
/// The handshake format is: `TORB_PROVIDER|<version>|<address>`
pub async fn serve<P: ProviderService>(provider: P) -> Result<(), ProviderError> {
    serve_with_options(provider, ServeOptions::default()).await
}

/// Serve a provider with custom options.
pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> Result<(), ProviderError> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    serve_on_listener(provider, listener, options).await
}

/// Serve a provider on a specific address.
pub async fn serve_on<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
) -> Result<(), ProviderError> {
    serve_on_with_options(provider, addr, ServeOptions::default()).await
}

/// Serve a provider on a specific address with custom options.
pub async fn serve_on_with_options<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
    options: ServeOptions,
) -> Result<(), ProviderError> {
    let listener = TcpListener::bind(addr).await?;
    serve_on_listener(provider, listener, options).await
}

async fn serve_on_listener<P: ProviderService>(
    provider: P,
    listener: TcpListener,
    options: ServeOptions,
) -> Result<(), ProviderError> {
    let addr = listener.local_addr()?;
    println!("{}", handshake_line(addr));

    info!(address = %addr, "Provider server starting");

    let provider = Arc::new(provider);
    let provider_for_shutdown = Arc::clone(&provider);

    let grpc_service = ProviderGrpcService { provider };
    let server = crate::generated::provider_server::ProviderServer::new(grpc_service);

    let server_future = Server::builder()
        .add_service(server)
        .serve_with_incoming_shutdown(
            tokio_stream::wrappers::TcpListenerStream::new(listener),
            wait_for_shutdown_signal(),
        );
    tokio::pin!(server_future);

    // The timeout only starts once a shutdown signal has been seen.
    tokio::select! {
        result = &mut server_future => {
            if let Err(e) = result {
                error!(error = %e, "Server error");
                return Err(e.into());
            }
        }
        _ = wait_for_shutdown_signal() => {
            match tokio::time::timeout(options.shutdown_timeout, &mut server_future).await {
                Ok(Ok(())) => info!("Server shutdown complete"),
                Ok(Err(e)) => {
                    error!(error = %e, "Server error during shutdown");
                    return Err(e.into());
                }
                Err(_) => warn!(
                    timeout = ?options.shutdown_timeout,
                    "Shutdown timeout exceeded, forcing shutdown"
                ),
            }
        }
    }

    debug!("Calling provider stop()");
    if let Err(e) = provider_for_shutdown.stop().await {
        warn!(error = %e, "Provider stop() returned error");
    }

    info!("Provider shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generated::provider_server::Provider;
    use crate::provider::TorbProvider;
    use crate::schema::{Attribute, Schema};
    use serde_json::json;

    fn service() -> ProviderGrpcService<TorbProvider> {
        ProviderGrpcService {
            provider: Arc::new(TorbProvider::new("0.1.2")),
        }
    }

    #[test]
    fn test_diagnostics_to_proto() {
        let proto = diagnostics_to_proto(vec![
            Diagnostic::error("bad").with_attribute("release_name"),
            Diagnostic::warning("meh").with_detail("more"),
        ]);

        assert_eq!(
            proto[0].severity,
            crate::generated::diagnostic::Severity::Error as i32
        );
        assert_eq!(proto[0].attribute, "release_name");
        assert_eq!(proto[0].detail, "");
        assert_eq!(
            proto[1].severity,
            crate::generated::diagnostic::Severity::Warning as i32
        );
        assert_eq!(proto[1].detail, "more");
    }

    #[test]
    fn test_schema_to_proto() {
        let schema = Schema::v0()
            .with_description("desc")
            .with_attribute("b", Attribute::computed_string())
            .with_attribute("a", Attribute::optional_string().with_default(json!("x")));

        let proto = schema_to_proto(&schema);
        let block = proto.block.unwrap();
        assert_eq!(block.description, "desc");
        assert_eq!(block.attributes.len(), 2);
        assert_eq!(block.attributes[0].name, "a");
        assert_eq!(block.attributes[0].r#type, b"\"string\"".to_vec());
        assert_eq!(block.attributes[0].default_value, b"\"x\"".to_vec());
        assert!(block.attributes[1].computed);
        assert!(block.attributes[1].default_value.is_empty());
    }

    #[test]
    fn test_decode_json() {
        assert_eq!(decode_json(b"").unwrap(), Value::Null);
        assert_eq!(decode_json(b"{\"a\":1}").unwrap(), json!({"a": 1}));
        assert!(matches!(
            decode_json(b"{"),
            Err(ProviderError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_grpc_get_metadata() {
        let response = service()
            .get_metadata(tonic::Request::new(
                crate::generated::GetMetadataRequest {},
            ))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.type_name, "torb");
        assert_eq!(response.version, "0.1.2");
        assert_eq!(response.data_sources, vec!["helm_release"]);
    }

    #[tokio::test]
    async fn test_grpc_get_schema() {
        let response = service()
            .get_schema(tonic::Request::new(crate::generated::GetSchemaRequest {}))
            .await
            .unwrap()
            .into_inner();

        let release = &response.data_sources["helm_release"];
        let names: Vec<_> = release
            .block
            .as_ref()
            .unwrap()
            .attributes
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "namespace", "release_name", "values"]);
        assert!(response.provider.is_some());
    }

    #[tokio::test]
    async fn test_grpc_validate_data_source_config() {
        let response = service()
            .validate_data_source_config(tonic::Request::new(
                crate::generated::ValidateDataSourceConfigRequest {
                    data_source_type: "helm_release".to_string(),
                    config: br#"{"namespace":"apps"}"#.to_vec(),
                },
            ))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(response.diagnostics[0].attribute, "release_name");
    }

    #[tokio::test]
    async fn test_grpc_empty_data_source_config_requires_release_name() {
        let validated = service()
            .validate_data_source_config(tonic::Request::new(
                crate::generated::ValidateDataSourceConfigRequest {
                    data_source_type: "helm_release".to_string(),
                    config: vec![],
                },
            ))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(validated.diagnostics.len(), 1);
        assert_eq!(validated.diagnostics[0].attribute, "release_name");

        let read = service()
            .read_data_source(tonic::Request::new(
                crate::generated::ReadDataSourceRequest {
                    data_source_type: "helm_release".to_string(),
                    config: vec![],
                },
            ))
            .await
            .unwrap()
            .into_inner();
        assert!(read.state.is_empty());
        assert_eq!(read.diagnostics.len(), 1);
        assert_eq!(read.diagnostics[0].attribute, "release_name");
    }

    #[tokio::test]
    async fn test_grpc_read_unknown_data_source() {
        let response = service()
            .read_data_source(tonic::Request::new(
                crate::generated::ReadDataSourceRequest {
                    data_source_type: "torb_stack".to_string(),
                    config: b"{}".to_vec(),
                },
            ))
            .await
            .unwrap()
            .into_inner();

        assert!(response.state.is_empty());
        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(
            response.diagnostics[0].summary,
            "Unknown data source type: torb_stack"
        );
    }

    #[tokio::test]
    async fn test_grpc_configure_rejects_malformed_json() {
        let response = service()
            .configure(tonic::Request::new(crate::generated::ConfigureRequest {
                config: b"{not json".to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.diagnostics.len(), 1);
        assert!(response.diagnostics[0]
            .summary
            .starts_with("Serialization error"));
    }

    #[tokio::test]
    async fn test_grpc_stop() {
        let response = service()
            .stop(tonic::Request::new(crate::generated::StopRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert!(response.error.is_empty());
    }
}
