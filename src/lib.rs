//! Torb provider plugin
//!
//! A provider exposing a single data source, `helm_release`, which reads the
//! values of a deployed Helm release by running the `helm` command-line tool
//! and returns them flattened to dot-joined keys.
//!
//! # Overview
//!
//! - **helm_release**: The data source ([`helm_release`]), backed by
//!   [`helm::HelmClient`] and [`flatten`]
//! - **TorbProvider**: The provider shell registering the data source
//! - **ProviderService trait**: The async API the gRPC server adapts
//! - **Server helpers**: Functions to start the gRPC server with the handshake protocol
//! - **Schema & validation**: Attribute schemas, defaults and config checks
//! - **Logging**: Integration with `tracing` for structured logging
//!
//! # Quick Start
//!
//! ```ignore
//! use terraform_provider_torb::{init_logging, serve, TorbProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!     serve(TorbProvider::new(env!("CARGO_PKG_VERSION"))).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Handshake Protocol
//!
//! When the provider starts via [`serve`], it writes a handshake line to stdout:
//!
//! ```text
//! TORB_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `TORB_PROVIDER|<protocol_version>|<address>`
//!
//! The host spawns the provider as a subprocess, reads this line and connects
//! over gRPC.
//!
//! # Provider Protocol
//!
//! - **GetMetadata**: Returns the type name, version and data source names
//! - **GetSchema**: Returns the provider configuration and data source schemas
//! - **ValidateProviderConfig**: Validates provider configuration
//! - **Configure**: Configures the helm client
//! - **Stop**: Gracefully shuts down the provider
//! - **ValidateDataSourceConfig**: Validates data source configuration
//! - **ReadDataSource**: Runs helm and returns the flattened release values

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod flatten;
pub mod helm;
pub mod helm_release;
pub mod logging;
pub mod provider;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;
pub mod validation;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

pub use error::ProviderError;
pub use helm::{HelmClient, HelmError, ReleaseRef};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::TorbProvider;
pub use schema::ProviderSchema;
pub use server::{
    serve, serve_on, serve_on_with_options, serve_with_options, ProviderService, ServeOptions,
};
pub use types::{ProviderMetadata, HANDSHAKE_PREFIX, PROTOCOL_VERSION};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for implementors of `ProviderService`
pub use async_trait::async_trait;
