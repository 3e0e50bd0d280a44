//! Logging and tracing setup.
//!
//! All logs are written to **stderr**: stdout carries the handshake line the
//! host reads to find the provider's listen address.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls log levels (e.g., `info`, `debug`,
//!   `terraform_provider_torb=debug`)
//!
//! ```bash
//! # Trace every helm invocation
//! RUST_LOG=terraform_provider_torb::helm=debug terraform plan
//! ```

use tracing::Subscriber;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Level used when `RUST_LOG` is not set.
pub const DEFAULT_LEVEL: &str = "info";

/// Initialize the default logging subscriber.
///
/// Respects `RUST_LOG` and falls back to `info`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default(DEFAULT_LEVEL);
}

/// Initialize logging with a custom default level, used when `RUST_LOG` is
/// not set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_level).init();
}

/// Try to initialize logging, returning false if already initialized.
///
/// Useful in tests where several cases may race to install a subscriber.
pub fn try_init_logging() -> bool {
    subscriber(DEFAULT_LEVEL).try_init().is_ok()
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn subscriber(default_level: &str) -> impl Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry().with(env_filter(default_level)).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}
