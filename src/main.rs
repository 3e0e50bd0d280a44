use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use terraform_provider_torb::{
    init_logging_with_default, serve_on_with_options, serve_with_options, ServeOptions,
    TorbProvider,
};

/// Provider plugin exposing deployed Helm release values.
///
/// Meant to be launched by the host, which reads the handshake line from
/// stdout and connects over gRPC.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Listen on a fixed address instead of an ephemeral localhost port.
    #[arg(long, env = "TORB_PROVIDER_ADDRESS")]
    address: Option<SocketAddr>,

    /// Seconds to wait for in-flight requests after a shutdown signal.
    #[arg(long, env = "TORB_PROVIDER_SHUTDOWN_TIMEOUT", default_value_t = 30)]
    shutdown_timeout: u64,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging_with_default(if args.debug { "debug" } else { "info" });

    let provider = TorbProvider::new(env!("CARGO_PKG_VERSION"));
    let options =
        ServeOptions::new().with_shutdown_timeout(Duration::from_secs(args.shutdown_timeout));

    let result = match args.address {
        Some(addr) => serve_on_with_options(provider, addr, options).await,
        None => serve_with_options(provider, options).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Provider server failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from([
            "terraform-provider-torb",
            "--address",
            "127.0.0.1:4000",
            "--shutdown-timeout",
            "5",
            "--debug",
        ]);
        assert_eq!(args.address, Some("127.0.0.1:4000".parse().unwrap()));
        assert_eq!(args.shutdown_timeout, 5);
        assert!(args.debug);
    }
}
