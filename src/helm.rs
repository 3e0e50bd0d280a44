//! Invocation of the `helm` command-line tool.
//!
//! The provider never talks to the Kubernetes API itself. Release values are
//! obtained by running
//!
//! ```text
//! helm get values <release> --namespace <namespace> -o json
//! ```
//!
//! and parsing its output.

use std::fmt;
use std::process::{ExitStatus, Stdio};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Program used when no explicit binary is configured.
pub const DEFAULT_HELM_BINARY: &str = "helm";

/// Namespace used when a release reference does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Errors raised while fetching release values from helm.
#[derive(Debug, Error)]
pub enum HelmError {
    /// The helm program could not be started.
    #[error("failed to run `{program}`: {source}")]
    Launch {
        /// Program that was attempted.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// helm ran but exited unsuccessfully.
    #[error("`{command}` failed ({status}): {output}")]
    Failed {
        /// The command line that was run.
        command: String,
        /// Exit status of the process.
        status: ExitStatus,
        /// Combined stderr and stdout of the process.
        output: String,
    },

    /// helm succeeded but its output was not valid JSON.
    #[error("failed to parse helm output as JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Identifies a deployed Helm release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRef {
    /// Name of the release.
    pub release_name: String,
    /// Namespace the release was installed into.
    pub namespace: String,
}

impl ReleaseRef {
    /// Reference a release in the given namespace.
    pub fn new(release_name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            release_name: release_name.into(),
            namespace: namespace.into(),
        }
    }

    /// Reference a release in the `default` namespace.
    pub fn in_default_namespace(release_name: impl Into<String>) -> Self {
        Self::new(release_name, DEFAULT_NAMESPACE)
    }
}

impl fmt::Display for ReleaseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.release_name)
    }
}

/// Runs helm commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelmClient {
    program: String,
    kube_context: Option<String>,
}

impl Default for HelmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HelmClient {
    /// Create a client that runs `helm` from `PATH`.
    pub fn new() -> Self {
        Self {
            program: DEFAULT_HELM_BINARY.to_string(),
            kube_context: None,
        }
    }

    /// Use a different program instead of `helm`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Pass `--kube-context` to every invocation.
    pub fn with_kube_context(mut self, context: impl Into<String>) -> Self {
        self.kube_context = Some(context.into());
        self
    }

    /// The program this client runs.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The kube context forwarded to helm, if any.
    pub fn kube_context(&self) -> Option<&str> {
        self.kube_context.as_deref()
    }

    /// Arguments for `helm get values` on the given release.
    pub fn get_values_args(&self, release: &ReleaseRef) -> Vec<String> {
        let mut args = vec![
            "get".to_string(),
            "values".to_string(),
            release.release_name.clone(),
            "--namespace".to_string(),
            release.namespace.clone(),
            "-o".to_string(),
            "json".to_string(),
        ];
        if let Some(context) = &self.kube_context {
            args.push("--kube-context".to_string());
            args.push(context.clone());
        }
        args
    }

    /// Fetch the user-supplied values of a release as a JSON document.
    ///
    /// A release without values (helm prints `null`) yields an empty object.
    #[instrument(skip(self), fields(program = %self.program))]
    pub async fn get_values(&self, release: &ReleaseRef) -> Result<serde_json::Value, HelmError> {
        let args = self.get_values_args(release);
        debug!(args = ?args, "Running helm");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| HelmError::Launch {
                program: self.program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HelmError::Failed {
                command: format!("{} {}", self.program, args.join(" ")),
                status: output.status,
                output: combine_output(&stderr, &stdout),
            });
        }

        debug!(bytes = output.stdout.len(), "helm completed");
        parse_values(&stdout)
    }
}

/// Parse `helm get values -o json` output.
///
/// helm prints a bare `null` for releases installed without values; that is
/// treated as an empty object.
pub fn parse_values(output: &str) -> Result<serde_json::Value, HelmError> {
    let trimmed = output.trim();
    let document = if trimmed == "null" { "{}" } else { trimmed };
    Ok(serde_json::from_str(document)?)
}

fn combine_output(stderr: &str, stdout: &str) -> String {
    let parts: Vec<&str> = [stderr.trim(), stdout.trim()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect();
    parts.join("\n")
}
