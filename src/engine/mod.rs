//! Container engine boundary
//!
//! Everything the pipeline needs from an OCI engine goes through
//! [`ContainerEngine`], so the analysis can be driven against a fake in tests.

pub mod command;
pub mod error;
pub mod podman;

pub use command::{render_command, run_checked, run_command, CommandOutput};
pub use error::EngineError;
pub use podman::PodmanEngine;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Capabilities retained inside a probe sandbox. Enough to get past images
/// whose files are owned by a non-root user, nothing more.
pub const PROBE_CAPABILITIES: [&str; 5] = ["chown", "dac_override", "fowner", "setuid", "setgid"];

/// A one-shot run of a binary inside the original image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeInvocation {
    pub image: String,
    /// Container path used as the overridden entrypoint.
    pub entrypoint: String,
    pub args: Vec<String>,
    /// Container name, so a run that outlives its timeout can be removed.
    pub name: String,
}

/// Whatever a probe run printed. Exit status is informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Pull `image` into local storage.
    async fn pull(&self, image: &str, auth_file: Option<&Path>, timeout: Duration) -> Result<(), EngineError>;

    /// Create a stopped container and return its ID.
    async fn create(&self, image: &str, timeout: Duration) -> Result<String, EngineError>;

    /// Export a container's filesystem as a tarball at `dest`.
    async fn export(&self, container: &str, dest: &Path, timeout: Duration) -> Result<(), EngineError>;

    async fn remove_container(&self, container: &str, timeout: Duration) -> Result<(), EngineError>;

    /// Execute a binary in an ephemeral sandboxed container.
    ///
    /// Timeouts and non-zero exits are reported through [`ProbeOutput`];
    /// only a failure to run the engine at all is an error.
    async fn run_probe(&self, invocation: &ProbeInvocation, timeout: Duration) -> Result<ProbeOutput, EngineError>;

    async fn remove_image(&self, image: &str, timeout: Duration) -> Result<(), EngineError>;
}
