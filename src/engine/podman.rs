//! Podman-compatible CLI engine

use super::{
    command::{render_command, run_checked, run_command},
    ContainerEngine, EngineError, ProbeInvocation, ProbeOutput, PROBE_CAPABILITIES,
};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Drives a podman (or CLI-compatible) binary.
#[derive(Debug, Clone)]
pub struct PodmanEngine {
    binary: String,
}

impl Default for PodmanEngine {
    fn default() -> Self {
        Self::new("podman")
    }
}

impl PodmanEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Arguments of a sandboxed probe run: superuser inside the container,
    /// every capability dropped except [`PROBE_CAPABILITIES`], no privilege
    /// escalation, and the image entrypoint replaced by the binary itself.
    pub fn probe_args(invocation: &ProbeInvocation) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "run".into(),
            "--rm".into(),
            "--name".into(),
            invocation.name.clone(),
            "--entrypoint".into(),
            invocation.entrypoint.clone(),
            "--privileged".into(),
            "--security-opt=no-new-privileges".into(),
            "--cap-drop=all".into(),
        ];
        args.extend(PROBE_CAPABILITIES.iter().map(|cap| format!("--cap-add={cap}")));
        args.extend(
            ["--user", "0:0", "--env", "GUID=0", "--env", "PUID=0"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.push(invocation.image.clone());
        args.extend(invocation.args.iter().cloned());
        args
    }

    pub fn pull_args(image: &str, auth_file: Option<&Path>) -> Vec<String> {
        let mut args = vec!["pull".to_string()];
        if let Some(auth_file) = auth_file {
            args.push("--authfile".to_string());
            args.push(auth_file.to_string_lossy().into_owned());
        }
        args.push(image.to_string());
        args
    }
}

#[async_trait]
impl ContainerEngine for PodmanEngine {
    async fn pull(&self, image: &str, auth_file: Option<&Path>, timeout: Duration) -> Result<(), EngineError> {
        if let Some(path) = auth_file {
            debug!("Using authfile: {}", path.display());
        }
        run_checked(&self.binary, &Self::pull_args(image, auth_file), timeout).await?;
        Ok(())
    }

    async fn create(&self, image: &str, timeout: Duration) -> Result<String, EngineError> {
        let args = vec!["create".to_string(), image.to_string()];
        let output = run_checked(&self.binary, &args, timeout).await?;

        // Pull progress can precede the ID when the image is not cached.
        let container_id = output
            .stdout
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string();

        if container_id.is_empty() {
            return Err(EngineError::UnexpectedOutput {
                command: render_command(&self.binary, &args),
                reason: "no container ID printed".to_string(),
            });
        }

        debug!("Container created: {}", container_id);
        Ok(container_id)
    }

    async fn export(&self, container: &str, dest: &Path, timeout: Duration) -> Result<(), EngineError> {
        let args = vec![
            "export".to_string(),
            container.to_string(),
            "-o".to_string(),
            dest.to_string_lossy().into_owned(),
        ];
        run_checked(&self.binary, &args, timeout).await?;
        Ok(())
    }

    async fn remove_container(&self, container: &str, timeout: Duration) -> Result<(), EngineError> {
        let args = vec!["rm".to_string(), "-f".to_string(), container.to_string()];
        run_checked(&self.binary, &args, timeout).await?;
        Ok(())
    }

    async fn run_probe(&self, invocation: &ProbeInvocation, timeout: Duration) -> Result<ProbeOutput, EngineError> {
        let args = Self::probe_args(invocation);
        match run_command(&self.binary, &args, timeout).await {
            Ok(output) => Ok(ProbeOutput {
                stdout: output.stdout,
                stderr: output.stderr,
                exit_code: output.code,
                timed_out: false,
            }),
            Err(err) if err.is_timeout() => {
                debug!("Probe container {} timed out, removing it", invocation.name);
                // Killing the client does not always stop the container.
                if let Err(rm_err) = self.remove_container(&invocation.name, timeout).await {
                    debug!("Could not remove probe container {}: {}", invocation.name, rm_err);
                }
                Ok(ProbeOutput {
                    timed_out: true,
                    ..ProbeOutput::default()
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn remove_image(&self, image: &str, timeout: Duration) -> Result<(), EngineError> {
        let args = vec!["rmi".to_string(), "-f".to_string(), image.to_string()];
        run_checked(&self.binary, &args, timeout).await?;
        Ok(())
    }
}
