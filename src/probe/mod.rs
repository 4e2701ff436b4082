//! Version Prober: run a located binary inside the original image
//!
//! The extracted tree lacks the image's environment, so versions are always
//! taken from a fresh sandboxed run of the image itself. A probe never fails:
//! anything that goes wrong degrades to an `unknown` version.

pub mod parse;

use crate::engine::{ContainerEngine, ProbeInvocation};
use crate::types::{BinaryCandidate, ImageReference, RuntimeFamily, RuntimeProbeResult, UNKNOWN_VERSION};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const PROBE_NAME_PREFIX: &str = "cgroup-audit-probe";

pub struct VersionProber {
    engine: Arc<dyn ContainerEngine>,
    timeout: Duration,
}

impl VersionProber {
    pub fn new(engine: Arc<dyn ContainerEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    pub fn invocation(image: &ImageReference, candidate: &BinaryCandidate, family: RuntimeFamily) -> ProbeInvocation {
        ProbeInvocation {
            image: image.name().to_string(),
            entrypoint: candidate.container_path.clone(),
            args: vec![family.version_flag().to_string()],
            name: format!("{}-{}", PROBE_NAME_PREFIX, Uuid::new_v4().simple()),
        }
    }

    pub async fn probe(
        &self,
        image: &ImageReference,
        candidate: &BinaryCandidate,
        family: RuntimeFamily,
    ) -> RuntimeProbeResult {
        let invocation = Self::invocation(image, candidate, family);

        let output = match self.engine.run_probe(&invocation, self.timeout).await {
            Ok(output) => output,
            Err(err) => {
                warn!("Failed to run {} in {}: {}", candidate.container_path, image.name(), err);
                return RuntimeProbeResult {
                    version: UNKNOWN_VERSION.to_string(),
                    raw_output: err.to_string(),
                    flavor: parse::detect_flavor(family, ""),
                };
            }
        };

        if output.timed_out {
            warn!(
                "Version probe of {} timed out after {} seconds",
                candidate.container_path,
                self.timeout.as_secs()
            );
        } else if let Some(code) = output.exit_code.filter(|code| *code != 0) {
            debug!("{} {} exited with code {}", candidate.container_path, family.version_flag(), code);
        }

        // Many runtimes print a banner and still exit non-zero; always scan.
        let raw_output = parse::combine_output(family, &output.stdout, &output.stderr);
        let version = parse::extract_version(family, &raw_output).unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        let flavor = parse::detect_flavor(family, &raw_output);

        RuntimeProbeResult {
            version,
            raw_output,
            flavor,
        }
    }
}
