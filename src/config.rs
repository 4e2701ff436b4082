//! Analyzer configuration
//!
//! Loaded from YAML or JSON (by file extension) and then overridden by
//! command-line flags. Every field has a default, so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Per-call limits for the external processes the pipeline drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub pull_secs: u64,
    pub create_secs: u64,
    pub export_secs: u64,
    pub extract_secs: u64,
    pub probe_secs: u64,
    pub cleanup_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            pull_secs: 600,
            create_secs: 120,
            export_secs: 600,
            extract_secs: 300,
            probe_secs: 60,
            cleanup_secs: 120,
        }
    }
}

impl Timeouts {
    pub fn pull(&self) -> Duration {
        Duration::from_secs(self.pull_secs)
    }

    pub fn create(&self) -> Duration {
        Duration::from_secs(self.create_secs)
    }

    pub fn export(&self) -> Duration {
        Duration::from_secs(self.export_secs)
    }

    pub fn extract(&self) -> Duration {
        Duration::from_secs(self.extract_secs)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn cleanup(&self) -> Duration {
        Duration::from_secs(self.cleanup_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub engine_binary: String,
    pub working_dir: PathBuf,
    pub auth_file: Option<PathBuf>,
    pub keep_images: bool,
    pub min_free_space_gb: u64,
    pub timeouts: Timeouts,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            engine_binary: "podman".to_string(),
            working_dir: default_working_dir(),
            auth_file: None,
            keep_images: false,
            min_free_space_gb: 20,
            timeouts: Timeouts::default(),
        }
    }
}

impl AnalyzerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config: Self = if is_json {
            serde_json::from_str(&content)?
        } else if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&content)?
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine_binary.trim().is_empty() {
            return Err(ConfigError::Invalid("engine_binary must not be empty".to_string()));
        }
        let t = &self.timeouts;
        let all = [
            ("pull_secs", t.pull_secs),
            ("create_secs", t.create_secs),
            ("export_secs", t.export_secs),
            ("extract_secs", t.extract_secs),
            ("probe_secs", t.probe_secs),
            ("cleanup_secs", t.cleanup_secs),
        ];
        if let Some((name, _)) = all.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::Invalid(format!("timeouts.{name} must be greater than zero")));
        }
        Ok(())
    }
}

/// `<cache dir>/image-cgroup-audit`, or a relative directory when the
/// platform has no cache dir.
pub fn default_working_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("image-cgroup-audit"))
        .unwrap_or_else(|| PathBuf::from("image-cgroup-audit"))
}
