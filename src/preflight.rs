//! Host checks run before a scan: engine availability and a usable working
//! directory

use crate::engine::{run_checked, EngineError};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const ENGINE_PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const ACL_TOOLS: [&str; 2] = ["setfacl", "getfacl"];
const WRITE_PROBE_DIR: &str = ".write_test";
const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("{0} not found in PATH. Please install {0}.")]
    EngineMissing(String),

    #[error("{engine} found but failed to report its version: {source}")]
    EngineVersion {
        engine: String,
        #[source]
        source: EngineError,
    },

    #[error("{engine} info failed: {source}")]
    EngineNotFunctional {
        engine: String,
        #[source]
        source: EngineError,
    },

    #[error("Cannot create directories in {}: {source}", path.display())]
    NotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Insufficient disk space: {free_gb:.1}GB free, but {required_gb}GB required")]
    InsufficientSpace { free_gb: f64, required_gb: u64 },

    #[error("Error checking disk space on {}: {reason}", path.display())]
    SpaceCheck { path: PathBuf, reason: String },

    #[error("{0} command not found. Install the acl package.")]
    AclToolMissing(&'static str),
}

/// Engine binary path and its `--version` line.
pub async fn check_engine(engine: &str) -> Result<String, PreflightError> {
    let path = which::which(engine).map_err(|_| PreflightError::EngineMissing(engine.to_string()))?;
    debug!("Found {} at {}", engine, path.display());

    let output = run_checked(engine, &["--version".to_string()], ENGINE_PROBE_TIMEOUT)
        .await
        .map_err(|source| PreflightError::EngineVersion {
            engine: engine.to_string(),
            source,
        })?;

    let version = output.stdout.trim().to_string();
    info!("✓ {} is installed: {}", engine, version);
    Ok(version)
}

/// Ask the engine for host info. Returns the host OS when the JSON has one.
pub async fn check_engine_functional(engine: &str) -> Result<Option<String>, PreflightError> {
    let args: Vec<String> = ["info", "--format", "json"].iter().map(|s| s.to_string()).collect();
    let output = run_checked(engine, &args, ENGINE_PROBE_TIMEOUT)
        .await
        .map_err(|source| PreflightError::EngineNotFunctional {
            engine: engine.to_string(),
            source,
        })?;

    let host_os = host_os(&output.stdout);
    info!(
        "✓ {} is functional (OS: {})",
        engine,
        host_os.as_deref().unwrap_or("unknown")
    );
    Ok(host_os)
}

fn host_os(info_json: &str) -> Option<String> {
    let info: serde_json::Value = serde_json::from_str(info_json).ok()?;
    info.get("host")?.get("os")?.as_str().map(str::to_string)
}

/// Verify `base` can hold a working root: writable, enough free space, and
/// ACL tools available for cleaning up extracted trees.
pub fn check_working_root(base: &Path, min_free_gb: u64) -> Result<(), PreflightError> {
    check_writable(base)?;
    info!("✓ Write permission verified on {}", base.display());

    let free = free_bytes(base)?;
    let free_gb = free as f64 / GIB as f64;
    if free < min_free_gb.saturating_mul(GIB) {
        return Err(PreflightError::InsufficientSpace {
            free_gb,
            required_gb: min_free_gb,
        });
    }
    info!("✓ Sufficient disk space: {:.1}GB free (required: {}GB)", free_gb, min_free_gb);

    check_acl_tools()?;
    info!("✓ ACL tools available");
    Ok(())
}

fn check_writable(base: &Path) -> Result<(), PreflightError> {
    let not_writable = |source| PreflightError::NotWritable {
        path: base.to_path_buf(),
        source,
    };

    fs::create_dir_all(base).map_err(not_writable)?;
    let probe = base.join(WRITE_PROBE_DIR);
    if probe.exists() {
        fs::remove_dir(&probe).map_err(not_writable)?;
    }
    fs::create_dir(&probe).map_err(not_writable)?;
    fs::remove_dir(&probe).map_err(not_writable)
}

pub fn check_acl_tools() -> Result<(), PreflightError> {
    for tool in ACL_TOOLS {
        which::which(tool).map_err(|_| PreflightError::AclToolMissing(tool))?;
    }
    Ok(())
}

#[cfg(unix)]
#[allow(clippy::unnecessary_cast)]
fn free_bytes(path: &Path) -> Result<u64, PreflightError> {
    let stat = nix::sys::statvfs::statvfs(path).map_err(|err| PreflightError::SpaceCheck {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    Ok(stat.blocks_available() as u64 * stat.fragment_size() as u64)
}

#[cfg(not(unix))]
fn free_bytes(path: &Path) -> Result<u64, PreflightError> {
    Err(PreflightError::SpaceCheck {
        path: path.to_path_buf(),
        reason: "free space check is only supported on unix".to_string(),
    })
}
