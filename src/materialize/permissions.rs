//! Make extracted trees readable and deletable by the operating user
//!
//! Image content arrives with its original modes, often root-owned
//! directories without write bits, plus whatever ACLs the filesystem applies.

use crate::engine::run_command;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tokio::task;
use tracing::{debug, warn};

/// Recursively grant the owner `rwX`, like `chmod -R u+rwX`.
///
/// Directories are fixed before they are listed so that a `0000` directory
/// does not hide its children. Symlinks are never followed. Returns the
/// number of entries whose mode could not be changed.
pub fn relax_permissions(root: &Path) -> usize {
    let mut failures = 0;
    let mut pending = vec![root.to_path_buf()];

    while let Some(path) = pending.pop() {
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(_) => {
                failures += 1;
                continue;
            }
        };
        let file_type = meta.file_type();
        if file_type.is_symlink() {
            continue;
        }

        if !grant_owner(&path, &meta) {
            failures += 1;
        }

        if file_type.is_dir() {
            match fs::read_dir(&path) {
                Ok(entries) => pending.extend(entries.filter_map(|e| e.ok()).map(|e| e.path())),
                Err(_) => failures += 1,
            }
        }
    }

    if failures > 0 {
        debug!("Could not relax permissions on {} entries under {}", failures, root.display());
    }
    failures
}

/// [`relax_permissions`] on the blocking pool.
pub async fn relax_tree(root: &Path) {
    let root = root.to_path_buf();
    if let Err(err) = task::spawn_blocking(move || relax_permissions(&root)).await {
        warn!("Permission relaxation task failed: {}", err);
    }
}

#[cfg(unix)]
fn grant_owner(path: &Path, meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;

    let mode = meta.permissions().mode();
    let mut wanted = mode | 0o600;
    if meta.is_dir() || mode & 0o111 != 0 {
        wanted |= 0o100;
    }
    if wanted == mode {
        return true;
    }
    fs::set_permissions(path, fs::Permissions::from_mode(wanted)).is_ok()
}

#[cfg(not(unix))]
fn grant_owner(path: &Path, meta: &fs::Metadata) -> bool {
    let mut permissions = meta.permissions();
    if !permissions.readonly() {
        return true;
    }
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions).is_ok()
}

/// Strip access-control entries recursively with `setfacl -R -b`.
///
/// Best effort: hosts without ACL tooling simply skip this step.
pub async fn strip_acls(root: &Path, timeout: Duration) {
    let setfacl = match which::which("setfacl") {
        Ok(path) => path,
        Err(_) => {
            debug!("setfacl not found, skipping ACL removal");
            return;
        }
    };

    let args = vec![
        "-R".to_string(),
        "-b".to_string(),
        root.to_string_lossy().into_owned(),
    ];
    match run_command(&setfacl.to_string_lossy(), &args, timeout).await {
        Ok(output) if output.success() => {}
        Ok(output) => debug!("setfacl exited with {:?}: {}", output.code, output.stderr.trim()),
        Err(err) => debug!("setfacl failed: {}", err),
    }
}

/// Remove a directory tree even when the image left it locked down.
///
/// Relaxes permissions and ACLs first, then falls back to `rm -rf` if the
/// in-process removal still fails.
pub async fn force_remove_dir(path: &Path, timeout: Duration) -> std::io::Result<()> {
    if fs::symlink_metadata(path).is_err() {
        return Ok(());
    }

    relax_tree(path).await;
    strip_acls(path, timeout).await;

    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => return Ok(()),
        Err(err) => warn!("remove_dir_all({}) failed: {}, trying rm -rf", path.display(), err),
    }

    let args = vec!["-rf".to_string(), path.to_string_lossy().into_owned()];
    if let Err(err) = run_command("rm", &args, timeout).await {
        warn!("rm -rf {} failed: {}", path.display(), err);
    }

    if fs::symlink_metadata(path).is_ok() {
        Err(std::io::Error::other(format!(
            "{} still exists after forced removal",
            path.display()
        )))
    } else {
        Ok(())
    }
}
