//! Path resolution confined to an extracted root
//!
//! Symlinks inside an image are interpreted as the container would see them:
//! absolute targets start at the extracted root and `..` never climbs above
//! it. Nothing here touches the host filesystem outside `root`.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Maximum symlink hops before giving up, as in the Linux kernel.
pub const MAX_LINK_HOPS: usize = 40;

fn components(path: &Path) -> VecDeque<OsString> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_os_string()),
            Component::ParentDir => Some(OsString::from("..")),
            _ => None,
        })
        .collect()
}

fn join(root: &Path, parts: &[OsString]) -> PathBuf {
    let mut path = root.to_path_buf();
    path.extend(parts);
    path
}

/// Normalize `..` lexically without leaving the root.
pub fn normalize(relative: &Path) -> PathBuf {
    let mut parts: Vec<OsString> = Vec::new();
    for part in components(relative) {
        if part == ".." {
            parts.pop();
        } else {
            parts.push(part);
        }
    }
    parts.iter().collect()
}

/// Fully resolve a root-relative path, following every symlink on the way.
///
/// Returns the host path of the final location, which may not exist.
/// `None` means a symlink loop or an unreadable link.
pub fn resolve_in_root(root: &Path, relative: &Path) -> Option<PathBuf> {
    let mut pending = components(relative);
    let mut resolved: Vec<OsString> = Vec::new();
    let mut hops = 0;

    while let Some(part) = pending.pop_front() {
        if part == ".." {
            resolved.pop();
            continue;
        }

        resolved.push(part);
        let host = join(root, &resolved);
        let is_link = fs::symlink_metadata(&host)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);
        if !is_link {
            continue;
        }

        hops += 1;
        if hops > MAX_LINK_HOPS {
            return None;
        }
        let target = fs::read_link(&host).ok()?;
        resolved.pop();
        if target.is_absolute() {
            resolved.clear();
        }
        let mut next = components(&target);
        next.extend(pending.drain(..));
        pending = next;
    }

    Some(join(root, &resolved))
}

/// Root-relative location of `relative` with every link in its parent
/// resolved. The final component is left untouched.
pub fn resolve_parent(root: &Path, relative: &Path) -> Option<PathBuf> {
    let name = relative.file_name()?;
    let parent = resolve_in_root(root, relative.parent().unwrap_or(Path::new("")))?;
    Some(parent.strip_prefix(root).ok()?.join(name))
}

/// Host path for inspecting the entry at `relative` itself, so that links in
/// its parent never reach the host filesystem.
pub fn host_path(root: &Path, relative: &Path) -> Option<PathBuf> {
    resolve_parent(root, relative).map(|real| root.join(real))
}

/// Resolve exactly one level of the symlink at `relative`, returning the
/// root-relative target.
pub fn read_link_once(root: &Path, relative: &Path) -> Option<PathBuf> {
    let real = resolve_parent(root, relative)?;
    let target = fs::read_link(root.join(&real)).ok()?;
    let joined = if target.is_absolute() {
        target
    } else {
        real.parent().unwrap_or(Path::new("")).join(target)
    };
    Some(normalize(&joined))
}

/// Whether `relative` resolves, inside the root, to a regular file.
pub fn is_regular_file(root: &Path, relative: &Path) -> bool {
    resolve_in_root(root, relative)
        .and_then(|host| fs::symlink_metadata(host).ok())
        .is_some_and(|meta| meta.is_file())
}

/// Host path of `relative` when it resolves, inside the root, to a directory.
pub fn resolve_directory(root: &Path, relative: &Path) -> Option<PathBuf> {
    let host = resolve_in_root(root, relative)?;
    let meta = fs::symlink_metadata(&host).ok()?;
    meta.is_dir().then_some(host)
}
