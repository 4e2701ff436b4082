//! Binary Locator: find interpreter launchers in an extracted image tree
//!
//! Pure filesystem traversal, no processes. Symlinked directories are
//! followed as long as they resolve inside the tree, and every candidate is
//! deduplicated by its fully resolved location so that aliases of one
//! interpreter are probed once.

pub mod resolve;

use crate::types::{BinaryCandidate, RuntimeFamily};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Container path prefixes that hold name matches which are never
/// interpreters: alternatives bookkeeping and shell completion scripts.
pub const EXCLUDED_PREFIXES: [&str; 5] = [
    "/var/lib/alternatives/",
    "/var/lib/dpkg/alternatives/",
    "/etc/alternatives/",
    "/usr/share/bash-completion/",
    "/etc/bash_completion.d/",
];

/// Container path fragments that mark runtime caches.
pub const EXCLUDED_FRAGMENTS: [&str; 1] = ["/.dotnet/optimizationdata/"];

pub fn is_excluded(container_path: &str) -> bool {
    EXCLUDED_PREFIXES
        .iter()
        .any(|prefix| container_path.starts_with(prefix))
        || EXCLUDED_FRAGMENTS
            .iter()
            .any(|fragment| container_path.contains(fragment))
}

/// Root-anchored container path for a root-relative path.
pub fn container_path(relative: &Path) -> String {
    let relative = relative.to_string_lossy();
    format!("/{}", relative.trim_start_matches('/'))
}

pub struct BinaryLocator {
    root: PathBuf,
}

impl BinaryLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Candidates of `family`, in traversal order, one per real binary.
    pub fn locate(&self, family: RuntimeFamily) -> Vec<BinaryCandidate> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for relative in self.walk() {
            let matched = container_path(&relative);
            if !family.matches_path(&matched) {
                continue;
            }

            let Some(target) = self.binary_target(&relative) else {
                continue;
            };
            let probe_path = container_path(&target);

            if is_excluded(&matched) || is_excluded(&probe_path) {
                debug!("Skipping excluded path: {}", matched);
                continue;
            }

            let Some(real) = resolve::resolve_in_root(&self.root, &target) else {
                continue;
            };
            if !seen.insert(real.clone()) {
                continue;
            }

            debug!("Found {} candidate {} ({})", family, probe_path, real.display());
            candidates.push(BinaryCandidate {
                container_path: probe_path,
                resolved_path: real,
            });
        }

        candidates
    }

    /// The root-relative path to execute for a name match: the link's own
    /// target when that is a regular file, else the match itself when it
    /// resolves to a regular file.
    fn binary_target(&self, relative: &Path) -> Option<PathBuf> {
        let meta = fs::symlink_metadata(resolve::host_path(&self.root, relative)?).ok()?;

        if meta.file_type().is_symlink() {
            if let Some(target) = resolve::read_link_once(&self.root, relative) {
                if resolve::is_regular_file(&self.root, &target) {
                    return Some(target);
                }
            }
            return resolve::is_regular_file(&self.root, relative).then(|| relative.to_path_buf());
        }

        meta.is_file().then(|| relative.to_path_buf())
    }

    /// Root-relative paths of every non-directory entry, following symlinked
    /// directories that stay inside the root. Each resolved directory is
    /// entered through a link at most once, which also breaks link cycles.
    fn walk(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut queue: VecDeque<(PathBuf, PathBuf)> = VecDeque::new();
        queue.push_back((self.root.clone(), PathBuf::new()));

        while let Some((dir, prefix)) = queue.pop_front() {
            let walker = WalkDir::new(&dir)
                .min_depth(1)
                .follow_links(false)
                .sort_by_file_name();

            for entry in walker.into_iter().filter_map(|e| e.ok()) {
                let Ok(suffix) = entry.path().strip_prefix(&dir) else {
                    continue;
                };
                let relative = prefix.join(suffix);
                let file_type = entry.file_type();

                if file_type.is_dir() {
                    continue;
                }

                if file_type.is_symlink() {
                    if let Some(target) = resolve::resolve_directory(&self.root, &relative) {
                        if visited.insert(target.clone()) {
                            queue.push_back((target, relative));
                        }
                        continue;
                    }
                }

                found.push(relative);
            }
        }

        found
    }
}

/// Shorthand for `BinaryLocator::new(root).locate(family)`.
pub fn locate(root: &Path, family: RuntimeFamily) -> Vec<BinaryCandidate> {
    BinaryLocator::new(root).locate(family)
}
