//! Permissive TAR extraction of exported container filesystems

use super::error::{MaterializeError, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tar::Archive;
use tokio::task;
use tracing::debug;

const MAX_RECORDED_WARNINGS: usize = 20;

/// What an extraction run managed to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub unpacked: usize,
    pub skipped: usize,
    /// First few per-entry problems, for diagnostics.
    pub warnings: Vec<String>,
}

impl ExtractionReport {
    fn skip(&mut self, warning: String) {
        self.skipped += 1;
        if self.warnings.len() < MAX_RECORDED_WARNINGS {
            self.warnings.push(warning);
        }
    }
}

/// Extract `src` into `dest`, tolerating individual entries that fail.
///
/// Ownership, permissions and xattrs are not restored. Entries that cannot be
/// unpacked (unknown types, device nodes, permission errors, paths escaping
/// `dest`) are skipped and recorded. When `timeout` elapses the worker is told
/// to stop and awaited, so nothing is still writing into `dest` afterwards.
pub async fn extract_permissive(src: &Path, dest: &Path, timeout: Duration) -> Result<ExtractionReport> {
    let src = src.to_path_buf();
    let dest = dest.to_path_buf();
    let abort = Arc::new(AtomicBool::new(false));
    let worker_abort = Arc::clone(&abort);

    let mut worker = task::spawn_blocking(move || extract_sync(&src, &dest, &worker_abort));

    match tokio::time::timeout(timeout, &mut worker).await {
        Ok(joined) => joined.map_err(|e| MaterializeError::Extraction(format!("extraction task failed: {e}")))?,
        Err(_) => {
            abort.store(true, Ordering::Relaxed);
            let _ = worker.await;
            Err(MaterializeError::ExtractionTimeout {
                timeout_secs: timeout.as_secs(),
            })
        }
    }
}

fn extract_sync(src: &Path, dest: &Path, abort: &AtomicBool) -> Result<ExtractionReport> {
    let file = File::open(src)?;
    let mut archive = Archive::new(BufReader::new(file));
    archive.set_preserve_permissions(false);
    archive.set_preserve_ownerships(false);
    archive.set_preserve_mtime(false);
    archive.set_unpack_xattrs(false);
    archive.set_overwrite(true);

    std::fs::create_dir_all(dest)?;

    let mut report = ExtractionReport::default();
    // Directory entries are applied last so their modes cannot block
    // extraction of their children.
    let mut directories = Vec::new();

    let entries = archive
        .entries()
        .map_err(|e| MaterializeError::Extraction(e.to_string()))?;

    for entry in entries {
        if abort.load(Ordering::Relaxed) {
            return Err(MaterializeError::ExtractionAborted);
        }

        let mut entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                // A corrupt header ends the stream; keep what already landed.
                report.skip(format!("unreadable entry: {err}"));
                break;
            }
        };

        if entry.header().entry_type().is_dir() {
            directories.push(entry);
            continue;
        }

        let name = entry.path().map(|p| p.display().to_string()).unwrap_or_default();
        match entry.unpack_in(dest) {
            Ok(true) => report.unpacked += 1,
            Ok(false) => report.skip(format!("{name}: outside extraction root")),
            Err(err) => report.skip(format!("{name}: {err}")),
        }
    }

    for mut dir in directories.into_iter().rev() {
        let name = dir.path().map(|p| p.display().to_string()).unwrap_or_default();
        match dir.unpack_in(dest) {
            Ok(true) => report.unpacked += 1,
            Ok(false) => report.skip(format!("{name}: outside extraction root")),
            Err(err) => report.skip(format!("{name}: {err}")),
        }
    }

    debug!(
        "Unpacked {} entries, skipped {} ({} warnings recorded)",
        report.unpacked,
        report.skipped,
        report.warnings.len()
    );
    for warning in &report.warnings {
        debug!("tar: {}", warning);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tar::{Builder, EntryType, Header};

    fn append_file(builder: &mut Builder<File>, path: &str, body: &[u8], mode: u32) {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(body.len() as u64);
        header.set_mode(mode);
        builder.append_data(&mut header, path, body).unwrap();
    }

    fn append_dir(builder: &mut Builder<File>, path: &str, mode: u32) {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
        header.set_mode(mode);
        builder.append_data(&mut header, path, std::io::empty()).unwrap();
    }

    #[tokio::test]
    async fn extracts_tree_with_restrictive_directories() {
        let temp = tempfile::tempdir().unwrap();
        let tarball = temp.path().join("image.tar");
        let mut builder = Builder::new(File::create(&tarball).unwrap());
        append_dir(&mut builder, "opt/", 0o555);
        append_dir(&mut builder, "opt/jdk/", 0o555);
        append_file(&mut builder, "opt/jdk/java", b"#!/bin/sh\n", 0o755);
        append_file(&mut builder, "etc/os-release", b"ID=test\n", 0o644);
        builder.finish().unwrap();
        drop(builder);

        let dest = temp.path().join("extracted");
        let report = extract_permissive(&tarball, &dest, Duration::from_secs(30))
            .await
            .unwrap();

        assert!(dest.join("opt/jdk/java").is_file());
        assert!(dest.join("etc/os-release").is_file());
        assert_eq!(report.unpacked, 4);
        assert_eq!(report.skipped, 0);

        super::super::permissions::relax_permissions(&dest);
    }

    #[tokio::test]
    async fn non_tar_input_yields_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let bogus = temp.path().join("bogus.tar");
        std::fs::write(&bogus, b"this is not a tar archive at all").unwrap();

        let dest = temp.path().join("extracted");
        let report = extract_permissive(&bogus, &dest, Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(report.unpacked, 0);
        assert_eq!(report.skipped, 1);
        assert!(report.warnings[0].starts_with("unreadable entry"), "{:?}", report.warnings);
        assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn end_of_archive_only_extracts_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let tarball = temp.path().join("empty.tar");
        std::fs::write(&tarball, [0u8; 1024]).unwrap();

        let dest = temp.path().join("extracted");
        let report = extract_permissive(&tarball, &dest, Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(report, ExtractionReport::default());
    }

    #[tokio::test]
    async fn slow_extraction_times_out() {
        let temp = tempfile::tempdir().unwrap();
        let tarball = temp.path().join("large.tar");
        let mut builder = Builder::new(File::create(&tarball).unwrap());
        let body = vec![b'x'; 4096];
        for i in 0..2000 {
            append_file(&mut builder, &format!("usr/share/doc/file-{i}"), &body, 0o644);
        }
        builder.finish().unwrap();
        drop(builder);

        let dest = temp.path().join("extracted");
        let err = extract_permissive(&tarball, &dest, Duration::ZERO)
            .await
            .unwrap_err();

        assert!(matches!(err, MaterializeError::ExtractionTimeout { timeout_secs: 0 }), "{err}");
    }

    #[test]
    fn abort_flag_stops_extraction() {
        let temp = tempfile::tempdir().unwrap();
        let tarball = temp.path().join("image.tar");
        let mut builder = Builder::new(File::create(&tarball).unwrap());
        append_file(&mut builder, "usr/bin/node", b"x", 0o755);
        builder.finish().unwrap();
        drop(builder);

        let dest = temp.path().join("extracted");
        let err = extract_sync(&tarball, &dest, &AtomicBool::new(true)).unwrap_err();

        assert!(matches!(err, MaterializeError::ExtractionAborted));
        assert!(!dest.join("usr/bin/node").exists());
    }

    #[tokio::test]
    async fn missing_tarball_is_io_error() {
        let temp = tempfile::tempdir().unwrap();
        let err = extract_permissive(&temp.path().join("nope.tar"), &temp.path().join("out"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, MaterializeError::Io(_)));
    }
}
