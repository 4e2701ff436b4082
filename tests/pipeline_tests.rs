//! End-to-end analysis runs against a scripted container engine

use async_trait::async_trait;
use image_cgroup_audit::engine::{ContainerEngine, EngineError, ProbeInvocation, ProbeOutput};
use image_cgroup_audit::materialize::WorkingRoot;
use image_cgroup_audit::{
    AnalysisLedger, AnalysisStage, AnalyzerConfig, CompatibilityStatus, ImageAnalyzer, ImageReference, RuntimeFamily,
    RuntimeFlavor,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const JAVA_BANNER: &str = "openjdk version \"11.0.16\" 2022-07-19\n\
    OpenJDK Runtime Environment Temurin-11.0.16+8 (build 11.0.16+8)\n";

/// What the fake `export` leaves at the tarball path.
#[derive(Default, Clone, Copy)]
enum Export {
    #[default]
    Image,
    Fail,
    ZeroBytes,
    /// Only the two zero blocks that end an archive.
    EndOfArchive,
    /// Reports success without writing anything.
    Nothing,
}

#[derive(Default)]
struct FakeEngine {
    calls: Mutex<Vec<String>>,
    fail_pull: bool,
    export: Export,
    probe_timeout: bool,
    panic_on_probe: bool,
    panic_on_rmi: bool,
}

impl FakeEngine {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

fn failure(command: &str) -> EngineError {
    EngineError::Failed {
        command: command.to_string(),
        code: 125,
        stderr: "Error: simulated failure".to_string(),
    }
}

/// A small image: one JDK reachable through two aliases, an alternatives
/// entry, and a Node binary.
fn write_image_tar(dest: &Path) -> std::io::Result<()> {
    let file = std::fs::File::create(dest)?;
    let mut builder = tar::Builder::new(file);

    fn add_file(builder: &mut tar::Builder<std::fs::File>, path: &str) -> std::io::Result<()> {
        let data = b"#!/bin/sh\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        builder.append_data(&mut header, path, &data[..])
    }
    add_file(&mut builder, "opt/java/openjdk/bin/java")?;
    add_file(&mut builder, "usr/local/bin/node")?;

    for (path, target) in [
        ("usr/bin/java", "/opt/java/openjdk/bin/java"),
        ("etc/alternatives/java", "/opt/java/openjdk/bin/java"),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        builder.append_link(&mut header, path, target)?;
    }

    builder.finish()
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn pull(&self, image: &str, _auth_file: Option<&Path>, _timeout: Duration) -> Result<(), EngineError> {
        self.record(format!("pull {image}"));
        if self.fail_pull {
            return Err(failure("podman pull"));
        }
        Ok(())
    }

    async fn create(&self, image: &str, _timeout: Duration) -> Result<String, EngineError> {
        self.record(format!("create {image}"));
        Ok("c0ffee".to_string())
    }

    async fn export(&self, container: &str, dest: &Path, _timeout: Duration) -> Result<(), EngineError> {
        self.record(format!("export {container}"));
        match self.export {
            Export::Image => write_image_tar(dest).unwrap(),
            Export::Fail => return Err(failure("podman export")),
            Export::ZeroBytes => std::fs::write(dest, b"").unwrap(),
            Export::EndOfArchive => std::fs::write(dest, [0u8; 1024]).unwrap(),
            Export::Nothing => {}
        }
        Ok(())
    }

    async fn remove_container(&self, container: &str, _timeout: Duration) -> Result<(), EngineError> {
        self.record(format!("rm {container}"));
        Ok(())
    }

    async fn run_probe(&self, invocation: &ProbeInvocation, _timeout: Duration) -> Result<ProbeOutput, EngineError> {
        self.record(format!("run {} {}", invocation.entrypoint, invocation.args.join(" ")));
        if self.panic_on_probe {
            panic!("probe exploded");
        }
        if self.probe_timeout {
            return Ok(ProbeOutput {
                timed_out: true,
                ..ProbeOutput::default()
            });
        }

        let output = if invocation.entrypoint.ends_with("/java") {
            ProbeOutput {
                stderr: JAVA_BANNER.to_string(),
                exit_code: Some(0),
                ..ProbeOutput::default()
            }
        } else {
            ProbeOutput {
                stdout: "v18.17.1\n".to_string(),
                exit_code: Some(0),
                ..ProbeOutput::default()
            }
        };
        Ok(output)
    }

    async fn remove_image(&self, image: &str, _timeout: Duration) -> Result<(), EngineError> {
        self.record(format!("rmi {image}"));
        if self.panic_on_rmi {
            panic!("rmi exploded");
        }
        Ok(())
    }
}

fn analyzer(engine: FakeEngine) -> (ImageAnalyzer, Arc<FakeEngine>, TempDir) {
    analyzer_with(engine, AnalyzerConfig::default())
}

fn analyzer_with(engine: FakeEngine, mut config: AnalyzerConfig) -> (ImageAnalyzer, Arc<FakeEngine>, TempDir) {
    let temp = tempfile::tempdir().unwrap();
    config.working_dir = temp.path().to_path_buf();
    let engine = Arc::new(engine);
    let working_root = WorkingRoot::create(&config.working_dir).unwrap();
    let analyzer = ImageAnalyzer::new(engine.clone(), working_root, &config, AnalysisLedger::new());
    (analyzer, engine, temp)
}

#[tokio::test]
async fn test_analyze_reports_each_runtime() {
    let (mut analyzer, engine, _temp) = analyzer(FakeEngine::default());
    let image = ImageReference::new("quay.io/acme/orders:2.4");

    let result = analyzer.analyze(&image).await;

    assert_eq!(result.error(), None);
    let java = result.binaries(RuntimeFamily::Java);
    assert_eq!(java.len(), 1, "aliases of one JDK are probed once");
    assert_eq!(java[0].path, "/opt/java/openjdk/bin/java");
    assert_eq!(java[0].version, "11.0.16");
    assert_eq!(java[0].runtime_type, RuntimeFlavor::OpenJdk);
    assert!(java[0].is_compatible);

    let node = result.binaries(RuntimeFamily::Node);
    assert_eq!(node.len(), 1);
    assert_eq!(node[0].version, "18.17.1");
    assert!(!node[0].is_compatible);

    assert!(result.binaries(RuntimeFamily::DotNet).is_empty());

    let report = result.report(RuntimeFamily::Java);
    assert_eq!(report.found(), "/opt/java/openjdk/bin/java");
    assert_eq!(report.compatible(), CompatibilityStatus::Yes);
    assert_eq!(result.report(RuntimeFamily::Node).compatible(), CompatibilityStatus::No);
    assert_eq!(result.report(RuntimeFamily::DotNet).found(), "None");
    assert_eq!(result.report(RuntimeFamily::DotNet).compatible(), CompatibilityStatus::NotApplicable);

    assert_eq!(engine.count("run "), 2);
    assert!(engine
        .calls()
        .iter()
        .all(|c| !c.starts_with("run /etc/alternatives")));
    assert_eq!(engine.count("run /opt/java/openjdk/bin/java -version"), 1);
    assert_eq!(engine.count("run /usr/local/bin/node --version"), 1);
}

#[tokio::test]
async fn test_cleanup_after_success() {
    let (mut analyzer, engine, _temp) = analyzer(FakeEngine::default());
    let image = ImageReference::new("quay.io/acme/orders:2.4");

    analyzer.analyze(&image).await;

    assert!(!analyzer.working_root().has_transient_artifacts());
    assert!(analyzer.working_root().rootfs().is_dir());
    assert_eq!(analyzer.last_stage(), AnalysisStage::Cleaned);
    assert_eq!(engine.count("rm c0ffee"), 1);
    assert_eq!(engine.calls().last().map(String::as_str), Some("rmi quay.io/acme/orders:2.4"));
}

#[tokio::test]
async fn test_second_analysis_is_cached() {
    let (mut analyzer, engine, _temp) = analyzer(FakeEngine::default());
    let first = ImageReference::new("quay.io/acme/orders:2.4").with_image_id("sha256:1234");
    let same_id = ImageReference::new("quay.io/acme/orders@sha256:abcd").with_image_id("sha256:1234");

    let a = analyzer.analyze(&first).await;
    let b = analyzer.analyze(&first).await;
    let c = analyzer.analyze(&same_id).await;

    assert_eq!(engine.count("pull "), 1);
    assert_eq!(a, b);
    assert_eq!(a, c);
    assert_eq!(analyzer.ledger().len(), 1);
    assert!(analyzer.cached(&same_id).is_some());
}

#[tokio::test]
async fn test_pull_failure_still_cleans_up() {
    let (mut analyzer, engine, _temp) = analyzer(FakeEngine {
        fail_pull: true,
        ..FakeEngine::default()
    });
    let image = ImageReference::new("registry.invalid/missing:1");

    let result = analyzer.analyze(&image).await;

    let error = result.error().unwrap();
    assert!(error.contains("Failed to pull image"), "{error}");
    assert!(!result.has_binaries());
    assert_eq!(engine.count("create "), 0);
    assert_eq!(engine.count("rmi registry.invalid/missing:1"), 1);
    assert!(!analyzer.working_root().has_transient_artifacts());

    // Failures are memoized too.
    analyzer.analyze(&image).await;
    assert_eq!(engine.count("pull "), 1);
}

#[tokio::test]
async fn test_export_failure_removes_container() {
    let (mut analyzer, engine, _temp) = analyzer(FakeEngine {
        export: Export::Fail,
        ..FakeEngine::default()
    });

    let result = analyzer.analyze(&ImageReference::new("app:1")).await;

    assert!(result.error().unwrap().contains("Failed to export container"));
    assert_eq!(engine.count("rm c0ffee"), 1);
    assert_eq!(engine.count("run "), 0);
    assert!(!analyzer.working_root().has_transient_artifacts());
}

#[tokio::test]
async fn test_empty_tarball_is_an_error() {
    let (mut analyzer, _engine, _temp) = analyzer(FakeEngine {
        export: Export::ZeroBytes,
        ..FakeEngine::default()
    });

    let result = analyzer.analyze(&ImageReference::new("app:1")).await;

    assert!(result.error().unwrap().contains("is empty"));
    assert!(!analyzer.working_root().has_transient_artifacts());
}

#[tokio::test]
async fn test_archive_without_entries_is_an_error() {
    let (mut analyzer, engine, _temp) = analyzer(FakeEngine {
        export: Export::EndOfArchive,
        ..FakeEngine::default()
    });

    let result = analyzer.analyze(&ImageReference::new("app:1")).await;

    let error = result.error().unwrap();
    assert!(error.contains("produced no files"), "{error}");
    assert_eq!(engine.count("run "), 0);
    assert!(!analyzer.working_root().has_transient_artifacts());
}

#[tokio::test]
async fn test_missing_tarball_is_an_error() {
    let (mut analyzer, engine, _temp) = analyzer(FakeEngine {
        export: Export::Nothing,
        ..FakeEngine::default()
    });

    let result = analyzer.analyze(&ImageReference::new("app:1")).await;

    let error = result.error().unwrap();
    assert!(error.contains("was not created"), "{error}");
    assert_eq!(engine.count("rm c0ffee"), 1);
    assert_eq!(engine.count("rmi app:1"), 1);
}

#[tokio::test]
async fn test_probe_timeout_is_incompatible() {
    let (mut analyzer, _engine, _temp) = analyzer(FakeEngine {
        probe_timeout: true,
        ..FakeEngine::default()
    });

    let result = analyzer.analyze(&ImageReference::new("app:1")).await;

    assert_eq!(result.error(), None);
    for family in [RuntimeFamily::Java, RuntimeFamily::Node] {
        let binaries = result.binaries(family);
        assert_eq!(binaries.len(), 1);
        assert_eq!(binaries[0].version, "unknown");
        assert!(!binaries[0].is_compatible);
    }
    assert_eq!(result.binaries(RuntimeFamily::Java)[0].runtime_type, RuntimeFlavor::Unknown);
}

#[tokio::test]
async fn test_panic_becomes_error_result() {
    let (mut analyzer, engine, _temp) = analyzer(FakeEngine {
        panic_on_probe: true,
        ..FakeEngine::default()
    });

    let result = analyzer.analyze(&ImageReference::new("app:1")).await;

    let error = result.error().unwrap();
    assert!(error.contains("probe exploded"), "{error}");
    assert!(!result.has_binaries());
    assert!(!analyzer.working_root().has_transient_artifacts());
    assert_eq!(engine.count("rmi app:1"), 1);
    assert_eq!(analyzer.last_stage(), AnalysisStage::Cleaned);
}

#[tokio::test]
async fn test_panic_during_cleanup_keeps_result() {
    let (mut analyzer, engine, _temp) = analyzer(FakeEngine {
        panic_on_rmi: true,
        ..FakeEngine::default()
    });
    let image = ImageReference::new("quay.io/acme/orders:2.4");

    let result = analyzer.analyze(&image).await;

    assert_eq!(result.error(), None);
    assert_eq!(result.binaries(RuntimeFamily::Java).len(), 1);
    assert_eq!(analyzer.cached(&image), Some(&result));
    assert_eq!(analyzer.last_stage(), AnalysisStage::Cleaned);
    assert!(!analyzer.working_root().has_transient_artifacts());

    analyzer.analyze(&image).await;
    assert_eq!(engine.count("pull "), 1);
}

#[tokio::test]
async fn test_keep_images_skips_removal() {
    let config = AnalyzerConfig {
        keep_images: true,
        ..AnalyzerConfig::default()
    };
    let (mut analyzer, engine, _temp) = analyzer_with(FakeEngine::default(), config);

    analyzer.analyze(&ImageReference::new("app:1")).await;

    assert_eq!(engine.count("rmi "), 0);
    assert!(!analyzer.working_root().has_transient_artifacts());
}

#[tokio::test]
async fn test_stale_working_root_is_reset() {
    let (mut analyzer, _engine, _temp) = analyzer(FakeEngine::default());
    let extracted = analyzer.working_root().extracted_path();
    std::fs::create_dir_all(extracted.join("usr/bin")).unwrap();
    std::fs::write(extracted.join("usr/bin/dotnet"), b"stale").unwrap();

    let result = analyzer.analyze(&ImageReference::new("app:1")).await;

    assert!(result.binaries(RuntimeFamily::DotNet).is_empty());
    assert!(!analyzer.working_root().has_transient_artifacts());
}

#[tokio::test]
async fn test_worker_ledgers_merge() {
    let (mut first, _e1, _t1) = analyzer(FakeEngine::default());
    let (mut second, _e2, _t2) = analyzer(FakeEngine {
        fail_pull: true,
        ..FakeEngine::default()
    });
    let shared = ImageReference::new("app:1");

    first.analyze(&shared).await;
    second.analyze(&shared).await;
    second.analyze(&ImageReference::new("app:2")).await;

    let mut ledger = first.into_ledger();
    ledger.merge(second.into_ledger());

    assert_eq!(ledger.len(), 2);
    assert!(!ledger.get(&shared).unwrap().is_error());
}
