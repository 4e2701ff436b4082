use super::{AnalysisError, AnalysisLedger, AnalysisStage};
use crate::classify::classify;
use crate::config::{AnalyzerConfig, Timeouts};
use crate::engine::{ContainerEngine, PodmanEngine};
use crate::fetch::RegistryFetcher;
use crate::locate::BinaryLocator;
use crate::materialize::{FilesystemMaterializer, WorkingRoot};
use crate::probe::VersionProber;
use crate::types::{AnalysisResult, BinaryCandidate, BinaryInfo, ImageReference, RuntimeFamily};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One analysis pipeline bound to one working root.
///
/// `analyze` takes `&mut self`, so a single analyzer never has two analyses
/// sharing its working root. Run one analyzer per worker to scan in
/// parallel and merge their ledgers afterwards.
pub struct ImageAnalyzer {
    engine: Arc<dyn ContainerEngine>,
    fetcher: RegistryFetcher,
    materializer: FilesystemMaterializer,
    prober: VersionProber,
    ledger: AnalysisLedger,
    keep_images: bool,
    timeouts: Timeouts,
    last_stage: AnalysisStage,
}

impl ImageAnalyzer {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        working_root: WorkingRoot,
        config: &AnalyzerConfig,
        ledger: AnalysisLedger,
    ) -> Self {
        let timeouts = config.timeouts;
        Self {
            fetcher: RegistryFetcher::new(engine.clone(), config.auth_file.clone(), timeouts.pull()),
            materializer: FilesystemMaterializer::new(engine.clone(), working_root, timeouts),
            prober: VersionProber::new(engine.clone(), timeouts.probe()),
            engine,
            ledger,
            keep_images: config.keep_images,
            timeouts,
            last_stage: AnalysisStage::Idle,
        }
    }

    /// Analyzer driving the configured engine binary, with a fresh ledger.
    pub fn from_config(config: &AnalyzerConfig) -> std::io::Result<Self> {
        let engine: Arc<dyn ContainerEngine> = Arc::new(PodmanEngine::new(config.engine_binary.clone()));
        let working_root = WorkingRoot::create(&config.working_dir)?;
        Ok(Self::new(engine, working_root, config, AnalysisLedger::new()))
    }

    pub fn working_root(&self) -> &WorkingRoot {
        self.materializer.working_root()
    }

    pub fn ledger(&self) -> &AnalysisLedger {
        &self.ledger
    }

    pub fn into_ledger(self) -> AnalysisLedger {
        self.ledger
    }

    /// Result already recorded for `image`, without running anything.
    pub fn cached(&self, image: &ImageReference) -> Option<&AnalysisResult> {
        self.ledger.get(image)
    }

    /// Stage reached by the most recent analysis.
    pub fn last_stage(&self) -> AnalysisStage {
        self.last_stage
    }

    /// Analyze `image`, or return the result recorded for its identity.
    ///
    /// Never fails: pipeline errors, and panics below this point, become
    /// `AnalysisResult::error`. A panic during cleanup is logged and leaves
    /// the result unchanged. The working root is cleared and the image
    /// removed before returning, whatever happened.
    pub async fn analyze(&mut self, image: &ImageReference) -> AnalysisResult {
        if let Some(cached) = self.ledger.get(image) {
            info!("Using cached analysis for {}", image);
            return cached.clone();
        }

        info!("Analyzing image: {}", image);
        let mut stage = AnalysisStage::Idle;

        let outcome = AssertUnwindSafe(self.run_pipeline(image, &mut stage))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                warn!("Analysis of {} failed after stage {}: {}", image, stage, err);
                AnalysisResult::failed(image, err.to_string())
            }
            Err(panic) => {
                let err = AnalysisError::Panicked(panic_message(panic.as_ref()));
                warn!("Analysis of {} failed after stage {}: {}", image, stage, err);
                AnalysisResult::failed(image, err.to_string())
            }
        };

        if let Err(panic) = AssertUnwindSafe(self.cleanup(image)).catch_unwind().await {
            warn!("Cleanup after {} aborted unexpectedly: {}", image, panic_message(panic.as_ref()));
        }
        stage.advance(AnalysisStage::Cleaned);
        self.last_stage = stage;

        self.ledger.record(image, result).clone()
    }

    async fn run_pipeline(
        &self,
        image: &ImageReference,
        stage: &mut AnalysisStage,
    ) -> Result<AnalysisResult, AnalysisError> {
        self.fetcher.fetch(image).await?;
        stage.advance(AnalysisStage::Pulled);

        let extracted = self.materializer.materialize(image).await?;
        stage.advance(AnalysisStage::Materialized);

        let root = extracted.path().to_path_buf();
        let located = tokio::task::spawn_blocking(move || locate_all(BinaryLocator::new(root)))
            .await
            .map_err(|err| AnalysisError::Locate(err.to_string()))?;
        stage.advance(AnalysisStage::Located);

        let mut probed = Vec::new();
        for (family, candidates) in located {
            for candidate in candidates {
                let probe = self.prober.probe(image, &candidate, family).await;
                probed.push((family, candidate, probe));
            }
        }
        stage.advance(AnalysisStage::Probed);

        let mut result = AnalysisResult::new(image);
        for (family, candidate, probe) in probed {
            let is_compatible = classify(family, probe.flavor, &probe.version);
            info!(
                "  {} {}: {} ({}) - {}",
                if is_compatible { "✓" } else { "✗" },
                candidate.container_path,
                probe.version,
                probe.flavor,
                if is_compatible { "Compatible" } else { "Incompatible" }
            );
            result.push(family, BinaryInfo::new(candidate, probe, is_compatible));
        }
        stage.advance(AnalysisStage::Classified);

        Ok(result)
    }

    async fn cleanup(&self, image: &ImageReference) {
        let timeout = self.timeouts.cleanup();

        if let Err(err) = self.working_root().clear_transient(timeout).await {
            warn!("Failed to clean working root {}: {}", self.working_root().rootfs().display(), err);
        }

        if self.keep_images {
            debug!("Keeping image {}", image.name());
        } else {
            debug!("Removing image {}", image.name());
            if let Err(err) = self.engine.remove_image(image.name(), timeout).await {
                warn!("Failed to remove image {}: {}", image.name(), err);
            }
        }
    }
}

fn locate_all(locator: BinaryLocator) -> Vec<(RuntimeFamily, Vec<BinaryCandidate>)> {
    RuntimeFamily::ALL
        .iter()
        .map(|&family| {
            info!("Searching for {} binaries", family);
            let candidates = locator.locate(family);
            info!("Found {} {} binaries", candidates.len(), family);
            (family, candidates)
        })
        .collect()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
