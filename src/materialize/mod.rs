//! Filesystem Materializer: export an image's filesystem and extract it into
//! the working root for static inspection

pub mod error;
pub mod extract;
pub mod permissions;
pub mod working_root;

pub use error::MaterializeError;
pub use extract::{extract_permissive, ExtractionReport};
pub use working_root::WorkingRoot;

use crate::config::Timeouts;
use crate::engine::ContainerEngine;
use crate::types::ImageReference;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An extracted image tree inside the working root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRoot {
    path: PathBuf,
    report: ExtractionReport,
}

impl ExtractedRoot {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn report(&self) -> &ExtractionReport {
        &self.report
    }
}

pub struct FilesystemMaterializer {
    engine: Arc<dyn ContainerEngine>,
    working_root: WorkingRoot,
    timeouts: Timeouts,
}

impl FilesystemMaterializer {
    pub fn new(engine: Arc<dyn ContainerEngine>, working_root: WorkingRoot, timeouts: Timeouts) -> Self {
        Self {
            engine,
            working_root,
            timeouts,
        }
    }

    pub fn working_root(&self) -> &WorkingRoot {
        &self.working_root
    }

    /// Export `image` to the fixed tarball path and extract it.
    ///
    /// Every step clears its own target first, so a previous interrupted run
    /// never leaks into this one.
    pub async fn materialize(&self, image: &ImageReference) -> Result<ExtractedRoot, MaterializeError> {
        info!("Exporting container filesystem");
        let tarball = self.export(image).await?;

        info!("Extracting filesystem");
        let extracted = self
            .working_root
            .reset_extracted(self.timeouts.cleanup())
            .await?;

        let report = extract_permissive(&tarball, &extracted, self.timeouts.extract()).await?;

        // Whatever the tar recorded, make the tree inspectable and deletable.
        permissions::relax_tree(&extracted).await;
        permissions::strip_acls(&extracted, self.timeouts.cleanup()).await;

        // Success means something landed, whatever the per-entry warnings.
        if std::fs::read_dir(&extracted)?.next().is_none() {
            return Err(MaterializeError::EmptyExtraction);
        }
        if report.skipped > 0 {
            warn!(
                "Extraction skipped {} entries of {} ({} unpacked)",
                report.skipped,
                image.name(),
                report.unpacked
            );
        }
        debug!("Extraction complete: {} entries in {}", report.unpacked, extracted.display());

        Ok(ExtractedRoot {
            path: extracted,
            report,
        })
    }

    async fn export(&self, image: &ImageReference) -> Result<PathBuf, MaterializeError> {
        let tarball = self.working_root.tarball_path();
        self.working_root.reset_tarball()?;

        let container = self
            .engine
            .create(image.name(), self.timeouts.create())
            .await
            .map_err(MaterializeError::Create)?;

        let exported = self
            .engine
            .export(&container, &tarball, self.timeouts.export())
            .await;

        // The stopped container goes away whether or not the export worked.
        debug!("Removing container {}", container);
        if let Err(err) = self
            .engine
            .remove_container(&container, self.timeouts.cleanup())
            .await
        {
            warn!("Failed to remove container {}: {}", container, err);
        }

        exported.map_err(MaterializeError::Export)?;

        let size = match std::fs::metadata(&tarball) {
            Ok(meta) => meta.len(),
            Err(_) => return Err(MaterializeError::MissingTarball { path: tarball }),
        };
        if size == 0 {
            return Err(MaterializeError::EmptyTarball { path: tarball });
        }
        debug!("Tar created: {} ({} bytes)", tarball.display(), size);

        Ok(tarball)
    }
}
