//! Registry Fetcher: makes an image available in local engine storage

use crate::engine::{ContainerEngine, EngineError};
use crate::types::ImageReference;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to pull image: {source}")]
    Pull {
        image: String,
        #[source]
        source: EngineError,
    },
}

pub struct RegistryFetcher {
    engine: Arc<dyn ContainerEngine>,
    auth_file: Option<PathBuf>,
    timeout: Duration,
}

impl RegistryFetcher {
    /// An `auth_file` that does not exist is dropped with a warning so the
    /// pull proceeds anonymously.
    pub fn new(engine: Arc<dyn ContainerEngine>, auth_file: Option<PathBuf>, timeout: Duration) -> Self {
        let auth_file = auth_file.filter(|path| {
            let exists = path.exists();
            if !exists {
                warn!("Auth file {} does not exist, pulling without credentials", path.display());
            }
            exists
        });

        Self {
            engine,
            auth_file,
            timeout,
        }
    }

    pub fn auth_file(&self) -> Option<&Path> {
        self.auth_file.as_deref()
    }

    /// Pull once; failures are returned, never retried.
    pub async fn fetch(&self, image: &ImageReference) -> Result<(), FetchError> {
        info!("Pulling image: {}", image.name());
        self.engine
            .pull(image.name(), self.auth_file(), self.timeout)
            .await
            .map_err(|source| FetchError::Pull {
                image: image.name().to_string(),
                source,
            })
    }
}
