use crate::engine::EngineError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("Failed to create container: {0}")]
    Create(#[source] EngineError),

    #[error("Failed to export container: {0}")]
    Export(#[source] EngineError),

    #[error("Tar file was not created at {}", path.display())]
    MissingTarball { path: PathBuf },

    #[error("Tar file at {} is empty", path.display())]
    EmptyTarball { path: PathBuf },

    #[error("Tar extraction timed out after {timeout_secs}s")]
    ExtractionTimeout { timeout_secs: u64 },

    #[error("Tar extraction aborted")]
    ExtractionAborted,

    #[error("Failed to extract tar: {0}")]
    Extraction(String),

    #[error("Tar extraction produced no files")]
    EmptyExtraction,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MaterializeError>;
