use crate::fetch::FetchError;
use crate::materialize::MaterializeError;
use thiserror::Error;

/// Why a pipeline run stopped early. Only ever surfaced as the text of
/// `AnalysisResult::error`.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error("Binary search failed: {0}")]
    Locate(String),

    #[error("Analysis aborted unexpectedly: {0}")]
    Panicked(String),
}
