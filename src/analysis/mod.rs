//! Analysis Cache & Ledger: drives one image through the pipeline,
//! memoizes the result, and always cleans up afterwards

pub mod analyzer;
pub mod error;
pub mod ledger;

pub use analyzer::ImageAnalyzer;
pub use error::AnalysisError;
pub use ledger::AnalysisLedger;

use std::fmt;
use tracing::debug;

/// Progress of a single `analyze` call.
///
/// Stages only move forward. A failure at any point jumps straight to
/// `Cleaned`, since cleanup runs on every exit path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnalysisStage {
    Idle,
    Pulled,
    Materialized,
    Located,
    Probed,
    Classified,
    Cleaned,
}

impl AnalysisStage {
    pub fn advance(&mut self, next: AnalysisStage) {
        debug_assert!(next > *self, "stage {} cannot move to {}", self, next);
        debug!("Analysis stage: {} -> {}", self, next);
        *self = next;
    }

    pub fn is_terminal(self) -> bool {
        self == AnalysisStage::Cleaned
    }
}

impl fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnalysisStage::Idle => "idle",
            AnalysisStage::Pulled => "pulled",
            AnalysisStage::Materialized => "materialized",
            AnalysisStage::Located => "located",
            AnalysisStage::Probed => "probed",
            AnalysisStage::Classified => "classified",
            AnalysisStage::Cleaned => "cleaned",
        };
        f.write_str(name)
    }
}
