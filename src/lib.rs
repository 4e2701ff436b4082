//! Image cgroup audit - finds container images whose bundled language
//! runtimes misread resource limits under cgroup v2
//!
//! Each image is pulled, its filesystem exported and extracted, Java,
//! Node.js and .NET interpreters located in the tree, and every interpreter
//! run inside a sandboxed copy of the image to read its version. Versions
//! are then checked against per-runtime minimums.

pub mod analysis;
pub mod classify;
pub mod config;
pub mod engine;
pub mod fetch;
pub mod locate;
pub mod materialize;
pub mod preflight;
pub mod probe;
pub mod types;

pub use analysis::{AnalysisLedger, AnalysisStage, ImageAnalyzer};
pub use config::AnalyzerConfig;
pub use engine::{ContainerEngine, PodmanEngine};
pub use types::*;
