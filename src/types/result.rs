use super::{BinaryInfo, ImageReference, RuntimeFamily};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-image aggregate produced by one analysis.
///
/// Results are built inside the crate and handed out by value or by shared
/// reference only, so a result recorded in the ledger never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    image_name: String,
    image_id: Option<String>,
    java_binaries: Vec<BinaryInfo>,
    node_binaries: Vec<BinaryInfo>,
    dotnet_binaries: Vec<BinaryInfo>,
    error: Option<String>,
    analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub(crate) fn new(image: &ImageReference) -> Self {
        Self {
            image_name: image.name().to_string(),
            image_id: image.image_id().map(str::to_string),
            java_binaries: Vec::new(),
            node_binaries: Vec::new(),
            dotnet_binaries: Vec::new(),
            error: None,
            analyzed_at: Utc::now(),
        }
    }

    /// A result for a pipeline that did not complete. Binary lists are empty.
    pub(crate) fn failed(image: &ImageReference, error: impl Into<String>) -> Self {
        let mut result = Self::new(image);
        result.error = Some(error.into());
        result
    }

    pub(crate) fn push(&mut self, family: RuntimeFamily, binary: BinaryInfo) {
        match family {
            RuntimeFamily::Java => self.java_binaries.push(binary),
            RuntimeFamily::Node => self.node_binaries.push(binary),
            RuntimeFamily::DotNet => self.dotnet_binaries.push(binary),
        }
    }

    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    pub fn image_id(&self) -> Option<&str> {
        self.image_id.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn analyzed_at(&self) -> DateTime<Utc> {
        self.analyzed_at
    }

    pub fn binaries(&self, family: RuntimeFamily) -> &[BinaryInfo] {
        match family {
            RuntimeFamily::Java => &self.java_binaries,
            RuntimeFamily::Node => &self.node_binaries,
            RuntimeFamily::DotNet => &self.dotnet_binaries,
        }
    }

    pub fn has_binaries(&self) -> bool {
        RuntimeFamily::ALL
            .iter()
            .any(|family| !self.binaries(*family).is_empty())
    }

    pub fn report(&self, family: RuntimeFamily) -> FamilyReport<'_> {
        FamilyReport {
            binaries: self.binaries(family),
        }
    }
}

/// Aggregate compatibility of every binary of one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompatibilityStatus {
    Yes,
    No,
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl fmt::Display for CompatibilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompatibilityStatus::Yes => "Yes",
            CompatibilityStatus::No => "No",
            CompatibilityStatus::NotApplicable => "N/A",
        })
    }
}

/// Report-column view over one family's binaries.
#[derive(Debug, Clone, Copy)]
pub struct FamilyReport<'a> {
    binaries: &'a [BinaryInfo],
}

impl FamilyReport<'_> {
    /// Semicolon-joined container paths, `None` when nothing was found.
    pub fn found(&self) -> String {
        self.join(|binary| binary.path.as_str())
    }

    /// Semicolon-joined versions, `None` when nothing was found.
    pub fn versions(&self) -> String {
        self.join(|binary| binary.version.as_str())
    }

    /// `Some(true)` iff every binary is compatible; `None` if there are none.
    pub fn all_compatible(&self) -> Option<bool> {
        if self.binaries.is_empty() {
            None
        } else {
            Some(self.binaries.iter().all(|binary| binary.is_compatible))
        }
    }

    pub fn compatible(&self) -> CompatibilityStatus {
        match self.all_compatible() {
            Some(true) => CompatibilityStatus::Yes,
            Some(false) => CompatibilityStatus::No,
            None => CompatibilityStatus::NotApplicable,
        }
    }

    fn join(&self, field: fn(&BinaryInfo) -> &str) -> String {
        if self.binaries.is_empty() {
            return "None".to_string();
        }
        self.binaries
            .iter()
            .map(field)
            .collect::<Vec<_>>()
            .join("; ")
    }
}
