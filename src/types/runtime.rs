use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Version string reported when a probe yields no parseable token.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Language runtime families whose interpreters are inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeFamily {
    Java,
    Node,
    DotNet,
}

impl RuntimeFamily {
    pub const ALL: [RuntimeFamily; 3] = [RuntimeFamily::Java, RuntimeFamily::Node, RuntimeFamily::DotNet];

    /// File name of the interpreter launcher.
    pub fn binary_name(self) -> &'static str {
        match self {
            RuntimeFamily::Java => "java",
            RuntimeFamily::Node => "node",
            RuntimeFamily::DotNet => "dotnet",
        }
    }

    /// Flag that makes the interpreter print its version banner.
    pub fn version_flag(self) -> &'static str {
        match self {
            RuntimeFamily::Java => "-version",
            RuntimeFamily::Node | RuntimeFamily::DotNet => "--version",
        }
    }

    /// Whether a root-anchored container path names this family's launcher.
    pub fn matches_path(self, container_path: &str) -> bool {
        container_path
            .strip_suffix(self.binary_name())
            .is_some_and(|head| head.ends_with('/'))
    }
}

impl fmt::Display for RuntimeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimeFamily::Java => "Java",
            RuntimeFamily::Node => "Node.js",
            RuntimeFamily::DotNet => ".NET",
        };
        f.write_str(name)
    }
}

/// Runtime distribution inferred from a version banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuntimeFlavor {
    #[serde(rename = "IBM Semeru")]
    IbmSemeru,
    #[serde(rename = "IBM Java")]
    IbmJava,
    #[serde(rename = "OpenJDK")]
    OpenJdk,
    #[serde(rename = "HotSpot")]
    HotSpot,
    #[serde(rename = "NodeJS")]
    NodeJs,
    #[serde(rename = ".NET")]
    DotNet,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl fmt::Display for RuntimeFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimeFlavor::IbmSemeru => "IBM Semeru",
            RuntimeFlavor::IbmJava => "IBM Java",
            RuntimeFlavor::OpenJdk => "OpenJDK",
            RuntimeFlavor::HotSpot => "HotSpot",
            RuntimeFlavor::NodeJs => "NodeJS",
            RuntimeFlavor::DotNet => ".NET",
            RuntimeFlavor::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// An interpreter found in an extracted image tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryCandidate {
    /// Root-anchored path inside the image; this is what gets executed.
    pub container_path: String,
    /// Fully resolved location inside the extracted tree, used for dedup.
    pub resolved_path: PathBuf,
}

/// Outcome of running a candidate with its version flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeProbeResult {
    pub version: String,
    pub raw_output: String,
    pub flavor: RuntimeFlavor,
}

impl RuntimeProbeResult {
    pub fn is_unknown(&self) -> bool {
        self.version == UNKNOWN_VERSION
    }
}

/// One discovered interpreter with its probe outcome and verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryInfo {
    pub path: String,
    pub resolved_path: PathBuf,
    pub version: String,
    pub version_output: String,
    pub runtime_type: RuntimeFlavor,
    pub is_compatible: bool,
}

impl BinaryInfo {
    pub fn new(candidate: BinaryCandidate, probe: RuntimeProbeResult, is_compatible: bool) -> Self {
        Self {
            path: candidate.container_path,
            resolved_path: candidate.resolved_path,
            version: probe.version,
            version_output: probe.raw_output,
            runtime_type: probe.flavor,
            is_compatible,
        }
    }
}
