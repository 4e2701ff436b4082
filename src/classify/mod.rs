//! Compatibility Classifier
//!
//! Decides whether a runtime version reads cgroup v2 resource limits
//! correctly. Pure rule evaluation over the version string and flavor.
//! Anything that cannot be parsed is incompatible.

use crate::types::{RuntimeFamily, RuntimeFlavor};
use std::num::IntErrorKind;
use tracing::trace;

/// Numeric components of a version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionComponents(Vec<u64>);

impl VersionComponents {
    /// Lenient Java parse: `-b` and `_` become separators and every
    /// component that is not purely digits is dropped. `None` when no
    /// numeric component remains.
    pub fn parse_lenient(version: &str) -> Option<Self> {
        let normalized = version.replace("-b", ".").replace('_', ".");
        let mut parts = Vec::new();
        for part in normalized.split('.') {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            parts.push(component(part)?);
        }
        (!parts.is_empty()).then_some(Self(parts))
    }

    /// Strict parse: every dot-separated component must be an integer.
    pub fn parse_strict(version: &str) -> Option<Self> {
        version
            .split('.')
            .map(component)
            .collect::<Option<Vec<_>>>()
            .map(Self)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Component `index`, or 0 when absent.
    pub fn get(&self, index: usize) -> u64 {
        self.0.get(index).copied().unwrap_or(0)
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }
}

/// One integer component. Values past `u64::MAX` saturate so they still
/// compare as large.
fn component(part: &str) -> Option<u64> {
    match part.parse::<u64>() {
        Ok(value) => Some(value),
        Err(err) if *err.kind() == IntErrorKind::PosOverflow => Some(u64::MAX),
        Err(_) => None,
    }
}

/// Java version after undoing the legacy `1.x` encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JavaVersion {
    pub major: u64,
    pub minor: u64,
    pub update: u64,
}

impl JavaVersion {
    pub fn from_components(parts: &VersionComponents) -> Self {
        if parts.get(0) == 1 && parts.len() > 1 {
            Self {
                major: parts.get(1),
                minor: parts.get(2),
                update: parts.get(3),
            }
        } else {
            Self {
                major: parts.get(0),
                minor: parts.get(1),
                update: parts.get(2),
            }
        }
    }
}

/// Verdict for one probed binary.
pub fn classify(family: RuntimeFamily, flavor: RuntimeFlavor, version: &str) -> bool {
    let verdict = match family {
        RuntimeFamily::Java => java_compatible(version, flavor),
        RuntimeFamily::Node => node_compatible(version),
        RuntimeFamily::DotNet => dotnet_compatible(version),
    };
    trace!("{} {} ({}) compatible: {}", family, version, flavor, verdict);
    verdict
}

/// Minimums: OpenJDK/HotSpot 8u372, 11.0.16, 15+; IBM Semeru 8u345;
/// IBM Java 8.0.7.15. Releases 9 through 14 never gained support.
pub fn java_compatible(version: &str, flavor: RuntimeFlavor) -> bool {
    let Some(parts) = VersionComponents::parse_lenient(version) else {
        return false;
    };
    let JavaVersion { major, minor, update } = JavaVersion::from_components(&parts);

    match major {
        // Also covers Semeru 17 and 18, whose own minimums are never reached.
        15.. => true,
        11 => minor > 0 || update >= 16,
        8 => match flavor {
            // The fourth raw component is the IBM fix pack level.
            RuntimeFlavor::IbmJava => minor > 0 || update > 7 || (update == 7 && parts.len() > 3 && parts.get(3) >= 15),
            RuntimeFlavor::IbmSemeru => update >= 345,
            _ => update >= 372,
        },
        9..=14 => false,
        _ => true,
    }
}

/// Minimum 20.3.0. The patch level is required but not compared.
pub fn node_compatible(version: &str) -> bool {
    let Some(parts) = VersionComponents::parse_strict(version) else {
        return false;
    };
    if parts.len() < 3 {
        return false;
    }
    let (major, minor) = (parts.get(0), parts.get(1));
    major > 20 || (major == 20 && minor >= 3)
}

/// .NET 5 and later.
pub fn dotnet_compatible(version: &str) -> bool {
    match VersionComponents::parse_strict(version) {
        Some(parts) if parts.len() >= 2 => parts.get(0) >= 5,
        _ => false,
    }
}
