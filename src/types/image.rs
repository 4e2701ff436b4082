use serde::{Deserialize, Serialize};
use std::fmt;

/// A container image as supplied by the workload collector.
///
/// `name` is the pullable reference (registry/repo plus tag or digest).
/// `image_id` is the optional stronger identity (content digest or engine
/// image ID) and is preferred as the memoization key when present.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image_id: Option<String>,
}

impl ImageReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image_id: None,
        }
    }

    /// Attach a stronger identity. Blank identities are ignored.
    pub fn with_image_id(mut self, image_id: impl Into<String>) -> Self {
        let image_id = image_id.into();
        let trimmed = image_id.trim();
        self.image_id = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image_id(&self) -> Option<&str> {
        self.image_id.as_deref()
    }

    /// Identity used by the analysis ledger.
    pub fn cache_key(&self) -> &str {
        self.image_id.as_deref().unwrap_or(&self.name)
    }

    /// Parse one line of an image list: `reference [image-id]`, separated by
    /// whitespace. Blank lines and `#` comments yield `None`.
    pub fn from_list_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let mut fields = line.split_whitespace();
        let name = fields.next()?;
        let reference = Self::new(name);
        Some(match fields.next() {
            Some(id) => reference.with_image_id(id),
            None => reference,
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.image_id {
            Some(id) => write!(f, "{} ({id})", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}
