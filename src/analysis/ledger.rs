use crate::types::{AnalysisResult, ImageReference};
use std::collections::HashMap;
use tracing::debug;

/// Results of one scan, keyed by image identity.
///
/// Entries are write-once: the first result recorded for a key is the one
/// every later lookup sees.
#[derive(Debug, Clone, Default)]
pub struct AnalysisLedger {
    entries: HashMap<String, AnalysisResult>,
}

impl AnalysisLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, image: &ImageReference) -> Option<&AnalysisResult> {
        self.entries.get(image.cache_key())
    }

    pub fn contains(&self, image: &ImageReference) -> bool {
        self.entries.contains_key(image.cache_key())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnalysisResult)> {
        self.entries.iter().map(|(key, result)| (key.as_str(), result))
    }

    /// Store `result` unless the key already has one. Returns the stored
    /// result either way.
    pub fn record(&mut self, image: &ImageReference, result: AnalysisResult) -> &AnalysisResult {
        let key = image.cache_key().to_string();
        if self.entries.contains_key(&key) {
            debug!("Ledger already holds a result for {}, keeping it", key);
        }
        self.entries.entry(key).or_insert(result)
    }

    /// Fold another worker's ledger into this one. Keys present here win.
    pub fn merge(&mut self, other: AnalysisLedger) {
        for (key, result) in other.entries {
            self.entries.entry(key).or_insert(result);
        }
    }

    pub fn into_results(self) -> Vec<AnalysisResult> {
        self.entries.into_values().collect()
    }
}
