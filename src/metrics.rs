//! Per-step text metrics.
//!
//! Word/character counts and estimated reading time for every completed
//! step, plus a `source` entry, written as JSON after each step so progress
//! is inspectable while a run is in flight.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Average reading speed for whitespace-separated text.
const WORDS_PER_MINUTE: usize = 200;
/// Average reading speed for text without word boundaries (CJK).
const CHARS_PER_MINUTE: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMetrics {
    pub words: usize,
    pub chars: usize,
    pub reading_minutes: usize,
}

impl StepMetrics {
    pub fn for_text(text: &str) -> Self {
        let words = text.split_whitespace().count();
        let chars = text.chars().filter(|c| !c.is_whitespace()).count();
        // Texts without word boundaries read out near one "word" per line;
        // fall back to character pace when that is clearly what we have.
        let by_words = words.div_ceil(WORDS_PER_MINUTE);
        let by_chars = chars.div_ceil(CHARS_PER_MINUTE);
        let reading_minutes = if words * 10 < chars { by_chars } else { by_words };
        Self {
            words,
            chars,
            reading_minutes,
        }
    }
}

/// Metrics keyed by step name (plus `source`), persisted as a JSON map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(flatten)]
    entries: BTreeMap<String, StepMetrics>,
}

impl Metrics {
    pub fn load_or_default(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    pub fn record(&mut self, key: impl Into<String>, text: &str) {
        self.entries.insert(key.into(), StepMetrics::for_text(text));
    }

    pub fn get(&self, key: &str) -> Option<&StepMetrics> {
        self.entries.get(key)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
    }
}
