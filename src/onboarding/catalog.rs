//! Question catalog: the fixed, ordered list of onboarding steps.
//!
//! Loaded once at startup and shared read-only behind an `Arc`.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One onboarding question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub key: String,
    pub question: String,
}

impl CatalogEntry {
    pub fn new(key: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            question: question.into(),
        }
    }
}

/// Ordered, immutable list of questions. The index into it is a session's
/// progress cursor.
#[derive(Debug, Clone)]
pub struct QuestionCatalog {
    entries: Vec<CatalogEntry>,
}

impl QuestionCatalog {
    /// Build a catalog, rejecting empty lists, blank fields and duplicate keys.
    pub fn new(entries: Vec<CatalogEntry>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "catalog".to_string(),
                message: "catalog must contain at least one question".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.key.trim().is_empty() || entry.question.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "catalog".to_string(),
                    message: "catalog entries need a non-empty key and question".to_string(),
                });
            }
            if !seen.insert(entry.key.as_str()) {
                return Err(ConfigError::InvalidValue {
                    key: "catalog".to_string(),
                    message: format!("duplicate step key '{}'", entry.key),
                });
            }
        }

        Ok(Self { entries })
    }

    /// The brand-creation wizard's built-in questions.
    pub fn brand_default() -> Self {
        Self {
            entries: vec![
                CatalogEntry::new("brandName", "Hey! What's the name of your brand?"),
                CatalogEntry::new(
                    "brandInspiration",
                    "Have you seen any site which inspired you to start this brand?",
                ),
                CatalogEntry::new(
                    "brandCategory",
                    "If you had to pick a category for your brand, what would it be?",
                ),
                CatalogEntry::new(
                    "brandTone",
                    "How would you like your brand to sound — fun, professional, bold, or something else?",
                ),
                CatalogEntry::new(
                    "targetAudience",
                    "Who are you building this brand for? Tell us about your ideal customer.",
                ),
                CatalogEntry::new(
                    "socialPlatforms",
                    "Which social platforms do you think your audience hangs out on the most?",
                ),
                CatalogEntry::new("brandStory", "We'd love to hear your story — how did it all begin?"),
            ],
        }
    }

    /// Load a catalog from a JSON file of `[{"key": ..., "question": ...}]`.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let entries: Vec<CatalogEntry> =
            serde_json::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Self::new(entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CatalogEntry> {
        self.entries.get(index)
    }

    /// Whether `index` is past the last question.
    pub fn is_complete(&self, index: usize) -> bool {
        index >= self.entries.len()
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.key == key)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Entries strictly before `index`, in catalog order.
    pub fn before(&self, index: usize) -> &[CatalogEntry] {
        &self.entries[..index.min(self.entries.len())]
    }
}
