use std::path::Path;

use fieldbind_api::tag::{self, DEFAULT_PRIORITY_TAGS};
use serde::Deserialize;

use crate::error::EngineError;

/// Binder configuration, parsed from TOML.
///
/// ```toml
/// name = "orm"
/// priority_tags = ["orm", "json"]
/// fuzzy_match = true
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BindConfig {
    /// Label attached to log output.
    #[serde(default = "default_name")]
    pub name: String,

    /// Tags consulted after any per-call tags, highest priority first.
    #[serde(default = "default_priority_tags")]
    pub priority_tags: Vec<String>,

    /// Fall back to separator- and case-insensitive key matching.
    #[serde(default = "default_true")]
    pub fuzzy_match: bool,

    /// Decode string and byte sources holding a JSON object.
    #[serde(default = "default_true")]
    pub json_sources: bool,
}

fn default_name() -> String {
    "default".to_string()
}

fn default_priority_tags() -> Vec<String> {
    DEFAULT_PRIORITY_TAGS.iter().map(|t| t.to_string()).collect()
}

fn default_true() -> bool {
    true
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            priority_tags: default_priority_tags(),
            fuzzy_match: true,
            json_sources: true,
        }
    }
}

impl BindConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::parse(&content).map_err(|e| e.with_context(path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Per-call tags followed by the configured ones, duplicates dropped.
    pub fn effective_tags(&self, call_tags: &[String]) -> Vec<String> {
        let mut tags: Vec<String> = Vec::with_capacity(call_tags.len() + self.priority_tags.len());
        for candidate in call_tags.iter().chain(&self.priority_tags) {
            for tag in tag::split_tags(candidate) {
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
        }
        tags
    }
}
