//! Centralized configuration for tunebox.
//!
//! Fixed layout constants live in the `XxxConfig` tables. The naming grammar's
//! hand-maintained lists (known base checkpoints, reserved prefixes, prompt
//! rewrites) are data in [`GrammarConfig`] so they can be loaded from a file.

use crate::error::{Result, TuneboxError};
use crate::persist::read_json;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Layout of the canonical image tree.
pub struct CatalogConfig;

impl CatalogConfig {
    pub const IMAGE_EXTENSION: &'static str = "png";
    /// Image file stems are the seed zero-padded to this many digits.
    pub const SEED_WIDTH: usize = 10;
    /// Width/height assumed when a settings segment does not name one.
    pub const DEFAULT_IMAGE_SIZE: u32 = 512;
    pub const DEFAULT_BATCH: u32 = 1;
}

/// Periodic rebuild settings.
pub struct RefreshConfig;

impl RefreshConfig {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);
    pub const MIN_INTERVAL: Duration = Duration::from_secs(1);
}

/// A literal substitution applied to prompts read from directory names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRewrite {
    pub from: String,
    pub to: String,
}

/// Inputs of the directory-name grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrammarConfig {
    /// Foundation checkpoints recognised as a `-`/`+` delimited name component.
    pub known_bases: Vec<String>,
    /// Model names starting with one of these are kept whole (no extras split).
    pub reserved_prefixes: Vec<String>,
    /// File whose presence marks a directory as a loadable checkpoint.
    pub checkpoint_sentinel: String,
    /// Prefixes stripped from numbered checkpoint directories.
    pub checkpoint_prefixes: Vec<String>,
    pub prompt_rewrites: Vec<PromptRewrite>,
}

impl Default for GrammarConfig {
    fn default() -> Self {
        Self {
            known_bases: ["f222v", "f222", "sd15", "sd21", "sd15inpaint", "inpainting"]
                .into_iter()
                .map(String::from)
                .collect(),
            reserved_prefixes: vec!["stable".to_string()],
            checkpoint_sentinel: "model_index.json".to_string(),
            checkpoint_prefixes: vec!["checkpoint-".to_string(), "save-".to_string()],
            prompt_rewrites: Vec::new(),
        }
    }
}

impl GrammarConfig {
    /// Load a grammar configuration from a JSON file.
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Option<Self> = read_json(path)?;
        let config = config.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_sentinel.trim().is_empty() {
            return Err(TuneboxError::Config {
                message: "checkpoint_sentinel must not be empty".to_string(),
            });
        }
        if let Some(base) = self
            .known_bases
            .iter()
            .find(|b| b.is_empty() || b.contains(['-', '+', '/']))
        {
            return Err(TuneboxError::Config {
                message: format!("known base {base:?} must be a single name component"),
            });
        }
        if self.prompt_rewrites.iter().any(|r| r.from.is_empty()) {
            return Err(TuneboxError::Config {
                message: "prompt rewrite with empty `from`".to_string(),
            });
        }
        Ok(())
    }

    pub fn is_known_base(&self, component: &str) -> bool {
        self.known_bases.iter().any(|b| b == component)
    }

    pub fn has_reserved_prefix(&self, name: &str) -> bool {
        self.reserved_prefixes
            .iter()
            .any(|p| !p.is_empty() && name.starts_with(p.as_str()))
    }

    /// Apply the configured prompt rewrites in order.
    pub fn rewrite_prompt(&self, prompt: &str) -> String {
        self.prompt_rewrites
            .iter()
            .fold(prompt.to_string(), |acc, r| acc.replace(&r.from, &r.to))
    }
}
