//! Selective undo configuration

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SelectiveUndoError};

/// Tunables for conflict resolution and previews
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UndoConfig {
    /// Offer "keep the current code" among the alternatives of a conflicted chunk
    pub include_keep_current_alternative: bool,
    /// Follow conflicts of conflicting operations when building the rollback alternative
    pub expand_conflicts_transitively: bool,
    /// Upper bound on operations pulled into the rollback alternative
    pub max_conflict_expansion: usize,
    /// Lines of surrounding context shown around a chunk preview
    pub context_lines: usize,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            include_keep_current_alternative: true,
            expand_conflicts_transitively: true,
            max_conflict_expansion: 256,
            context_lines: 3,
        }
    }
}

impl UndoConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: UndoConfig = toml::from_str(content)
            .map_err(|e| SelectiveUndoError::config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded selective undo config from {:?}", path);
        Ok(config)
    }

    /// Render the config as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SelectiveUndoError::config(format!("cannot serialize config: {}", e)))
    }

    /// Check the values for consistency
    pub fn validate(&self) -> Result<()> {
        if self.max_conflict_expansion == 0 {
            return Err(SelectiveUndoError::config(
                "max_conflict_expansion must be greater than zero",
            ));
        }
        Ok(())
    }
}
