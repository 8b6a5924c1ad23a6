//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Settings an [`Engine`](crate::reactive::Engine) is created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Label used in log output.
    pub name: String,

    /// Initial state of the reaction gate. Starting disabled lets a host build
    /// its whole graph before anything reacts.
    pub reactions_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "weft".to_string(),
            reactions_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Parse a config from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_reactions_enabled(mut self, enabled: bool) -> Self {
        self.reactions_enabled = enabled;
        self
    }
}
