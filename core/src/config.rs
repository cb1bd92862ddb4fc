//! Core configuration.
//!
//! Loaded from a JSON file; every field has a default so a partial or
//! missing file is fine.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::profile::ProfileParams;
use crate::units::UnitPrefs;

/// Location name given to dives whose export carries no location.
pub const UNKNOWN_LOCATION: &str = "Unknown";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoreConfig {
    pub profile: ProfileParams,
    /// Units a new project starts with.
    pub default_units: UnitPrefs,
    pub background: BackgroundSettings,
    pub location_aliases: LocationAliases,
}

impl CoreConfig {
    /// Load config from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file absent, using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Canonical size the background image is resized to before embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackgroundSettings {
    pub width: u32,
    pub height: u32,
    /// JPEG quality (0-100)
    pub quality: u8,
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            quality: 85,
        }
    }
}

/// Spelling fixes applied to imported location names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationAliases(pub BTreeMap<String, String>);

impl Default for LocationAliases {
    fn default() -> Self {
        let mut aliases = BTreeMap::new();
        aliases.insert("Curaco".to_string(), "Curacao".to_string());
        Self(aliases)
    }
}

impl LocationAliases {
    /// Trim, apply aliases, and fall back to [`UNKNOWN_LOCATION`] when blank.
    pub fn normalize(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return UNKNOWN_LOCATION.to_string();
        }
        self.0
            .get(trimmed)
            .cloned()
            .unwrap_or_else(|| trimmed.to_string())
    }
}
