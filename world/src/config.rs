//! TOML-backed configuration for levels and the navigator.

use std::{fs, path::Path};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tower_siege_system_navigator::NavigatorConfig;

use crate::level::Projection;

/// Errors raised while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file {path}")]
    Io {
        /// Path that failed to load.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The configuration text is not valid TOML for the expected schema.
    #[error("failed to parse configuration")]
    Parse(#[from] toml::de::Error),
}

/// Parameters used to generate a level.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// Number of columns.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
    /// Seed driving biome generation.
    pub seed: u64,
    /// Mapping between cells and world space.
    pub projection: Projection,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            seed: 0x5eed,
            projection: Projection::default(),
        }
    }
}

/// Configuration consumed by [`crate::World::from_config`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Level generation parameters.
    pub level: LevelConfig,
    /// Navigator scheduling parameters.
    pub navigator: NavigatorConfig,
}

/// Parses any configuration section from TOML text.
pub fn from_toml_str<T: DeserializeOwned>(text: &str) -> Result<T, ConfigError> {
    Ok(toml::from_str(text)?)
}

/// Reads and parses a configuration file.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    from_toml_str(&text)
}
