//! Game configuration assembled from a TOML file and command-line overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tower_siege_system_navigator::NavigatorConfig;
use tower_siege_system_pursuit::PursuitConfig;
use tower_siege_world::{config, ConfigError, LevelConfig, WorldConfig};

/// Every tunable the command-line adapter understands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct GameConfig {
    /// Level generation parameters.
    pub(crate) level: LevelConfig,
    /// Navigator scheduling parameters.
    pub(crate) navigator: NavigatorConfig,
    /// Movement consumer parameters.
    pub(crate) pursuit: PursuitConfig,
}

impl GameConfig {
    /// Reads and parses a configuration file.
    pub(crate) fn load(path: &Path) -> Result<Self, ConfigError> {
        config::load(path)
    }

    /// Subset consumed by the world.
    pub(crate) fn world(&self) -> WorldConfig {
        WorldConfig {
            level: self.level,
            navigator: self.navigator,
        }
    }
}
