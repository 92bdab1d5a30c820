//! Arena configuration
//!
//! Environment overrides:
//!
//! - `GENERALS_GRID_HEIGHT` / `GENERALS_GRID_WIDTH` (default: 10 x 10)
//! - `GENERALS_MAX_TURNS`        (default: 500)
//! - `GENERALS_MOUNTAIN_DENSITY` (default: 0.2)
//! - `GENERALS_CITY_DENSITY`     (default: 0.05)
//! - `GENERALS_REPLAY_DIR`       (default: unset, replays disabled)

use generals_core::{BridgeError, Result};
use generals_server::config::parse_var;
use std::env;
use std::path::PathBuf;

/// Army held by a neutral city when the map is generated
pub const CITY_GARRISON: u32 = 40;

/// Every owned cell grows by one army on turns divisible by this
pub const LAND_GROWTH_PERIOD: u32 = 25;

#[derive(Debug, Clone, PartialEq)]
pub struct ArenaConfig {
    pub height: usize,
    pub width: usize,
    /// Turn at which an undecided game is truncated
    pub max_turns: u32,
    pub mountain_density: f64,
    pub city_density: f64,
    /// Where `save_replay` writes; `None` disables replays
    pub replay_dir: Option<PathBuf>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            height: 10,
            width: 10,
            max_turns: 500,
            mountain_density: 0.2,
            city_density: 0.05,
            replay_dir: None,
        }
    }
}

impl ArenaConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            height: parse_var(&lookup, "GENERALS_GRID_HEIGHT", defaults.height)?,
            width: parse_var(&lookup, "GENERALS_GRID_WIDTH", defaults.width)?,
            max_turns: parse_var(&lookup, "GENERALS_MAX_TURNS", defaults.max_turns)?,
            mountain_density: parse_var(
                &lookup,
                "GENERALS_MOUNTAIN_DENSITY",
                defaults.mountain_density,
            )?,
            city_density: parse_var(&lookup, "GENERALS_CITY_DENSITY", defaults.city_density)?,
            replay_dir: lookup("GENERALS_REPLAY_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(2..=256).contains(&self.height) || !(2..=256).contains(&self.width) {
            return Err(BridgeError::Config(format!(
                "grid must be between 2x2 and 256x256, got {}x{}",
                self.height, self.width
            )));
        }
        if self.max_turns == 0 {
            return Err(BridgeError::Config("max_turns must be positive".into()));
        }
        let total = self.mountain_density + self.city_density;
        if !(0.0..=0.5).contains(&self.mountain_density)
            || !(0.0..=0.5).contains(&self.city_density)
            || total > 0.6
        {
            return Err(BridgeError::Config(format!(
                "densities out of range: mountains {}, cities {}",
                self.mountain_density, self.city_density
            )));
        }
        Ok(())
    }

    /// Minimum Manhattan distance between the two generals
    pub fn general_spacing(&self) -> usize {
        (self.height + self.width) / 2
    }
}
