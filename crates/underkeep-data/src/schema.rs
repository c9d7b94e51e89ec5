//! Serde data file structs for game content definitions.
//!
//! These structs define the on-disk format of a game data file. Research is
//! referenced by snake_case name and resolved into engine types by the
//! loader.

use serde::Deserialize;
use underkeep_world::player::TimerConfig;
use underkeep_world::spell::SpellConfig;

// ===========================================================================
// Research
// ===========================================================================

/// A research node definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct ResearchData {
    pub name: String,
    pub cost: u32,
    #[serde(default)]
    pub prerequisites: Vec<String>,
}

/// Research every player starts with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartingData {
    #[serde(default)]
    pub done: Vec<String>,
    /// Initial research queue, in order.
    #[serde(default)]
    pub pending: Vec<String>,
}

// ===========================================================================
// Tuning
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Chebyshev radius, in tiles, a creature sees around itself.
    pub sight_radius: u32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self { sight_radius: 8 }
    }
}

// ===========================================================================
// Top level
// ===========================================================================

/// A whole game data file. Only `researches` is required.
#[derive(Debug, Clone, Deserialize)]
pub struct GameDataFile {
    pub researches: Vec<ResearchData>,
    #[serde(default)]
    pub spells: SpellConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub timers: TimerConfig,
    #[serde(default)]
    pub starting: StartingData,
}
