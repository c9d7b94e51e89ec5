//! Resolution pipeline: reads a game data file, resolves research names and
//! builds the catalog and tuning bundle a session is created from.
//!
//! Provides format detection (RON/JSON/TOML), file discovery, and
//! deserialization helpers. The stock keeper game is embedded and available
//! through [`GameData::stock`].

use crate::schema::{GameDataFile, StartingData, VisionConfig};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use underkeep_core::id::PlayerId;
use underkeep_core::notification::NotificationSender;
use underkeep_core::role::Role;
use underkeep_core::seat::SeatRegistry;
use underkeep_research::{CatalogError, Research, ResearchCatalog, ResearchType};
use underkeep_world::player::{Player, TimerConfig};
use underkeep_world::session::{Session, StartingResearch};
use underkeep_world::spell::{SpellConfig, SpellRegistry};
use underkeep_world::world::World;

/// Base name of the game data file inside a data directory.
pub const GAME_FILE: &str = "game";

const STOCK_GAME: &str = include_str!("../data/game.ron");

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A research name could not be resolved.
    #[error("unresolved research '{name}' in {file}")]
    UnresolvedResearch { file: PathBuf, name: String },

    /// Starting research names a node missing from the catalog.
    #[error("starting research {research} is not in the catalog of {file}")]
    NotInCatalog { file: PathBuf, research: ResearchType },

    /// The research list does not form a valid catalog.
    #[error("invalid research catalog in {file}: {source}")]
    Catalog {
        file: PathBuf,
        #[source]
        source: CatalogError,
    },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a data file with the given base name (without extension).
///
/// Looks for `{base_name}.ron`, `{base_name}.toml`, and `{base_name}.json`.
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// multiple formats exist for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;

    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing,
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

/// Like [`find_data_file`], but returns an error if no file is found.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Deserialize `content` in the given format. `file` is only used for errors.
pub fn deserialize_str<T: DeserializeOwned>(
    content: &str,
    format: Format,
    file: &Path,
) -> Result<T, DataLoadError> {
    let parse_error = |detail: String| DataLoadError::Parse {
        file: file.to_path_buf(),
        detail,
    };
    match format {
        Format::Ron => ron::from_str(content).map_err(|e| parse_error(e.to_string())),
        Format::Json => serde_json::from_str(content).map_err(|e| parse_error(e.to_string())),
        Format::Toml => toml::from_str(content).map_err(|e| parse_error(e.to_string())),
    }
}

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    deserialize_str(&content, format, path)
}

// ===========================================================================
// Name resolution
// ===========================================================================

/// Resolve a snake_case research name.
pub fn resolve_research(name: &str, file: &Path) -> Result<ResearchType, DataLoadError> {
    name.parse()
        .map_err(|_| DataLoadError::UnresolvedResearch {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
}

fn resolve_all(names: &[String], file: &Path) -> Result<Vec<ResearchType>, DataLoadError> {
    names.iter().map(|name| resolve_research(name, file)).collect()
}

// ===========================================================================
// Game data
// ===========================================================================

/// Everything a session needs from data files, resolved and validated.
#[derive(Debug, Clone)]
pub struct GameData {
    pub catalog: ResearchCatalog,
    pub spells: SpellConfig,
    pub vision: VisionConfig,
    pub timers: TimerConfig,
    pub starting: StartingResearch,
}

impl GameData {
    /// The built-in keeper game.
    pub fn stock() -> Result<GameData, DataLoadError> {
        let file = Path::new("game.ron");
        let raw: GameDataFile = deserialize_str(STOCK_GAME, Format::Ron, file)?;
        Self::resolve(raw, file)
    }

    /// Load a single game data file in any supported format.
    pub fn from_file(path: &Path) -> Result<GameData, DataLoadError> {
        let raw: GameDataFile = deserialize_file(path)?;
        Self::resolve(raw, path)
    }

    /// Resolve names and build the catalog. Researches register in file
    /// order, so prerequisites must be listed before the nodes needing them.
    pub fn resolve(raw: GameDataFile, file: &Path) -> Result<GameData, DataLoadError> {
        let mut catalog = ResearchCatalog::new();
        for data in &raw.researches {
            let research = Research {
                kind: resolve_research(&data.name, file)?,
                cost: data.cost,
                prerequisites: resolve_all(&data.prerequisites, file)?,
            };
            catalog
                .register(research)
                .map_err(|source| DataLoadError::Catalog {
                    file: file.to_path_buf(),
                    source,
                })?;
        }

        let starting = Self::resolve_starting(&raw.starting, &catalog, file)?;
        debug!(
            file = %file.display(),
            researches = catalog.len(),
            done = starting.done.len(),
            pending = starting.pending.len(),
            "resolved game data"
        );

        Ok(GameData {
            catalog,
            spells: raw.spells,
            vision: raw.vision,
            timers: raw.timers,
            starting,
        })
    }

    fn resolve_starting(
        raw: &StartingData,
        catalog: &ResearchCatalog,
        file: &Path,
    ) -> Result<StartingResearch, DataLoadError> {
        let done = resolve_all(&raw.done, file)?;
        let pending = resolve_all(&raw.pending, file)?;
        if let Some(&research) = done.iter().chain(&pending).find(|r| !catalog.contains(**r)) {
            return Err(DataLoadError::NotInCatalog {
                file: file.to_path_buf(),
                research,
            });
        }
        Ok(StartingResearch { done, pending })
    }

    /// An empty world using the configured sight radius.
    pub fn new_world(&self, seats: SeatRegistry) -> World {
        World::new(seats, self.vision.sight_radius)
    }

    /// A player using the configured timers.
    pub fn new_player(&self, id: PlayerId, nick: impl Into<String>, human: bool) -> Player {
        Player::new(id, nick, human).with_timers(self.timers)
    }

    /// A session over a fresh world with the standard spell table.
    pub fn new_session(
        &self,
        role: Role,
        seats: SeatRegistry,
        notifications: NotificationSender,
    ) -> Session {
        Session::new(
            role,
            self.new_world(seats),
            self.catalog.clone(),
            SpellRegistry::standard(self.spells.clone()),
            self.starting.clone(),
            notifications,
        )
    }
}

/// Load `game.{ron,toml,json}` from a data directory.
pub fn load_game_data(dir: &Path) -> Result<GameData, DataLoadError> {
    let path = require_data_file(dir, GAME_FILE)?;
    let data = GameData::from_file(&path)?;
    info!(file = %path.display(), researches = data.catalog.len(), "loaded game data");
    Ok(data)
}

// ===========================================================================
// Tests
// ===========================================================================
