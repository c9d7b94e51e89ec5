//! World entity model.
//!
//! Every entity shares an [`EntityHeader`] (identity, owner, placement,
//! animation) and carries a kind-specific [`EntityBody`]. The leading
//! [`EntityTag`] selects the body when decoding.

use crate::spell::SpellType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use underkeep_core::id::{SeatId, TilePos};
use underkeep_research::ResearchType;

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Concrete entity kind. Written first by both codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityTag {
    Creature,
    ResearchCarrier,
    Spell,
}

impl EntityTag {
    pub const ALL: [EntityTag; 3] = [
        EntityTag::Creature,
        EntityTag::ResearchCarrier,
        EntityTag::Spell,
    ];

    /// Wire code.
    pub fn code(self) -> u16 {
        match self {
            EntityTag::Creature => 1,
            EntityTag::ResearchCarrier => 2,
            EntityTag::Spell => 3,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Stream name.
    pub fn name(self) -> &'static str {
        match self {
            EntityTag::Creature => "creature",
            EntityTag::ResearchCarrier => "research_carrier",
            EntityTag::Spell => "spell",
        }
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Position in world units. One tile is one unit wide.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Centre of a tile, on the floor.
    pub fn on_tile(tile: TilePos) -> Self {
        Self::new(tile.x as f32, tile.y as f32, 0.0)
    }

    /// The tile this position lies on.
    pub fn tile(&self) -> TilePos {
        TilePos::new(self.x.round() as i32, self.y.round() as i32)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationState {
    pub name: String,
    pub looping: bool,
}

impl AnimationState {
    pub fn new(name: impl Into<String>, looping: bool) -> Self {
        Self {
            name: name.into(),
            looping,
        }
    }

    pub fn idle() -> Self {
        Self::new("Idle", true)
    }
}

/// Fields common to every entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityHeader {
    /// Unique within a world. Never contains whitespace.
    pub name: String,
    pub seat: SeatId,
    pub position: Position,
    /// Facing, in degrees.
    pub rotation: f32,
    pub animation: AnimationState,
}

impl EntityHeader {
    pub fn new(name: impl Into<String>, seat: SeatId, position: Position) -> Self {
        Self {
            name: name.into(),
            seat,
            position,
            rotation: 0.0,
            animation: AnimationState::idle(),
        }
    }
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatureBody {
    /// Class name, e.g. `Worker`.
    pub class: String,
    pub hp: u32,
    pub max_hp: u32,
    pub level: u32,
}

impl CreatureBody {
    pub fn is_injured(&self) -> bool {
        self.hp < self.max_hp
    }
}

/// Remaining lifetime of a spell entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifetime {
    Permanent,
    Turns(u32),
}

impl Lifetime {
    /// Integer encoding shared by both codecs: `-1` is permanent.
    pub fn to_raw(self) -> i64 {
        match self {
            Lifetime::Permanent => -1,
            Lifetime::Turns(n) => i64::from(n),
        }
    }

    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            -1 => Some(Lifetime::Permanent),
            n => u32::try_from(n).ok().map(Lifetime::Turns),
        }
    }
}

/// Kind-specific trailing block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityBody {
    Creature(CreatureBody),
    /// The completion of `research` travelling toward its owner's library.
    ResearchCarrier { research: ResearchType },
    Spell { spell: SpellType, lifetime: Lifetime },
}

impl EntityBody {
    pub fn tag(&self) -> EntityTag {
        match self {
            EntityBody::Creature(_) => EntityTag::Creature,
            EntityBody::ResearchCarrier { .. } => EntityTag::ResearchCarrier,
            EntityBody::Spell { .. } => EntityTag::Spell,
        }
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub header: EntityHeader,
    pub body: EntityBody,
}

impl Entity {
    pub fn new(header: EntityHeader, body: EntityBody) -> Self {
        Self { header, body }
    }

    pub fn tag(&self) -> EntityTag {
        self.body.tag()
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn seat(&self) -> SeatId {
        self.header.seat
    }

    pub fn tile(&self) -> TilePos {
        self.header.position.tile()
    }

    pub fn as_creature(&self) -> Option<&CreatureBody> {
        match &self.body {
            EntityBody::Creature(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_creature_mut(&mut self) -> Option<&mut CreatureBody> {
        match &mut self.body {
            EntityBody::Creature(c) => Some(c),
            _ => None,
        }
    }

    pub fn carried_research(&self) -> Option<ResearchType> {
        match self.body {
            EntityBody::ResearchCarrier { research } => Some(research),
            _ => None,
        }
    }
}
