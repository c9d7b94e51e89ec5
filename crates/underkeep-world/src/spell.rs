//! Spell dispatch.
//!
//! [`SpellRegistry`] maps each [`SpellType`] to a [`SpellDef`]: a quote
//! function (which targets an area would hit and what that costs) and a cast
//! function (re-validate, then mutate the world). The table is built once;
//! call sites never switch on the spell type.
//!
//! Dispatching a spell type that has no entry, including [`SpellType::Null`],
//! is not an error: it logs a warning and yields a neutral result.

use crate::entity::{CreatureBody, Entity, EntityBody, EntityHeader, Lifetime, Position};
use crate::world::{World, WorldError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};
use underkeep_core::id::{EntityId, SeatId, TilePos};
use underkeep_research::ResearchType;

// ---------------------------------------------------------------------------
// Spell types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpellType {
    Null,
    SummonWorker,
    CallToWar,
    CreatureHeal,
    CreatureExplode,
}

impl SpellType {
    pub const ALL: [SpellType; 5] = [
        SpellType::Null,
        SpellType::SummonWorker,
        SpellType::CallToWar,
        SpellType::CreatureHeal,
        SpellType::CreatureExplode,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Resolve a raw code. Unknown codes become [`SpellType::Null`].
    pub fn from_code(code: u32) -> Self {
        match Self::ALL.get(code as usize) {
            Some(spell) => *spell,
            None => {
                warn!(code, "unknown spell code");
                SpellType::Null
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SpellType::Null => "null",
            SpellType::SummonWorker => "summon_worker",
            SpellType::CallToWar => "call_to_war",
            SpellType::CreatureHeal => "creature_heal",
            SpellType::CreatureExplode => "creature_explode",
        }
    }

    /// Research node that unlocks the spell.
    pub fn research(self) -> Option<ResearchType> {
        match self {
            SpellType::Null => None,
            SpellType::SummonWorker => Some(ResearchType::SpellSummonWorker),
            SpellType::CallToWar => Some(ResearchType::SpellCallToWar),
            SpellType::CreatureHeal => Some(ResearchType::SpellCreatureHeal),
            SpellType::CreatureExplode => Some(ResearchType::SpellCreatureExplode),
        }
    }

    /// Whether casting leaves a spell entity in the world.
    pub fn is_lasting(self) -> bool {
        self == SpellType::CallToWar
    }
}

impl fmt::Display for SpellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Targets, quotes, outcomes
// ---------------------------------------------------------------------------

/// Largest radius an area may span. Wider requests are clamped.
pub const MAX_SPELL_RADIUS: u32 = 32;

/// Square selection of tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellArea {
    pub center: TilePos,
    pub radius: u32,
}

impl SpellArea {
    pub fn new(center: TilePos, radius: u32) -> Self {
        Self { center, radius }
    }

    pub fn tile(center: TilePos) -> Self {
        Self::new(center, 0)
    }

    /// Radius actually covered, at most [`MAX_SPELL_RADIUS`].
    pub fn effective_radius(&self) -> u32 {
        self.radius.min(MAX_SPELL_RADIUS)
    }

    pub fn contains(&self, tile: TilePos) -> bool {
        self.center.chebyshev(tile) <= self.effective_radius()
    }

    /// Every tile in the area, row by row.
    pub fn tiles(&self) -> impl Iterator<Item = TilePos> + '_ {
        let r = self.effective_radius() as i32;
        (-r..=r).flat_map(move |dy| {
            (-r..=r).map(move |dx| TilePos::new(self.center.x + dx, self.center.y + dy))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpellTarget {
    Tile(TilePos),
    Creature(EntityId),
}

/// What a cast on an area would do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpellQuote {
    pub cost: u32,
    pub targets: Vec<SpellTarget>,
}

impl SpellQuote {
    pub fn neutral() -> Self {
        Self::default()
    }
}

/// What a cast did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CastOutcome {
    pub mana_spent: u32,
    pub spawned: Vec<EntityId>,
    pub affected: Vec<EntityId>,
    pub killed: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SpellError {
    #[error("no valid targets")]
    NoTargets,

    #[error("invalid target {0:?}")]
    InvalidTarget(SpellTarget),

    #[error("target {0:?} listed more than once")]
    DuplicateTarget(SpellTarget),

    #[error("not enough mana: need {needed}, have {available}")]
    InsufficientMana { needed: u32, available: u32 },

    #[error(transparent)]
    World(#[from] WorldError),
}

/// Spell tuning, usually loaded from game data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpellConfig {
    pub summon_worker_base_cost: u32,
    /// Added to each summon for every worker the caster already owns.
    pub summon_worker_cost_per_worker: u32,
    pub worker_class: String,
    pub worker_hp: u32,
    pub call_to_war_cost: u32,
    pub call_to_war_turns: u32,
    pub heal_cost_per_target: u32,
    pub heal_amount: u32,
    pub explode_cost_per_target: u32,
    pub explode_damage: u32,
}

impl Default for SpellConfig {
    fn default() -> Self {
        Self {
            summon_worker_base_cost: 50,
            summon_worker_cost_per_worker: 25,
            worker_class: "Worker".to_string(),
            worker_hp: 30,
            call_to_war_cost: 150,
            call_to_war_turns: 30,
            heal_cost_per_target: 40,
            heal_amount: 20,
            explode_cost_per_target: 80,
            explode_damage: 25,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub type QuoteFn = fn(&SpellConfig, &World, &SpellArea, SeatId) -> SpellQuote;
pub type CastFn =
    fn(&SpellConfig, &mut World, &[SpellTarget], SeatId) -> Result<CastOutcome, SpellError>;

#[derive(Clone, Copy)]
pub struct SpellDef {
    pub quote: QuoteFn,
    pub cast: CastFn,
}

#[derive(Clone)]
pub struct SpellRegistry {
    config: SpellConfig,
    defs: HashMap<SpellType, SpellDef>,
}

impl SpellRegistry {
    /// Empty registry; every dispatch is neutral.
    pub fn new(config: SpellConfig) -> Self {
        Self {
            config,
            defs: HashMap::new(),
        }
    }

    /// Registry with every built-in spell.
    pub fn standard(config: SpellConfig) -> Self {
        let mut registry = Self::new(config);
        registry.register(
            SpellType::SummonWorker,
            SpellDef {
                quote: summon_worker::quote,
                cast: summon_worker::cast,
            },
        );
        registry.register(
            SpellType::CallToWar,
            SpellDef {
                quote: call_to_war::quote,
                cast: call_to_war::cast,
            },
        );
        registry.register(
            SpellType::CreatureHeal,
            SpellDef {
                quote: creature_heal::quote,
                cast: creature_heal::cast,
            },
        );
        registry.register(
            SpellType::CreatureExplode,
            SpellDef {
                quote: creature_explode::quote,
                cast: creature_explode::cast,
            },
        );
        registry
    }

    pub fn register(&mut self, spell: SpellType, def: SpellDef) {
        self.defs.insert(spell, def);
    }

    pub fn config(&self) -> &SpellConfig {
        &self.config
    }

    fn def(&self, spell: SpellType) -> Option<&SpellDef> {
        let def = self.defs.get(&spell);
        if def.is_none() {
            warn!(spell = %spell, "no behavior registered for spell; ignoring");
        }
        def
    }

    /// Targets and cost of casting `spell` on `area`.
    pub fn quote(
        &self,
        spell: SpellType,
        world: &World,
        area: &SpellArea,
        caster: SeatId,
    ) -> SpellQuote {
        match self.def(spell) {
            Some(def) => (def.quote)(&self.config, world, area, caster),
            None => SpellQuote::neutral(),
        }
    }

    /// Re-validate `targets` and apply the spell. A rejected cast leaves the
    /// world untouched.
    pub fn cast(
        &self,
        spell: SpellType,
        world: &mut World,
        targets: &[SpellTarget],
        caster: SeatId,
    ) -> Result<CastOutcome, SpellError> {
        let Some(def) = self.def(spell) else {
            return Ok(CastOutcome::default());
        };
        let outcome = (def.cast)(&self.config, world, targets, caster)?;
        debug!(spell = %spell, seat = caster.0, mana = outcome.mana_spent, "spell cast");
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Shared validation
// ---------------------------------------------------------------------------

/// `per_target` for each of `count` targets, saturating at `u32::MAX`.
fn per_target_cost(per_target: u32, count: usize) -> u32 {
    let count = u32::try_from(count).unwrap_or(u32::MAX);
    per_target.saturating_mul(count)
}

/// Fail on the first target that appears twice.
fn ensure_distinct(targets: &[SpellTarget]) -> Result<(), SpellError> {
    let mut seen = HashSet::with_capacity(targets.len());
    match targets.iter().find(|t| !seen.insert(**t)) {
        Some(target) => Err(SpellError::DuplicateTarget(*target)),
        None => Ok(()),
    }
}

fn ensure_mana(world: &World, seat: SeatId, needed: u32) -> Result<(), SpellError> {
    let available = world.mana(seat);
    if available < needed {
        return Err(SpellError::InsufficientMana { needed, available });
    }
    Ok(())
}

fn owned_tile(
    world: &World,
    target: &SpellTarget,
    caster: SeatId,
) -> Result<TilePos, SpellError> {
    match target {
        SpellTarget::Tile(tile) if world.tile_owner(*tile) == Some(caster) => Ok(*tile),
        _ => Err(SpellError::InvalidTarget(*target)),
    }
}

/// Creature target that passes `accept`.
fn creature_target(
    world: &World,
    target: &SpellTarget,
    accept: impl Fn(&Entity, &CreatureBody) -> bool,
) -> Result<EntityId, SpellError> {
    let SpellTarget::Creature(id) = target else {
        return Err(SpellError::InvalidTarget(*target));
    };
    match world.get(*id) {
        Some(entity) if entity.as_creature().is_some_and(|c| accept(entity, c)) => Ok(*id),
        _ => Err(SpellError::InvalidTarget(*target)),
    }
}

// ---------------------------------------------------------------------------
// Spells
// ---------------------------------------------------------------------------

mod summon_worker {
    use super::*;

    fn cost(config: &SpellConfig, owned: u32, count: usize) -> u32 {
        (0..count).fold(0u32, |total, i| {
            let workers = owned.saturating_add(u32::try_from(i).unwrap_or(u32::MAX));
            let each = config
                .summon_worker_cost_per_worker
                .saturating_mul(workers)
                .saturating_add(config.summon_worker_base_cost);
            total.saturating_add(each)
        })
    }

    fn is_free_owned(world: &World, tile: TilePos, caster: SeatId) -> bool {
        world.tile_owner(tile) == Some(caster) && world.creatures_on(tile).is_empty()
    }

    fn free_owned_tiles(world: &World, area: &SpellArea, caster: SeatId) -> Vec<TilePos> {
        area.tiles()
            .filter(|t| is_free_owned(world, *t, caster))
            .collect()
    }

    pub(super) fn quote(
        config: &SpellConfig,
        world: &World,
        area: &SpellArea,
        caster: SeatId,
    ) -> SpellQuote {
        let tiles = free_owned_tiles(world, area, caster);
        let owned = world.count_creatures(caster, &config.worker_class);
        SpellQuote {
            cost: cost(config, owned, tiles.len()),
            targets: tiles.into_iter().map(SpellTarget::Tile).collect(),
        }
    }

    pub(super) fn cast(
        config: &SpellConfig,
        world: &mut World,
        targets: &[SpellTarget],
        caster: SeatId,
    ) -> Result<CastOutcome, SpellError> {
        if targets.is_empty() {
            return Err(SpellError::NoTargets);
        }
        ensure_distinct(targets)?;
        let tiles = targets
            .iter()
            .map(|t| match t {
                SpellTarget::Tile(tile) if is_free_owned(world, *tile, caster) => Ok(*tile),
                _ => Err(SpellError::InvalidTarget(*t)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let owned = world.count_creatures(caster, &config.worker_class);
        let needed = cost(config, owned, tiles.len());
        ensure_mana(world, caster, needed)?;

        world.spend_mana(caster, needed)?;
        let mut outcome = CastOutcome {
            mana_spent: needed,
            ..CastOutcome::default()
        };
        for tile in tiles {
            let name = world.unique_name(&config.worker_class);
            let worker = Entity::new(
                EntityHeader::new(name, caster, Position::on_tile(tile)),
                EntityBody::Creature(CreatureBody {
                    class: config.worker_class.clone(),
                    hp: config.worker_hp,
                    max_hp: config.worker_hp,
                    level: 1,
                }),
            );
            outcome.spawned.push(world.add_entity(worker)?);
        }
        Ok(outcome)
    }
}

mod call_to_war {
    use super::*;

    pub(super) fn quote(
        config: &SpellConfig,
        world: &World,
        area: &SpellArea,
        caster: SeatId,
    ) -> SpellQuote {
        if world.tile_owner(area.center) != Some(caster) {
            return SpellQuote::neutral();
        }
        SpellQuote {
            cost: config.call_to_war_cost,
            targets: vec![SpellTarget::Tile(area.center)],
        }
    }

    pub(super) fn cast(
        config: &SpellConfig,
        world: &mut World,
        targets: &[SpellTarget],
        caster: SeatId,
    ) -> Result<CastOutcome, SpellError> {
        let [target] = targets else {
            return Err(SpellError::NoTargets);
        };
        let tile = owned_tile(world, target, caster)?;
        ensure_mana(world, caster, config.call_to_war_cost)?;

        world.spend_mana(caster, config.call_to_war_cost)?;
        let name = world.unique_name("CallToWar");
        let spell = Entity::new(
            EntityHeader::new(name, caster, Position::on_tile(tile)),
            EntityBody::Spell {
                spell: SpellType::CallToWar,
                lifetime: Lifetime::Turns(config.call_to_war_turns),
            },
        );
        Ok(CastOutcome {
            mana_spent: config.call_to_war_cost,
            spawned: vec![world.add_entity(spell)?],
            ..CastOutcome::default()
        })
    }
}

mod creature_heal {
    use super::*;

    fn accept(caster: SeatId) -> impl Fn(&Entity, &CreatureBody) -> bool {
        move |entity, creature| entity.seat() == caster && creature.is_injured()
    }

    pub(super) fn quote(
        config: &SpellConfig,
        world: &World,
        area: &SpellArea,
        caster: SeatId,
    ) -> SpellQuote {
        let accept = accept(caster);
        let targets: Vec<_> = world
            .creatures_in_area(area)
            .into_iter()
            .filter(|id| {
                world
                    .get(*id)
                    .is_some_and(|e| e.as_creature().is_some_and(|c| accept(e, c)))
            })
            .map(SpellTarget::Creature)
            .collect();
        SpellQuote {
            cost: per_target_cost(config.heal_cost_per_target, targets.len()),
            targets,
        }
    }

    pub(super) fn cast(
        config: &SpellConfig,
        world: &mut World,
        targets: &[SpellTarget],
        caster: SeatId,
    ) -> Result<CastOutcome, SpellError> {
        if targets.is_empty() {
            return Err(SpellError::NoTargets);
        }
        ensure_distinct(targets)?;
        let accept = accept(caster);
        let ids = targets
            .iter()
            .map(|t| creature_target(world, t, &accept))
            .collect::<Result<Vec<_>, _>>()?;
        let needed = per_target_cost(config.heal_cost_per_target, ids.len());
        ensure_mana(world, caster, needed)?;

        world.spend_mana(caster, needed)?;
        for id in &ids {
            if let Some(creature) = world.get_mut(*id).and_then(Entity::as_creature_mut) {
                creature.hp = creature
                    .hp
                    .saturating_add(config.heal_amount)
                    .min(creature.max_hp);
            }
        }
        Ok(CastOutcome {
            mana_spent: needed,
            affected: ids,
            ..CastOutcome::default()
        })
    }
}

mod creature_explode {
    use super::*;

    fn is_enemy(world: &World, caster: SeatId, entity: &Entity) -> bool {
        !world.seats().is_allied(caster, entity.seat())
    }

    pub(super) fn quote(
        config: &SpellConfig,
        world: &World,
        area: &SpellArea,
        caster: SeatId,
    ) -> SpellQuote {
        let targets: Vec<_> = world
            .creatures_in_area(area)
            .into_iter()
            .filter(|id| world.get(*id).is_some_and(|e| is_enemy(world, caster, e)))
            .map(SpellTarget::Creature)
            .collect();
        SpellQuote {
            cost: per_target_cost(config.explode_cost_per_target, targets.len()),
            targets,
        }
    }

    pub(super) fn cast(
        config: &SpellConfig,
        world: &mut World,
        targets: &[SpellTarget],
        caster: SeatId,
    ) -> Result<CastOutcome, SpellError> {
        if targets.is_empty() {
            return Err(SpellError::NoTargets);
        }
        ensure_distinct(targets)?;
        let ids = targets
            .iter()
            .map(|t| creature_target(world, t, |e, _| is_enemy(world, caster, e)))
            .collect::<Result<Vec<_>, _>>()?;
        let needed = per_target_cost(config.explode_cost_per_target, ids.len());
        ensure_mana(world, caster, needed)?;

        world.spend_mana(caster, needed)?;
        let mut dead = Vec::new();
        for id in &ids {
            if let Some(creature) = world.get_mut(*id).and_then(Entity::as_creature_mut) {
                creature.hp = creature.hp.saturating_sub(config.explode_damage);
                if creature.hp == 0 && !dead.contains(id) {
                    dead.push(*id);
                }
            }
        }

        let mut killed = Vec::new();
        for id in dead {
            let entity = world.remove_entity(id)?;
            killed.push(entity.header.name);
        }
        Ok(CastOutcome {
            mana_spent: needed,
            affected: ids,
            killed,
            ..CastOutcome::default()
        })
    }
}

// ===========================================================================
// Tests
// ===========================================================================
