//! The world container.
//!
//! Owns every entity, the visibility record of each entity, per-seat mana
//! and tile claims. Entity lifecycle is centralized here: other components
//! hold [`EntityId`]s or names, never the entities themselves.

use crate::codec::EntityCodecRegistry;
use crate::entity::{Entity, EntityBody, Lifetime};
use crate::spell::SpellArea;
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, trace};
use underkeep_core::id::{EntityId, PlayerId, SeatId, TilePos};
use underkeep_core::seat::SeatRegistry;
use underkeep_core::visibility::{VisibilityEvent, VisibilityRecord};
use underkeep_research::ResearchType;

// ---------------------------------------------------------------------------
// Errors and events
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("an entity named {0:?} already exists")]
    DuplicateName(String),

    #[error("unknown seat {0:?}")]
    UnknownSeat(SeatId),

    #[error("entity {0:?} not found")]
    EntityNotFound(EntityId),

    #[error("seat {seat:?} needs {needed} mana but has {available}")]
    InsufficientMana {
        seat: SeatId,
        needed: u32,
        available: u32,
    },
}

/// Visibility change addressed to a human player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    /// The player's seat can now see the entity; `state` is its wire encoding.
    Shown {
        player: PlayerId,
        name: String,
        state: Vec<u8>,
    },
    /// The player's seat can no longer see the entity.
    Hidden { player: PlayerId, name: String },
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    seats: SeatRegistry,
    entities: SlotMap<EntityId, Entity>,
    visibility: SecondaryMap<EntityId, VisibilityRecord>,
    names: HashMap<String, EntityId>,
    mana: BTreeMap<SeatId, u32>,
    claimed: BTreeMap<TilePos, SeatId>,
    /// Tiles a creature reveals around itself.
    sight_radius: u32,
    next_serial: u64,

    /// Events emitted since last drain. Not serialized (transient).
    #[serde(skip)]
    events: Vec<WorldEvent>,
}

impl World {
    pub fn new(seats: SeatRegistry, sight_radius: u32) -> Self {
        Self {
            seats,
            entities: SlotMap::with_key(),
            visibility: SecondaryMap::new(),
            names: HashMap::new(),
            mana: BTreeMap::new(),
            claimed: BTreeMap::new(),
            sight_radius,
            next_serial: 0,
            events: Vec::new(),
        }
    }

    pub fn seats(&self) -> &SeatRegistry {
        &self.seats
    }

    pub fn seats_mut(&mut self) -> &mut SeatRegistry {
        &mut self.seats
    }

    pub fn sight_radius(&self) -> u32 {
        self.sight_radius
    }

    // -- Entities --

    /// Take ownership of an entity. It becomes visible at the next
    /// [`refresh_visibility`](Self::refresh_visibility).
    pub fn add_entity(&mut self, entity: Entity) -> Result<EntityId, WorldError> {
        if self.names.contains_key(entity.name()) {
            return Err(WorldError::DuplicateName(entity.name().to_string()));
        }
        if self.seats.get(entity.seat()).is_none() {
            return Err(WorldError::UnknownSeat(entity.seat()));
        }

        let name = entity.name().to_string();
        let id = self.entities.insert(entity);
        self.visibility.insert(id, VisibilityRecord::new());
        trace!(entity = %name, "entity added");
        self.names.insert(name, id);
        Ok(id)
    }

    /// Remove an entity. Every human seat that could see it is told.
    pub fn remove_entity(&mut self, id: EntityId) -> Result<Entity, WorldError> {
        let entity = self
            .entities
            .remove(id)
            .ok_or(WorldError::EntityNotFound(id))?;
        self.names.remove(entity.name());

        if let Some(mut record) = self.visibility.remove(id) {
            for event in record.clear(&self.seats) {
                self.events.push(WorldEvent::Hidden {
                    player: event.player(),
                    name: entity.name().to_string(),
                });
            }
        }
        trace!(entity = %entity.name(), "entity removed");
        Ok(entity)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.names.get(name).copied()
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities.iter()
    }

    pub fn visibility(&self, id: EntityId) -> Option<&VisibilityRecord> {
        self.visibility.get(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// A name not used by any entity, of the form `{prefix}_{n}`.
    pub fn unique_name(&mut self, prefix: &str) -> String {
        loop {
            self.next_serial += 1;
            let name = format!("{prefix}_{}", self.next_serial);
            if !self.names.contains_key(&name) {
                return name;
            }
        }
    }

    // -- Creatures --

    fn creatures(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities
            .iter()
            .filter(|(_, e)| e.as_creature().is_some())
    }

    pub fn creatures_in_area(&self, area: &SpellArea) -> Vec<EntityId> {
        self.creatures()
            .filter(|(_, e)| area.contains(e.tile()))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn creatures_on(&self, tile: TilePos) -> Vec<EntityId> {
        self.creatures_in_area(&SpellArea::tile(tile))
    }

    /// Creatures of `class` owned by `seat`.
    pub fn count_creatures(&self, seat: SeatId, class: &str) -> u32 {
        self.creatures()
            .filter(|(_, e)| e.seat() == seat)
            .filter(|(_, e)| e.as_creature().is_some_and(|c| c.class == class))
            .count() as u32
    }

    // -- Research carriers --

    /// Research nodes with a live carrier owned by `seat`.
    pub fn carriers_of(&self, seat: SeatId) -> Vec<ResearchType> {
        self.entities
            .values()
            .filter(|e| e.seat() == seat)
            .filter_map(Entity::carried_research)
            .collect()
    }

    /// The live carrier of `research` owned by `seat`.
    pub fn find_carrier(&self, seat: SeatId, research: ResearchType) -> Option<EntityId> {
        self.entities
            .iter()
            .find(|(_, e)| e.seat() == seat && e.carried_research() == Some(research))
            .map(|(id, _)| id)
    }

    // -- Tiles and mana --

    pub fn claim_tile(&mut self, tile: TilePos, seat: SeatId) {
        self.claimed.insert(tile, seat);
    }

    pub fn tile_owner(&self, tile: TilePos) -> Option<SeatId> {
        self.claimed.get(&tile).copied()
    }

    pub fn mana(&self, seat: SeatId) -> u32 {
        self.mana.get(&seat).copied().unwrap_or(0)
    }

    pub fn add_mana(&mut self, seat: SeatId, amount: u32) {
        let mana = self.mana.entry(seat).or_insert(0);
        *mana = mana.saturating_add(amount);
    }

    pub fn spend_mana(&mut self, seat: SeatId, amount: u32) -> Result<(), WorldError> {
        let available = self.mana(seat);
        if available < amount {
            return Err(WorldError::InsufficientMana {
                seat,
                needed: amount,
                available,
            });
        }
        self.mana.insert(seat, available - amount);
        Ok(())
    }

    // -- Per-tick passes --

    /// Recompute which seats see each entity and record the difference.
    ///
    /// A seat sees an entity when one of the seat's creatures stands within
    /// `sight_radius` tiles of it. Owners and their allies always see their
    /// own entities.
    pub fn refresh_visibility(&mut self, codecs: &EntityCodecRegistry) {
        let eyes: Vec<(SeatId, TilePos)> = self
            .creatures()
            .map(|(_, e)| (e.seat(), e.tile()))
            .collect();

        for (id, entity) in self.entities.iter() {
            let tile = entity.tile();
            let seeing: Vec<SeatId> = eyes
                .iter()
                .filter(|(_, eye)| eye.chebyshev(tile) <= self.sight_radius)
                .map(|(seat, _)| *seat)
                .collect();

            let Some(record) = self.visibility.get_mut(id) else {
                error!(entity = %entity.name(), "entity has no visibility record");
                continue;
            };

            for event in record.update(entity.seat(), &seeing, &self.seats) {
                match event {
                    VisibilityEvent::Add { seat, player } => match codecs.encode_packet(entity) {
                        Ok(state) => self.events.push(WorldEvent::Shown {
                            player,
                            name: entity.name().to_string(),
                            state,
                        }),
                        Err(err) => {
                            // The seat was never told; retry on the next refresh.
                            record.evict(seat);
                            error!(
                                entity = %entity.name(),
                                %err,
                                "cannot encode entity for replication"
                            );
                        }
                    },
                    VisibilityEvent::Remove { player, .. } => {
                        self.events.push(WorldEvent::Hidden {
                            player,
                            name: entity.name().to_string(),
                        })
                    }
                }
            }
        }
    }

    /// Count down every spell lifetime by one turn. A spell found with no
    /// turns left is removed, so `Turns(n)` survives `n` upkeeps and goes on
    /// the next one. Returns the names of the removed spells.
    pub fn upkeep_spells(&mut self) -> Vec<String> {
        let mut expired = Vec::new();
        for (id, entity) in self.entities.iter_mut() {
            if let EntityBody::Spell {
                lifetime: Lifetime::Turns(turns),
                ..
            } = &mut entity.body
            {
                match *turns {
                    0 => expired.push(id),
                    _ => *turns -= 1,
                }
            }
        }

        let mut names = Vec::with_capacity(expired.len());
        for id in expired {
            match self.remove_entity(id) {
                Ok(entity) => {
                    debug!(spell = %entity.name(), "spell expired");
                    names.push(entity.header.name);
                }
                Err(err) => error!(%err, "expired spell vanished before removal"),
            }
        }
        names
    }

    // -- Event API --

    /// Drain all pending events. Returns events and clears the internal list.
    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }

    /// Get a read-only view of pending events.
    pub fn pending_events(&self) -> &[WorldEvent] {
        &self.events
    }
}

// ===========================================================================
// Tests
// ===========================================================================
