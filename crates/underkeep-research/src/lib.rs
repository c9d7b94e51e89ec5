//! Research Module for the Underkeep replication core.
//!
//! Provides the progression catalog (which research nodes exist, what they
//! cost, what they require) and the per-player research ledger that spends
//! accumulated points on an ordered queue of nodes.
//!
//! # Overview
//!
//! Research nodes are registered at startup via [`ResearchCatalog::register`].
//! Each [`Research`] has a point cost and a list of prerequisite nodes.
//!
//! At runtime each player owns a [`ResearchLedger`]. Libraries feed points
//! with [`ResearchLedger::add_research_points`]. Reaching a node's cost does
//! NOT complete it: the caller receives the node definition and is expected
//! to spawn a carrier entity for it. The node is only marked done when that
//! carrier reaches its destination and [`ResearchLedger::add_research`] is
//! called. A carrier that never arrives leaves the node pending forever.
//!
//! # Authority and Replica
//!
//! Every ledger operation receives a [`LedgerContext`]. On the authority,
//! tree changes are validated against the catalog and state changes are
//! pushed as [`LedgerEvent`]s for the caller to turn into notifications. On a
//! replica, the ledger mirrors what it is told and raises GUI refresh flags.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, warn};
use underkeep_core::packet::{Packet, PacketError, PacketReader};
use underkeep_core::role::Role;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifies a research node. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchType {
    RoomTreasury,
    RoomHatchery,
    RoomDormitory,
    RoomLibrary,
    RoomTrainingHall,
    RoomForge,
    RoomCrypt,
    TrapCannon,
    TrapSpike,
    TrapBoulder,
    SpellSummonWorker,
    SpellCallToWar,
    SpellCreatureHeal,
    SpellCreatureExplode,
}

impl ResearchType {
    /// Every research type, in code order.
    pub const ALL: [ResearchType; 14] = [
        ResearchType::RoomTreasury,
        ResearchType::RoomHatchery,
        ResearchType::RoomDormitory,
        ResearchType::RoomLibrary,
        ResearchType::RoomTrainingHall,
        ResearchType::RoomForge,
        ResearchType::RoomCrypt,
        ResearchType::TrapCannon,
        ResearchType::TrapSpike,
        ResearchType::TrapBoulder,
        ResearchType::SpellSummonWorker,
        ResearchType::SpellCallToWar,
        ResearchType::SpellCreatureHeal,
        ResearchType::SpellCreatureExplode,
    ];

    /// Stable numeric code used on the wire. Codes start at 1.
    pub fn code(self) -> u32 {
        self as u32 + 1
    }

    pub fn from_code(code: u32) -> Option<Self> {
        let index = code.checked_sub(1)? as usize;
        Self::ALL.get(index).copied()
    }

    /// Stable name used in save files and data files.
    pub fn name(self) -> &'static str {
        match self {
            ResearchType::RoomTreasury => "room_treasury",
            ResearchType::RoomHatchery => "room_hatchery",
            ResearchType::RoomDormitory => "room_dormitory",
            ResearchType::RoomLibrary => "room_library",
            ResearchType::RoomTrainingHall => "room_training_hall",
            ResearchType::RoomForge => "room_forge",
            ResearchType::RoomCrypt => "room_crypt",
            ResearchType::TrapCannon => "trap_cannon",
            ResearchType::TrapSpike => "trap_spike",
            ResearchType::TrapBoulder => "trap_boulder",
            ResearchType::SpellSummonWorker => "spell_summon_worker",
            ResearchType::SpellCallToWar => "spell_call_to_war",
            ResearchType::SpellCreatureHeal => "spell_creature_heal",
            ResearchType::SpellCreatureExplode => "spell_creature_explode",
        }
    }
}

impl fmt::Display for ResearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a research name does not match any [`ResearchType`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown research name: {0:?}")]
pub struct UnknownResearchName(pub String);

impl FromStr for ResearchType {
    type Err = UnknownResearchName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.name() == s)
            .ok_or_else(|| UnknownResearchName(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Research definition
// ---------------------------------------------------------------------------

/// A research node. Registered at startup; immutable after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Research {
    pub kind: ResearchType,

    /// Points a library must accumulate before a carrier is released.
    pub cost: u32,

    /// Nodes that must be done, or queued earlier, before this one.
    pub prerequisites: Vec<ResearchType>,
}

impl Research {
    /// Whether every prerequisite appears in `already`.
    pub fn can_be_researched(&self, already: &[ResearchType]) -> bool {
        self.missing_prerequisite(already).is_none()
    }

    /// The first prerequisite absent from `already`.
    pub fn missing_prerequisite(&self, already: &[ResearchType]) -> Option<ResearchType> {
        self.prerequisites
            .iter()
            .copied()
            .find(|p| !already.contains(p))
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Errors that can occur while building the catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate research: {0}")]
    Duplicate(ResearchType),

    #[error("prerequisite {prereq} for research {research} is not registered")]
    InvalidPrerequisite {
        research: ResearchType,
        prereq: ResearchType,
    },
}

/// Every research node of a game, in registration order. Loaded once,
/// read-only while the game runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchCatalog {
    researches: Vec<Research>,
}

impl ResearchCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a research node. Prerequisites must already be registered,
    /// which keeps the dependency graph acyclic.
    pub fn register(&mut self, research: Research) -> Result<(), CatalogError> {
        if self.contains(research.kind) {
            return Err(CatalogError::Duplicate(research.kind));
        }

        for prereq in &research.prerequisites {
            if !self.contains(*prereq) {
                return Err(CatalogError::InvalidPrerequisite {
                    research: research.kind,
                    prereq: *prereq,
                });
            }
        }

        self.researches.push(research);
        Ok(())
    }

    pub fn get(&self, kind: ResearchType) -> Option<&Research> {
        self.researches.iter().find(|r| r.kind == kind)
    }

    pub fn contains(&self, kind: ResearchType) -> bool {
        self.get(kind).is_some()
    }

    /// Every registered node, in registration order.
    pub fn list_all(&self) -> &[Research] {
        &self.researches
    }

    pub fn len(&self) -> usize {
        self.researches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.researches.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Carrier lookup
// ---------------------------------------------------------------------------

/// Answers whether a carrier for a node is already travelling for the
/// ledger's faction. Implemented by the world container; the ledger never
/// holds carriers itself.
pub trait CarrierIndex {
    fn has_carrier(&self, research: ResearchType) -> bool;
}

/// A faction with no carriers in flight.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCarriers;

impl CarrierIndex for NoCarriers {
    fn has_carrier(&self, _research: ResearchType) -> bool {
        false
    }
}

impl CarrierIndex for HashSet<ResearchType> {
    fn has_carrier(&self, research: ResearchType) -> bool {
        self.contains(&research)
    }
}

impl CarrierIndex for Vec<ResearchType> {
    fn has_carrier(&self, research: ResearchType) -> bool {
        self.contains(&research)
    }
}

// ---------------------------------------------------------------------------
// Ledger context, events, errors
// ---------------------------------------------------------------------------

/// Everything a ledger operation may consult. Passed explicitly to every
/// call instead of reaching for shared game state.
#[derive(Clone, Copy)]
pub struct LedgerContext<'a> {
    pub role: Role,
    pub catalog: &'a ResearchCatalog,
    pub carriers: &'a dyn CarrierIndex,
}

impl<'a> LedgerContext<'a> {
    pub fn authority(catalog: &'a ResearchCatalog, carriers: &'a dyn CarrierIndex) -> Self {
        Self {
            role: Role::Authority,
            catalog,
            carriers,
        }
    }

    pub fn replica(catalog: &'a ResearchCatalog) -> Self {
        Self {
            role: Role::Replica,
            catalog,
            carriers: &NoCarriers,
        }
    }
}

/// State changes the authority must announce to the ledger's player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    /// The pending queue was replaced.
    PendingChanged(Vec<ResearchType>),
    /// The done set was replaced.
    DoneChanged(Vec<ResearchType>),
}

/// Reasons the authority rejects a proposed research tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("unknown research: {0}")]
    UnknownResearch(ResearchType),

    #[error("research {0} is already done")]
    AlreadyDone(ResearchType),

    #[error("research {0} appears twice in the tree")]
    DuplicateInTree(ResearchType),

    #[error("research {research} requires {missing}")]
    PrerequisiteNotMet {
        research: ResearchType,
        missing: ResearchType,
    },
}

/// Externally observable ledger state. Threshold resolution happens inside
/// [`ResearchLedger::add_research_points`] and is never observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerState {
    Idle,
    Accumulating {
        research: ResearchType,
        points: u32,
        cost: u32,
    },
}

// ---------------------------------------------------------------------------
// ResearchLedger
// ---------------------------------------------------------------------------

/// Per-player research state.
///
/// Only ever mutated from the simulation tick; `&mut self` on every
/// mutating operation keeps it single-writer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchLedger {
    /// Completed nodes. Order carries no meaning.
    done: Vec<ResearchType>,

    /// Queued nodes in priority order.
    pending: Vec<ResearchType>,

    /// The node points are currently spent on.
    current: Option<ResearchType>,

    /// Points accumulated toward `current`. Overflow carries over.
    points: u32,

    needs_refresh_done: bool,
    needs_refresh_pending: bool,

    /// Events emitted since last drain. Not serialized (transient).
    #[serde(skip)]
    events: Vec<LedgerEvent>,
}

impl ResearchLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Query API --

    pub fn done(&self) -> &[ResearchType] {
        &self.done
    }

    pub fn pending(&self) -> &[ResearchType] {
        &self.pending
    }

    pub fn current(&self) -> Option<ResearchType> {
        self.current
    }

    pub fn points(&self) -> u32 {
        self.points
    }

    pub fn is_research_done(&self, kind: ResearchType) -> bool {
        self.done.contains(&kind)
    }

    pub fn is_researching(&self) -> bool {
        self.current.is_some()
    }

    pub fn state(&self, catalog: &ResearchCatalog) -> LedgerState {
        match self.current.and_then(|c| catalog.get(c)) {
            Some(research) => LedgerState::Accumulating {
                research: research.kind,
                points: self.points,
                cost: research.cost,
            },
            None => LedgerState::Idle,
        }
    }

    // -- Research actions --

    /// Replace the pending queue.
    ///
    /// On the authority every node must exist, must not be done already,
    /// must appear once, and must have its prerequisites in the done set or
    /// earlier in `researches`. The first violation rejects the whole tree
    /// and leaves the ledger untouched. On success `current` is reselected.
    ///
    /// A replica trusts the authority and replaces the queue as given.
    pub fn set_research_tree(
        &mut self,
        ctx: &LedgerContext<'_>,
        researches: Vec<ResearchType>,
    ) -> Result<(), LedgerError> {
        if !ctx.role.is_authority() {
            self.pending = researches;
            self.needs_refresh_pending = true;
            return Ok(());
        }

        if let Err(err) = self.validate_tree(ctx.catalog, &researches) {
            warn!(%err, "research tree rejected");
            return Err(err);
        }

        self.pending = researches;
        self.events
            .push(LedgerEvent::PendingChanged(self.pending.clone()));
        self.set_next_research(ctx, None);
        Ok(())
    }

    /// Pick the first pending node, other than `just_completed`, for which
    /// no carrier is in flight. Leaves the ledger idle if there is none.
    pub fn set_next_research(
        &mut self,
        ctx: &LedgerContext<'_>,
        just_completed: Option<ResearchType>,
    ) {
        self.current = None;

        let next = self
            .pending
            .iter()
            .copied()
            .filter(|kind| Some(*kind) != just_completed)
            .find(|kind| !ctx.carriers.has_carrier(*kind));

        let Some(kind) = next else {
            if !self.pending.is_empty() {
                debug!("every pending research has a carrier in flight; ledger idle");
            }
            return;
        };

        if !ctx.catalog.contains(kind) {
            error!(research = %kind, "pending research missing from catalog");
            return;
        }

        self.current = Some(kind);
    }

    /// Add library points to the current node.
    ///
    /// Returns the node's definition when its cost is reached. The cost is
    /// subtracted (the remainder carries over) and the next node is selected,
    /// but the completed node is NOT marked done: the caller must spawn its
    /// carrier, and [`add_research`](Self::add_research) finishes it on
    /// delivery.
    pub fn add_research_points<'c>(
        &mut self,
        ctx: &LedgerContext<'c>,
        points: u32,
    ) -> Option<&'c Research> {
        let current = self.current?;
        let catalog: &'c ResearchCatalog = ctx.catalog;

        let Some(research) = catalog.get(current) else {
            error!(research = %current, "current research missing from catalog");
            self.current = None;
            return None;
        };

        self.points = self.points.saturating_add(points);
        if self.points < research.cost {
            return None;
        }

        self.points -= research.cost;
        self.set_next_research(ctx, Some(current));
        debug!(research = %current, carry = self.points, "research threshold reached");
        Some(research)
    }

    /// Mark a node done because its carrier arrived. Returns `false` if it
    /// already was.
    pub fn add_research(&mut self, ctx: &LedgerContext<'_>, kind: ResearchType) -> bool {
        if self.is_research_done(kind) {
            return false;
        }

        let mut done = self.done.clone();
        done.push(kind);
        self.set_researches_done(ctx, done);
        true
    }

    /// Replace the done set. Done nodes are dropped from the pending queue.
    ///
    /// On the authority, an idle ledger or one whose current node just
    /// became done picks its next node.
    pub fn set_researches_done(&mut self, ctx: &LedgerContext<'_>, done: Vec<ResearchType>) {
        self.done = done;
        self.pending.retain(|kind| !self.done.contains(kind));

        if !ctx.role.is_authority() {
            self.needs_refresh_done = true;
            return;
        }

        self.events.push(LedgerEvent::DoneChanged(self.done.clone()));

        let current_still_pending = self
            .current
            .is_some_and(|c| self.pending.contains(&c));
        if !current_still_pending {
            self.set_next_research(ctx, None);
        }
    }

    // -- GUI refresh flags (replica) --

    pub fn needs_refresh_done(&self) -> bool {
        self.needs_refresh_done
    }

    pub fn gui_refreshed_done(&mut self) {
        self.needs_refresh_done = false;
    }

    pub fn needs_refresh_pending(&self) -> bool {
        self.needs_refresh_pending
    }

    pub fn gui_refreshed_pending(&mut self) {
        self.needs_refresh_pending = false;
    }

    // -- Event API --

    /// Drain all pending events. Returns events and clears the internal list.
    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Get a read-only view of pending events.
    pub fn pending_events(&self) -> &[LedgerEvent] {
        &self.events
    }

    // -- Internal helpers --

    fn validate_tree(
        &self,
        catalog: &ResearchCatalog,
        researches: &[ResearchType],
    ) -> Result<(), LedgerError> {
        let mut available = self.done.clone();

        for (index, &kind) in researches.iter().enumerate() {
            let research = catalog
                .get(kind)
                .ok_or(LedgerError::UnknownResearch(kind))?;

            if self.is_research_done(kind) {
                return Err(LedgerError::AlreadyDone(kind));
            }
            if researches[..index].contains(&kind) {
                return Err(LedgerError::DuplicateInTree(kind));
            }
            if let Some(missing) = research.missing_prerequisite(&available) {
                return Err(LedgerError::PrerequisiteNotMet {
                    research: kind,
                    missing,
                });
            }

            available.push(kind);
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

/// Errors while reading a research list payload.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error("unknown research code: {0}")]
    UnknownCode(u32),
}

/// Encode `{count: u32, code[count]}`.
pub fn research_list_payload(list: &[ResearchType]) -> Result<Vec<u8>, PacketError> {
    let codes: Vec<u32> = list.iter().map(|r| r.code()).collect();
    let mut packet = Packet::new();
    packet.put_list(&codes)?;
    Ok(packet.into_bytes())
}

/// Decode a payload written by [`research_list_payload`].
pub fn read_research_list(bytes: &[u8]) -> Result<Vec<ResearchType>, PayloadError> {
    let mut reader = PacketReader::new(bytes);
    let codes: Vec<u32> = reader.get_list()?;
    codes
        .into_iter()
        .map(|code| ResearchType::from_code(code).ok_or(PayloadError::UnknownCode(code)))
        .collect()
}

// ===========================================================================
// Tests
// ===========================================================================
