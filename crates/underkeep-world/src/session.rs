//! Session: one side (authority or replica) of a running game.
//!
//! A [`Session`] is the explicit context every operation goes through: it
//! owns the world, the players and their ledgers, the static catalog and
//! dispatch tables, and the sending half of the notification channel.
//!
//! On the authority, ledger and world events are turned into notifications
//! for human players at the end of each operation. On a replica, the same
//! operations mirror what the authority announced and record renderer
//! requests for the local player instead.

use crate::codec::{CodecError, EntityCodecRegistry};
use crate::commands::{Command, CommandQueue};
use crate::entity::{Entity, EntityBody, EntityHeader, Position};
use crate::player::{Direction, HandError, Player};
use crate::snapshot::{SessionState, SnapshotError};
use crate::spell::{
    CastOutcome, SpellArea, SpellError, SpellQuote, SpellRegistry, SpellTarget, SpellType,
};
use crate::world::{World, WorldError, WorldEvent};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use underkeep_core::id::{EntityId, PlayerId, SeatId, TilePos};
use underkeep_core::notification::{MessageKind, NotificationSender};
use underkeep_core::packet::{Packet, PacketError, PacketReader};
use underkeep_core::role::Role;
use underkeep_core::seat::SeatError;
use underkeep_research::{
    LedgerContext, LedgerError, LedgerEvent, PayloadError, ResearchCatalog, ResearchLedger,
    ResearchType, read_research_list, research_list_payload,
};

pub const NO_TREASURY_MESSAGE: &str = "No treasury available. You should build a bigger one";
pub const LOST_GAME_MESSAGE: &str = "You lost the game";
pub const LOST_MESSAGE: &str = "You lost";
pub const ALLY_LOST_MESSAGE: &str = "An ally has lost";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unknown player {0:?}")]
    UnknownPlayer(PlayerId),

    #[error("player {0:?} already joined")]
    DuplicatePlayer(PlayerId),

    #[error("player {0:?} has no seat")]
    NoSeat(PlayerId),

    #[error("operation is reserved to the authority")]
    NotAuthority,

    #[error("spell {0} is not researched")]
    SpellUnavailable(SpellType),

    #[error("entity {0:?} is not a research carrier")]
    NotACarrier(EntityId),

    #[error("no player controls seat {0:?}")]
    UnclaimedSeat(SeatId),

    #[error("unexpected message kind {0:?}")]
    UnexpectedMessage(MessageKind),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Spell(#[from] SpellError),
    #[error(transparent)]
    Hand(#[from] HandError),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error(transparent)]
    Seat(#[from] SeatError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Research state every player starts with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartingResearch {
    pub done: Vec<ResearchType>,
    pub pending: Vec<ResearchType>,
}

/// Fire-and-forget requests for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderRequest {
    MoveToHand { player: PlayerId, entity: String },
    RearrangeHand { player: PlayerId },
    RotateHand { player: PlayerId },
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    role: Role,
    tick: u64,
    world: World,
    players: Vec<Player>,
    catalog: ResearchCatalog,
    spells: SpellRegistry,
    codecs: EntityCodecRegistry,
    starting: StartingResearch,
    notifications: NotificationSender,
    local_player: Option<PlayerId>,
    render_requests: Vec<RenderRequest>,
    commands: CommandQueue,
}

impl Session {
    pub fn new(
        role: Role,
        world: World,
        catalog: ResearchCatalog,
        spells: SpellRegistry,
        starting: StartingResearch,
        notifications: NotificationSender,
    ) -> Self {
        Self {
            role,
            tick: 0,
            world,
            players: Vec::new(),
            catalog,
            spells,
            codecs: EntityCodecRegistry::standard(),
            starting,
            notifications,
            local_player: None,
            render_requests: Vec::new(),
            commands: CommandQueue::new(),
        }
    }

    pub fn with_command_history(mut self, max_history: usize) -> Self {
        self.commands = CommandQueue::with_max_history(max_history);
        self
    }

    /// The player this replica renders for.
    pub fn set_local_player(&mut self, player: PlayerId) {
        self.local_player = Some(player);
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn catalog(&self) -> &ResearchCatalog {
        &self.catalog
    }

    pub fn codecs(&self) -> &EntityCodecRegistry {
        &self.codecs
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn commands(&self) -> &CommandQueue {
        &self.commands
    }

    fn player_mut(&mut self, id: PlayerId) -> Result<&mut Player, SessionError> {
        self.players
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(SessionError::UnknownPlayer(id))
    }

    fn seat_of(&self, id: PlayerId) -> Result<SeatId, SessionError> {
        self.player(id)
            .ok_or(SessionError::UnknownPlayer(id))?
            .seat
            .ok_or(SessionError::NoSeat(id))
    }

    fn is_local(&self, id: PlayerId) -> bool {
        !self.role.is_authority() && self.local_player == Some(id)
    }

    // -- Players --

    /// Join a player, optionally claiming a seat for them.
    pub fn add_player(
        &mut self,
        mut player: Player,
        seat: Option<SeatId>,
    ) -> Result<(), SessionError> {
        if self.player(player.id).is_some() {
            return Err(SessionError::DuplicatePlayer(player.id));
        }
        if let Some(seat) = seat {
            self.world.seats_mut().claim(seat, player.id, player.human)?;
        }
        player.seat = seat;
        info!(player = %player.nick, seat = ?seat, human = player.human, "player joined");
        self.players.push(player);
        Ok(())
    }

    /// Give a player the starting research state.
    pub fn init_player(&mut self, id: PlayerId) -> Result<(), SessionError> {
        let starting = self.starting.clone();
        self.with_ledger(id, |ledger, ctx| {
            ledger.set_researches_done(ctx, starting.done);
            ledger.set_research_tree(ctx, starting.pending)
        })??;
        self.flush_ledger_events(id);
        Ok(())
    }

    // -- Research --

    /// Run `f` on a player's ledger with a context built from the session.
    fn with_ledger<R>(
        &mut self,
        id: PlayerId,
        f: impl FnOnce(&mut ResearchLedger, &LedgerContext<'_>) -> R,
    ) -> Result<R, SessionError> {
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(SessionError::UnknownPlayer(id))?;
        let carriers = player
            .seat
            .map(|seat| self.world.carriers_of(seat))
            .unwrap_or_default();
        let ctx = LedgerContext {
            role: self.role,
            catalog: &self.catalog,
            carriers: &carriers,
        };
        Ok(f(&mut player.ledger, &ctx))
    }

    pub fn set_research_tree(
        &mut self,
        id: PlayerId,
        researches: Vec<ResearchType>,
    ) -> Result<(), SessionError> {
        self.with_ledger(id, |ledger, ctx| ledger.set_research_tree(ctx, researches))??;
        self.flush_ledger_events(id);
        Ok(())
    }

    pub fn set_researches_done(
        &mut self,
        id: PlayerId,
        done: Vec<ResearchType>,
    ) -> Result<(), SessionError> {
        self.with_ledger(id, |ledger, ctx| ledger.set_researches_done(ctx, done))?;
        self.flush_ledger_events(id);
        Ok(())
    }

    /// Feed library points to a player. When the current node's cost is
    /// reached, a carrier for it is spawned at `at` and its id returned.
    pub fn add_research_points(
        &mut self,
        id: PlayerId,
        points: u32,
        at: Position,
    ) -> Result<Option<EntityId>, SessionError> {
        let seat = self.seat_of(id)?;
        let completed = self.with_ledger(id, |ledger, ctx| {
            ledger.add_research_points(ctx, points).map(|r| r.kind)
        })?;
        let Some(research) = completed else {
            return Ok(None);
        };

        let name = self.world.unique_name("ResearchEntity");
        let carrier = Entity::new(
            EntityHeader::new(name, seat, at),
            EntityBody::ResearchCarrier { research },
        );
        let carrier = self.world.add_entity(carrier)?;
        debug!(research = %research, seat = seat.0, "research carrier spawned");
        Ok(Some(carrier))
    }

    /// Owner of a carrier entity, and what it carries.
    fn carrier_owner(&self, carrier: EntityId) -> Result<(PlayerId, ResearchType), SessionError> {
        let entity = self
            .world
            .get(carrier)
            .ok_or(WorldError::EntityNotFound(carrier))?;
        let research = entity
            .carried_research()
            .ok_or(SessionError::NotACarrier(carrier))?;
        let owner = self
            .world
            .seats()
            .get(entity.seat())
            .and_then(|s| s.occupant)
            .ok_or(SessionError::UnclaimedSeat(entity.seat()))?;
        Ok((owner.player, research))
    }

    /// A carrier reached its destination: remove it and finish its node.
    /// Returns `false` if the node was already done.
    pub fn deliver_carrier(&mut self, carrier: EntityId) -> Result<bool, SessionError> {
        let (owner, research) = self.carrier_owner(carrier)?;
        self.world.remove_entity(carrier)?;
        let added = self.with_ledger(owner, |ledger, ctx| ledger.add_research(ctx, research))?;
        self.flush_ledger_events(owner);
        info!(research = %research, added, "research delivered");
        Ok(added)
    }

    /// A carrier was destroyed before arriving. Its node stays pending and can
    /// be picked again by an idle ledger.
    pub fn destroy_carrier(&mut self, carrier: EntityId) -> Result<(), SessionError> {
        let (owner, research) = self.carrier_owner(carrier)?;
        self.world.remove_entity(carrier)?;
        self.with_ledger(owner, |ledger, ctx| {
            if !ledger.is_researching() {
                ledger.set_next_research(ctx, None);
            }
        })?;
        info!(research = %research, "research carrier lost");
        Ok(())
    }

    // -- Spells --

    pub fn quote_spell(
        &self,
        id: PlayerId,
        spell: SpellType,
        area: &SpellArea,
    ) -> Result<SpellQuote, SessionError> {
        let seat = self.seat_of(id)?;
        Ok(self.spells.quote(spell, &self.world, area, seat))
    }

    /// Cast a spell for a player. Authority only; the spell must be
    /// researched unless it has no research node.
    pub fn cast_spell(
        &mut self,
        id: PlayerId,
        spell: SpellType,
        targets: &[SpellTarget],
    ) -> Result<CastOutcome, SessionError> {
        if !self.role.is_authority() {
            warn!(spell = %spell, "replica attempted to cast a spell");
            return Err(SessionError::NotAuthority);
        }
        let seat = self.seat_of(id)?;
        let player = self.player(id).ok_or(SessionError::UnknownPlayer(id))?;
        if spell.research().is_some() && !player.is_spell_available(spell) {
            warn!(player = %player.nick, spell = %spell, "spell not researched");
            return Err(SessionError::SpellUnavailable(spell));
        }

        self.spells
            .cast(spell, &mut self.world, targets, seat)
            .map_err(|err| {
                warn!(spell = %spell, %err, "spell cast rejected");
                SessionError::from(err)
            })
    }

    // -- Hand --

    /// Move an entity from the world into a player's hand.
    pub fn pick_up(&mut self, id: PlayerId, entity: EntityId) -> Result<(), SessionError> {
        self.player_mut(id)?;
        let entity = self.world.remove_entity(entity)?;
        let name = entity.name().to_string();
        self.player_mut(id)?.pick_up(entity);
        if self.is_local(id) {
            self.render_requests.push(RenderRequest::MoveToHand { player: id, entity: name });
        }
        Ok(())
    }

    /// Put the entity at `index` of the hand back into the world on `tile`.
    pub fn drop_hand(
        &mut self,
        id: PlayerId,
        index: usize,
        tile: TilePos,
    ) -> Result<EntityId, SessionError> {
        let mut entity = self.player_mut(id)?.drop_hand(index)?;
        entity.header.position = Position::on_tile(tile);

        let added = match self.world.add_entity(entity.clone()) {
            Ok(added) => added,
            Err(err) => {
                self.player_mut(id)?.put_back(index, entity);
                return Err(err.into());
            }
        };
        if self.is_local(id) {
            self.render_requests.push(RenderRequest::RearrangeHand { player: id });
        }
        Ok(added)
    }

    pub fn rotate_hand(&mut self, id: PlayerId, direction: Direction) -> Result<(), SessionError> {
        let moved = self.player_mut(id)?.rotate_hand(direction);
        if moved && self.is_local(id) {
            self.render_requests.push(RenderRequest::RotateHand { player: id });
        }
        Ok(())
    }

    /// Take every renderer request recorded since the last call.
    pub fn drain_render_requests(&mut self) -> Vec<RenderRequest> {
        std::mem::take(&mut self.render_requests)
    }

    // -- Player notifications --

    pub fn notify_fighting(&mut self, id: PlayerId) -> Result<(), SessionError> {
        let player = self.player_mut(id)?;
        let started = player.notify_fighting();
        let human = player.human;
        if started && human {
            self.send(id, MessageKind::PlayerFighting, Vec::new());
        }
        Ok(())
    }

    pub fn notify_no_treasury(&mut self, id: PlayerId) -> Result<(), SessionError> {
        let player = self.player_mut(id)?;
        let warn_now = player.notify_no_treasury();
        let human = player.human;
        if warn_now && human {
            self.send_chat(id, NO_TREASURY_MESSAGE);
        }
        Ok(())
    }

    /// A player lost their last stronghold. `ally_standing` tells whether a
    /// teammate still has one. Only reported once per player.
    pub fn notify_defeat(&mut self, id: PlayerId, ally_standing: bool) -> Result<(), SessionError> {
        let seat = self.seat_of(id)?;
        if !self.player_mut(id)?.mark_lost() {
            return Ok(());
        }

        let recipients: Vec<PlayerId> = self
            .world
            .seats()
            .seats()
            .iter()
            .filter(|s| self.world.seats().is_allied(seat, s.id))
            .filter_map(|s| s.human_player())
            .collect();
        for recipient in recipients {
            let message = match (ally_standing, recipient == id) {
                (false, _) => LOST_GAME_MESSAGE,
                (true, true) => LOST_MESSAGE,
                (true, false) => ALLY_LOST_MESSAGE,
            };
            self.send_chat(recipient, message);
        }
        Ok(())
    }

    // -- Tick --

    /// Queue a player request for the next upkeep.
    pub fn submit(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Apply every queued command in submission order. Rejected commands are
    /// logged and skipped.
    pub fn apply_commands(&mut self) {
        for command in self.commands.drain(self.tick) {
            if let Err(err) = self.apply(command) {
                warn!(%err, tick = self.tick, "command rejected");
            }
        }
    }

    fn apply(&mut self, command: Command) -> Result<(), SessionError> {
        match command {
            Command::SetResearchTree { player, researches } => {
                self.set_research_tree(player, researches)
            }
            Command::CastSpell {
                player,
                spell,
                targets,
            } => self.cast_spell(player, spell, &targets).map(drop),
            Command::PickUp { player, entity } => self.pick_up(player, entity),
            Command::DropHand {
                player,
                index,
                tile,
            } => self.drop_hand(player, index, tile).map(drop),
            Command::RotateHand { player, direction } => self.rotate_hand(player, direction),
        }
    }

    /// One simulation tick of `dt` seconds.
    ///
    /// On the authority: apply queued commands, count down spells and player
    /// timers, recompute visibility, then flush notifications. A replica only
    /// advances its tick counter.
    pub fn upkeep(&mut self, dt: f32) {
        self.tick += 1;
        if !self.role.is_authority() {
            return;
        }

        self.apply_commands();
        self.world.upkeep_spells();

        let mut stopped = Vec::new();
        for player in &mut self.players {
            if player.update_time(dt).stopped_fighting && player.human {
                stopped.push(player.id);
            }
        }
        for id in stopped {
            self.send(id, MessageKind::PlayerNoMoreFighting, Vec::new());
        }

        self.world.refresh_visibility(&self.codecs);
        self.flush_world_events();
    }

    // -- Replica side --

    /// Apply a message received from the authority to this replica.
    pub fn receive(&mut self, kind: MessageKind, payload: &[u8]) -> Result<(), SessionError> {
        let local = self.local_player;
        match kind {
            MessageKind::ResearchTree => {
                let list = read_research_list(payload)?;
                if let Some(id) = local {
                    self.set_research_tree(id, list)?;
                }
            }
            MessageKind::ResearchesDone => {
                let list = read_research_list(payload)?;
                if let Some(id) = local {
                    self.set_researches_done(id, list)?;
                }
            }
            MessageKind::AddEntity => {
                let mut reader = PacketReader::new(payload);
                let name: String = reader.get()?;
                let entity = self.codecs.read_packet(&mut reader)?;
                if let Some(existing) = self.world.find_by_name(&name) {
                    self.world.remove_entity(existing)?;
                }
                self.world.add_entity(entity)?;
            }
            MessageKind::RemoveEntity => {
                let name: String = PacketReader::new(payload).get()?;
                if let Some(existing) = self.world.find_by_name(&name) {
                    self.world.remove_entity(existing)?;
                }
            }
            MessageKind::Chat | MessageKind::PlayerFighting | MessageKind::PlayerNoMoreFighting => {
                return Err(SessionError::UnexpectedMessage(kind));
            }
        }
        // Replicas never forward world events.
        self.world.drain_events();
        Ok(())
    }

    // -- Snapshots --

    pub fn save_snapshot(&self) -> Result<Vec<u8>, SessionError> {
        let state = SessionState {
            tick: self.tick,
            world: self.world.clone(),
            players: self.players.clone(),
        };
        Ok(state.save()?)
    }

    /// Replace the world, players and tick with a saved state. Static tables
    /// and the notification channel are kept.
    pub fn load_snapshot(&mut self, data: &[u8]) -> Result<(), SessionError> {
        let state = SessionState::load(data)?;
        self.tick = state.tick;
        self.world = state.world;
        self.players = state.players;
        self.commands = CommandQueue::new();
        self.render_requests.clear();
        Ok(())
    }

    // -- Outbound --

    fn send(&self, target: PlayerId, kind: MessageKind, payload: Vec<u8>) {
        if self.role.is_authority() {
            self.notifications.enqueue(target, kind, payload);
        }
    }

    fn send_chat(&self, target: PlayerId, message: &str) {
        let mut packet = Packet::new();
        if let Err(err) = packet.put(message) {
            error!(%err, "cannot encode chat message");
            return;
        }
        self.send(target, MessageKind::Chat, packet.into_bytes());
    }

    fn flush_ledger_events(&mut self, id: PlayerId) {
        let Some(player) = self.players.iter_mut().find(|p| p.id == id) else {
            return;
        };
        let events = player.ledger.drain_events();
        if !self.role.is_authority() || !player.human {
            return;
        }

        for event in events {
            let (kind, list) = match event {
                LedgerEvent::PendingChanged(list) => (MessageKind::ResearchTree, list),
                LedgerEvent::DoneChanged(list) => (MessageKind::ResearchesDone, list),
            };
            match research_list_payload(&list) {
                Ok(payload) => self.notifications.enqueue(id, kind, payload),
                Err(err) => error!(%err, "cannot encode research list"),
            }
        }
    }

    fn flush_world_events(&mut self) {
        for event in self.world.drain_events() {
            let (player, kind, payload) = match event {
                WorldEvent::Shown { player, name, state } => {
                    let mut packet = Packet::new();
                    if let Err(err) = packet.put(&name) {
                        error!(%err, entity = %name, "cannot encode entity name");
                        continue;
                    }
                    let mut payload = packet.into_bytes();
                    payload.extend_from_slice(&state);
                    (player, MessageKind::AddEntity, payload)
                }
                WorldEvent::Hidden { player, name } => {
                    let mut packet = Packet::new();
                    if let Err(err) = packet.put(&name) {
                        error!(%err, entity = %name, "cannot encode entity name");
                        continue;
                    }
                    (player, MessageKind::RemoveEntity, packet.into_bytes())
                }
            };
            self.send(player, kind, payload);
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spell::SpellConfig;
    use underkeep_core::notification::{NotificationReceiver, channel};
    use underkeep_core::test_utils::*;
    use underkeep_research::Research;

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn catalog() -> ResearchCatalog {
        let mut catalog = ResearchCatalog::new();
        for (kind, cost, prerequisites) in [
            (ResearchType::RoomTreasury, 0, vec![]),
            (ResearchType::RoomLibrary, 100, vec![]),
            (ResearchType::RoomTrainingHall, 200, vec![ResearchType::RoomLibrary]),
            (ResearchType::SpellCallToWar, 50, vec![]),
        ] {
            catalog
                .register(Research {
                    kind,
                    cost,
                    prerequisites,
                })
                .unwrap();
        }
        catalog
    }

    fn starting() -> StartingResearch {
        StartingResearch {
            done: vec![ResearchType::RoomTreasury],
            pending: vec![ResearchType::RoomLibrary, ResearchType::RoomTrainingHall],
        }
    }

    fn setup(role: Role) -> (Session, NotificationReceiver) {
        let (tx, rx) = channel();
        let mut world = World::new(keeper_seats(), 2);
        // Leave the seats unclaimed so players can join them.
        for seat in [keeper(), ally(), rival()] {
            world.seats_mut().release(seat);
        }
        let mut session = Session::new(
            role,
            world,
            catalog(),
            SpellRegistry::standard(SpellConfig::default()),
            starting(),
            tx,
        );
        session
            .add_player(Player::new(keeper_player(), "keeper", true), Some(keeper()))
            .unwrap();
        session
            .add_player(Player::new(ally_player(), "ally", false), Some(ally()))
            .unwrap();
        session
            .add_player(Player::new(rival_player(), "rival", true), Some(rival()))
            .unwrap();
        (session, rx)
    }

    fn kinds(rx: &NotificationReceiver, target: PlayerId) -> Vec<MessageKind> {
        rx.drain()
            .into_iter()
            .filter(|n| n.target == target)
            .map(|n| n.kind)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Players and research
    // -----------------------------------------------------------------------

    #[test]
    fn duplicate_player_rejected() {
        let (mut session, _rx) = setup(Role::Authority);
        assert!(matches!(
            session.add_player(Player::new(keeper_player(), "again", true), None),
            Err(SessionError::DuplicatePlayer(_))
        ));
    }

    #[test]
    fn init_player_notifies_humans_only() {
        let (mut session, rx) = setup(Role::Authority);
        session.init_player(keeper_player()).unwrap();
        session.init_player(ally_player()).unwrap();

        let all = rx.drain();
        assert!(all.iter().all(|n| n.target == keeper_player()));
        let kinds: Vec<_> = all.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![MessageKind::ResearchesDone, MessageKind::ResearchTree]);

        let tree = read_research_list(&all[1].payload).unwrap();
        assert_eq!(tree, starting().pending);
        let ally = session.player(ally_player()).unwrap();
        assert_eq!(ally.ledger.current(), Some(ResearchType::RoomLibrary));
    }

    #[test]
    fn rejected_tree_sends_nothing() {
        let (mut session, rx) = setup(Role::Authority);
        let result =
            session.set_research_tree(keeper_player(), vec![ResearchType::RoomTrainingHall]);
        assert!(matches!(
            result,
            Err(SessionError::Ledger(LedgerError::PrerequisiteNotMet { .. }))
        ));
        assert!(rx.is_empty());
    }

    #[test]
    fn points_spawn_carrier_and_delivery_completes() {
        let (mut session, rx) = setup(Role::Authority);
        session.init_player(keeper_player()).unwrap();
        rx.drain();

        let at = Position::on_tile(TilePos::new(3, 3));
        assert!(session.add_research_points(keeper_player(), 60, at).unwrap().is_none());
        let carrier = session
            .add_research_points(keeper_player(), 60, at)
            .unwrap()
            .expect("library threshold reached");

        let entity = session.world().get(carrier).unwrap();
        assert_eq!(entity.carried_research(), Some(ResearchType::RoomLibrary));
        assert_eq!(entity.seat(), keeper());
        let ledger = &session.player(keeper_player()).unwrap().ledger;
        assert!(!ledger.is_research_done(ResearchType::RoomLibrary));
        assert_eq!(ledger.points(), 20);
        // Training hall is next; library has a carrier in flight.
        assert_eq!(ledger.current(), Some(ResearchType::RoomTrainingHall));

        assert!(session.deliver_carrier(carrier).unwrap());
        assert!(session.world().get(carrier).is_none());
        let ledger = &session.player(keeper_player()).unwrap().ledger;
        assert!(ledger.is_research_done(ResearchType::RoomLibrary));
        assert_eq!(ledger.pending(), &[ResearchType::RoomTrainingHall]);
        assert_eq!(kinds(&rx, keeper_player()), vec![MessageKind::ResearchesDone]);
    }

    #[test]
    fn destroyed_carrier_lets_node_be_researched_again() {
        let (mut session, _rx) = setup(Role::Authority);
        session
            .set_research_tree(keeper_player(), vec![ResearchType::RoomLibrary])
            .unwrap();
        let carrier = session
            .add_research_points(keeper_player(), 100, Position::default())
            .unwrap()
            .unwrap();
        assert_eq!(session.player(keeper_player()).unwrap().ledger.current(), None);

        session.destroy_carrier(carrier).unwrap();
        let ledger = &session.player(keeper_player()).unwrap().ledger;
        assert_eq!(ledger.current(), Some(ResearchType::RoomLibrary));
        assert!(!ledger.is_research_done(ResearchType::RoomLibrary));
    }

    #[test]
    fn delivering_a_creature_is_rejected() {
        let (mut session, _rx) = setup(Role::Authority);
        let imp = session
            .world_mut()
            .add_entity(Entity::new(
                EntityHeader::new("Imp_1", keeper(), Position::default()),
                EntityBody::Creature(crate::entity::CreatureBody {
                    class: "Worker".into(),
                    hp: 1,
                    max_hp: 1,
                    level: 1,
                }),
            ))
            .unwrap();
        assert!(matches!(session.deliver_carrier(imp), Err(SessionError::NotACarrier(_))));
        assert!(session.world().get(imp).is_some());
    }

    // -----------------------------------------------------------------------
    // Spells
    // -----------------------------------------------------------------------

    #[test]
    fn unresearched_spell_cannot_be_cast() {
        let (mut session, _rx) = setup(Role::Authority);
        session.world_mut().claim_tile(TilePos::new(0, 0), keeper());
        session.world_mut().add_mana(keeper(), 500);
        let targets = [SpellTarget::Tile(TilePos::new(0, 0))];

        assert!(matches!(
            session.cast_spell(keeper_player(), SpellType::CallToWar, &targets),
            Err(SessionError::SpellUnavailable(SpellType::CallToWar))
        ));

        session
            .set_researches_done(keeper_player(), vec![ResearchType::SpellCallToWar])
            .unwrap();
        let outcome = session
            .cast_spell(keeper_player(), SpellType::CallToWar, &targets)
            .unwrap();
        assert_eq!(outcome.spawned.len(), 1);
    }

    #[test]
    fn null_spell_cast_is_neutral() {
        let (mut session, _rx) = setup(Role::Authority);
        let (outcome, logs) =
            capture_logs(|| session.cast_spell(keeper_player(), SpellType::Null, &[]));
        assert_eq!(outcome.unwrap(), CastOutcome::default());
        assert_eq!(diagnostics(&logs).len(), 1);
    }

    #[test]
    fn replica_cannot_cast() {
        let (mut session, _rx) = setup(Role::Replica);
        assert!(matches!(
            session.cast_spell(keeper_player(), SpellType::SummonWorker, &[]),
            Err(SessionError::NotAuthority)
        ));
    }

    // -----------------------------------------------------------------------
    // Hand and render requests
    // -----------------------------------------------------------------------

    fn imp(session: &mut Session, name: &str) -> EntityId {
        session
            .world_mut()
            .add_entity(Entity::new(
                EntityHeader::new(name, keeper(), Position::default()),
                EntityBody::Creature(crate::entity::CreatureBody {
                    class: "Worker".into(),
                    hp: 5,
                    max_hp: 5,
                    level: 1,
                }),
            ))
            .unwrap()
    }

    #[test]
    fn hand_round_trip_through_world() {
        let (mut session, _rx) = setup(Role::Authority);
        let id = imp(&mut session, "Imp_1");
        session.pick_up(keeper_player(), id).unwrap();
        assert!(session.world().is_empty());

        let dropped = session.drop_hand(keeper_player(), 0, TilePos::new(4, 2)).unwrap();
        assert_eq!(session.world().get(dropped).unwrap().tile(), TilePos::new(4, 2));
        assert!(session.drain_render_requests().is_empty());
    }

    #[test]
    fn drop_with_bad_index_changes_nothing() {
        let (mut session, _rx) = setup(Role::Authority);
        let id = imp(&mut session, "Imp_1");
        session.pick_up(keeper_player(), id).unwrap();
        assert!(matches!(
            session.drop_hand(keeper_player(), 5, TilePos::new(0, 0)),
            Err(SessionError::Hand(HandError::IndexOutOfBounds { index: 5, len: 1 }))
        ));
        assert_eq!(session.player(keeper_player()).unwrap().hand_len(), 1);
    }

    #[test]
    fn drop_onto_name_clash_returns_entity_to_hand() {
        let (mut session, _rx) = setup(Role::Authority);
        let id = imp(&mut session, "Imp_1");
        session.pick_up(keeper_player(), id).unwrap();
        imp(&mut session, "Imp_1");

        assert!(matches!(
            session.drop_hand(keeper_player(), 0, TilePos::new(0, 0)),
            Err(SessionError::World(WorldError::DuplicateName(_)))
        ));
        assert_eq!(session.player(keeper_player()).unwrap().hand_len(), 1);
    }

    #[test]
    fn replica_records_render_requests_for_local_player_only() {
        let (mut session, _rx) = setup(Role::Replica);
        session.set_local_player(keeper_player());
        let mine = imp(&mut session, "Imp_1");
        let other = imp(&mut session, "Imp_2");
        let third = imp(&mut session, "Imp_3");

        session.pick_up(keeper_player(), mine).unwrap();
        session.pick_up(keeper_player(), third).unwrap();
        session.pick_up(rival_player(), other).unwrap();
        session.rotate_hand(keeper_player(), Direction::Left).unwrap();
        session.drop_hand(keeper_player(), 0, TilePos::new(1, 1)).unwrap();

        assert_eq!(
            session.drain_render_requests(),
            vec![
                RenderRequest::MoveToHand {
                    player: keeper_player(),
                    entity: "Imp_1".into()
                },
                RenderRequest::MoveToHand {
                    player: keeper_player(),
                    entity: "Imp_3".into()
                },
                RenderRequest::RotateHand { player: keeper_player() },
                RenderRequest::RearrangeHand { player: keeper_player() },
            ]
        );
    }

    // -----------------------------------------------------------------------
    // Timers and defeat
    // -----------------------------------------------------------------------

    #[test]
    fn fighting_notifications_on_edges() {
        let (mut session, rx) = setup(Role::Authority);
        session.notify_fighting(keeper_player()).unwrap();
        session.notify_fighting(keeper_player()).unwrap();
        session.notify_fighting(ally_player()).unwrap();
        assert_eq!(kinds(&rx, keeper_player()), vec![MessageKind::PlayerFighting]);

        session.upkeep(5.0);
        session.upkeep(6.0);
        let all = rx.drain();
        let stops: Vec<_> = all
            .iter()
            .filter(|n| n.kind == MessageKind::PlayerNoMoreFighting)
            .map(|n| n.target)
            .collect();
        assert_eq!(stops, vec![keeper_player()]);
    }

    #[test]
    fn no_treasury_chat_is_rate_limited() {
        let (mut session, rx) = setup(Role::Authority);
        session.notify_no_treasury(keeper_player()).unwrap();
        session.notify_no_treasury(keeper_player()).unwrap();
        let chats = rx.drain();
        assert_eq!(chats.len(), 1);
        let text: String = PacketReader::new(&chats[0].payload).get().unwrap();
        assert_eq!(text, NO_TREASURY_MESSAGE);
    }

    #[test]
    fn defeat_messages_depend_on_team() {
        let (mut session, rx) = setup(Role::Authority);
        session.notify_defeat(rival_player(), false).unwrap();
        session.notify_defeat(rival_player(), false).unwrap();
        let messages = rx.drain();
        assert_eq!(messages.len(), 1);
        let text: String = PacketReader::new(&messages[0].payload).get().unwrap();
        assert_eq!(text, LOST_GAME_MESSAGE);

        session.notify_defeat(keeper_player(), true).unwrap();
        let messages = rx.drain();
        // The ally seat is computer-controlled, so only the keeper is told.
        assert_eq!(messages.len(), 1);
        let text: String = PacketReader::new(&messages[0].payload).get().unwrap();
        assert_eq!(text, LOST_MESSAGE);
    }

    // -----------------------------------------------------------------------
    // Tick, commands, snapshots
    // -----------------------------------------------------------------------

    #[test]
    fn upkeep_applies_commands_and_flushes_visibility() {
        let (mut session, rx) = setup(Role::Authority);
        imp(&mut session, "Imp_1");
        session.submit(Command::SetResearchTree {
            player: keeper_player(),
            researches: vec![ResearchType::RoomLibrary],
        });
        session.upkeep(0.1);

        let all = rx.drain();
        let kinds: Vec<_> = all.iter().map(|n| (n.target, n.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (keeper_player(), MessageKind::ResearchTree),
                (keeper_player(), MessageKind::AddEntity),
            ]
        );
        let mut reader = PacketReader::new(&all[1].payload);
        let name: String = reader.get().unwrap();
        assert_eq!(name, "Imp_1");
        let entity = session.codecs().read_packet(&mut reader).unwrap();
        assert_eq!(entity.name(), "Imp_1");
    }

    #[test]
    fn rejected_command_is_skipped() {
        let (mut session, rx) = setup(Role::Authority);
        session.submit(Command::RotateHand {
            player: PlayerId(77),
            direction: Direction::Right,
        });
        let ((), logs) = capture_logs(|| session.upkeep(0.1));
        assert_eq!(diagnostics(&logs).len(), 1);
        assert!(rx.is_empty());
        assert!(session.commands().is_empty());
    }

    #[test]
    fn replica_mirrors_authority_messages() {
        let (mut authority, rx) = setup(Role::Authority);
        let (mut replica, _replica_rx) = setup(Role::Replica);
        replica.set_local_player(keeper_player());

        authority.init_player(keeper_player()).unwrap();
        imp(&mut authority, "Imp_1");
        authority.upkeep(0.1);

        for n in rx.drain().into_iter().filter(|n| n.target == keeper_player()) {
            replica.receive(n.kind, &n.payload).unwrap();
        }

        let ledger = &replica.player(keeper_player()).unwrap().ledger;
        assert_eq!(ledger.done(), &[ResearchType::RoomTreasury]);
        assert_eq!(ledger.pending(), starting().pending.as_slice());
        assert!(ledger.needs_refresh_pending());
        assert!(replica.world().find_by_name("Imp_1").is_some());
    }

    #[test]
    fn snapshot_restores_players_and_world() {
        let (mut session, _rx) = setup(Role::Authority);
        session.init_player(keeper_player()).unwrap();
        session
            .add_research_points(keeper_player(), 30, Position::default())
            .unwrap();
        imp(&mut session, "Imp_1");
        session.upkeep(0.1);

        let bytes = session.save_snapshot().unwrap();
        let (mut restored, _rx) = setup(Role::Authority);
        restored.load_snapshot(&bytes).unwrap();

        assert_eq!(restored.tick(), 1);
        assert!(restored.world().find_by_name("Imp_1").is_some());
        let ledger = &restored.player(keeper_player()).unwrap().ledger;
        assert_eq!(ledger.points(), 30);
        assert_eq!(ledger.current(), Some(ResearchType::RoomLibrary));
    }
}
