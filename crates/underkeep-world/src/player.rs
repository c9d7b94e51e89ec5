//! Player state: seat, research ledger, hand and notification timers.

use crate::entity::Entity;
use crate::spell::SpellType;
use serde::{Deserialize, Serialize};
use tracing::error;
use underkeep_core::id::{PlayerId, SeatId};
use underkeep_research::{ResearchLedger, ResearchType};

/// Seconds the fighting state lasts after the last attack.
pub const BATTLE_TIME: f32 = 10.0;

/// Seconds between two "no treasury" warnings.
pub const NO_TREASURY_TIME: f32 = 30.0;

/// Durations of the player notification timers, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub battle_time: f32,
    pub no_treasury_time: f32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            battle_time: BATTLE_TIME,
            no_treasury_time: NO_TREASURY_TIME,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomType {
    Treasury,
    Hatchery,
    Dormitory,
    Library,
    TrainingHall,
    Forge,
    Crypt,
}

impl RoomType {
    pub fn research(self) -> ResearchType {
        match self {
            RoomType::Treasury => ResearchType::RoomTreasury,
            RoomType::Hatchery => ResearchType::RoomHatchery,
            RoomType::Dormitory => ResearchType::RoomDormitory,
            RoomType::Library => ResearchType::RoomLibrary,
            RoomType::TrainingHall => ResearchType::RoomTrainingHall,
            RoomType::Forge => ResearchType::RoomForge,
            RoomType::Crypt => ResearchType::RoomCrypt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrapType {
    Cannon,
    Spike,
    Boulder,
}

impl TrapType {
    pub fn research(self) -> ResearchType {
        match self {
            TrapType::Cannon => ResearchType::TrapCannon,
            TrapType::Spike => ResearchType::TrapSpike,
            TrapType::Boulder => ResearchType::TrapBoulder,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandError {
    #[error("hand index {index} out of bounds for {len} entities")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// Edge transitions of the player's timers during one update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerEdges {
    pub stopped_fighting: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub nick: String,
    pub seat: Option<SeatId>,
    pub human: bool,
    pub ledger: ResearchLedger,
    /// Picked-up entities, most recent first.
    hand: Vec<Entity>,
    timers: TimerConfig,
    fighting_time: f32,
    no_treasury_time: f32,
    lost_sent: bool,
}

impl Player {
    pub fn new(id: PlayerId, nick: impl Into<String>, human: bool) -> Self {
        Self {
            id,
            nick: nick.into(),
            seat: None,
            human,
            ledger: ResearchLedger::new(),
            hand: Vec::new(),
            timers: TimerConfig::default(),
            fighting_time: 0.0,
            no_treasury_time: 0.0,
            lost_sent: false,
        }
    }

    pub fn with_timers(mut self, timers: TimerConfig) -> Self {
        self.timers = timers;
        self
    }

    pub fn timers(&self) -> TimerConfig {
        self.timers
    }

    // -- Availability --

    pub fn is_spell_available(&self, spell: SpellType) -> bool {
        spell
            .research()
            .is_some_and(|r| self.ledger.is_research_done(r))
    }

    pub fn is_room_available(&self, room: RoomType) -> bool {
        self.ledger.is_research_done(room.research())
    }

    pub fn is_trap_available(&self, trap: TrapType) -> bool {
        self.ledger.is_research_done(trap.research())
    }

    // -- Hand --

    pub fn hand(&self) -> &[Entity] {
        &self.hand
    }

    pub fn hand_len(&self) -> usize {
        self.hand.len()
    }

    /// Put an entity at the front of the hand.
    pub fn pick_up(&mut self, entity: Entity) {
        self.hand.insert(0, entity);
    }

    /// Take the entity at `index` out of the hand.
    pub fn drop_hand(&mut self, index: usize) -> Result<Entity, HandError> {
        if index >= self.hand.len() {
            error!(
                player = %self.nick,
                index,
                len = self.hand.len(),
                "drop from hand out of bounds"
            );
            return Err(HandError::IndexOutOfBounds {
                index,
                len: self.hand.len(),
            });
        }
        Ok(self.hand.remove(index))
    }

    /// Undo a [`drop_hand`](Self::drop_hand) whose target refused the entity.
    pub(crate) fn put_back(&mut self, index: usize, entity: Entity) {
        let index = index.min(self.hand.len());
        self.hand.insert(index, entity);
    }

    /// Rotate the hand by one. Returns whether anything moved.
    pub fn rotate_hand(&mut self, direction: Direction) -> bool {
        if self.hand.len() < 2 {
            return false;
        }
        match direction {
            Direction::Left => self.hand.rotate_left(1),
            Direction::Right => self.hand.rotate_right(1),
        }
        true
    }

    // -- Timers --

    pub fn is_fighting(&self) -> bool {
        self.fighting_time > 0.0
    }

    /// Restart the fighting timer. Returns `true` when the player was not
    /// fighting before.
    pub fn notify_fighting(&mut self) -> bool {
        let started = !self.is_fighting();
        self.fighting_time = self.timers.battle_time;
        started
    }

    /// Returns `true` when the player should be warned now; warnings are
    /// spaced by the configured no-treasury time.
    pub fn notify_no_treasury(&mut self) -> bool {
        if self.no_treasury_time > 0.0 {
            return false;
        }
        self.no_treasury_time = self.timers.no_treasury_time;
        true
    }

    /// Returns `true` the first time only.
    pub fn mark_lost(&mut self) -> bool {
        !std::mem::replace(&mut self.lost_sent, true)
    }

    pub fn update_time(&mut self, dt: f32) -> TimerEdges {
        let mut edges = TimerEdges::default();
        if self.fighting_time > 0.0 {
            if self.fighting_time > dt {
                self.fighting_time -= dt;
            } else {
                self.fighting_time = 0.0;
                edges.stopped_fighting = true;
            }
        }
        if self.no_treasury_time > 0.0 {
            self.no_treasury_time = (self.no_treasury_time - dt).max(0.0);
        }
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityBody, EntityHeader, Position};
    use underkeep_core::test_utils::*;

    fn token(name: &str) -> Entity {
        Entity::new(
            EntityHeader::new(name, keeper(), Position::default()),
            EntityBody::ResearchCarrier {
                research: ResearchType::RoomCrypt,
            },
        )
    }

    fn names(player: &Player) -> Vec<&str> {
        player.hand().iter().map(Entity::name).collect()
    }

    #[test]
    fn pick_up_goes_to_front() {
        let mut player = Player::new(keeper_player(), "keeper", true);
        player.pick_up(token("a"));
        player.pick_up(token("b"));
        player.pick_up(token("c"));
        assert_eq!(names(&player), vec!["c", "b", "a"]);
    }

    #[test]
    fn drop_out_of_bounds_is_logged_and_harmless() {
        let mut player = Player::new(keeper_player(), "keeper", true);
        player.pick_up(token("a"));

        let (result, logs) = capture_logs(|| player.drop_hand(3));
        assert_eq!(result, Err(HandError::IndexOutOfBounds { index: 3, len: 1 }));
        assert_eq!(diagnostics(&logs).len(), 1);
        assert_eq!(player.hand_len(), 1);

        assert_eq!(player.drop_hand(0).unwrap().name(), "a");
        assert!(player.drop_hand(0).is_err());
    }

    #[test]
    fn rotate_hand_both_ways() {
        let mut player = Player::new(keeper_player(), "keeper", true);
        assert!(!player.rotate_hand(Direction::Left));
        for name in ["a", "b", "c"] {
            player.pick_up(token(name));
        }
        assert!(player.rotate_hand(Direction::Left));
        assert_eq!(names(&player), vec!["b", "a", "c"]);
        assert!(player.rotate_hand(Direction::Right));
        assert_eq!(names(&player), vec!["c", "b", "a"]);
    }

    #[test]
    fn fighting_timer_edges() {
        let mut player = Player::new(keeper_player(), "keeper", true);
        assert!(player.notify_fighting());
        assert!(!player.notify_fighting());

        assert_eq!(player.update_time(6.0), TimerEdges::default());
        assert!(player.is_fighting());
        assert!(player.update_time(6.0).stopped_fighting);
        assert!(!player.is_fighting());
        assert!(!player.update_time(6.0).stopped_fighting);
    }

    #[test]
    fn no_treasury_warning_is_rate_limited() {
        let mut player = Player::new(keeper_player(), "keeper", true);
        assert!(player.notify_no_treasury());
        assert!(!player.notify_no_treasury());
        player.update_time(29.0);
        assert!(!player.notify_no_treasury());
        player.update_time(1.0);
        assert!(player.notify_no_treasury());
    }

    #[test]
    fn configured_battle_time_is_used() {
        let mut player = Player::new(keeper_player(), "keeper", true).with_timers(TimerConfig {
            battle_time: 2.0,
            ..TimerConfig::default()
        });
        player.notify_fighting();
        assert!(player.update_time(2.5).stopped_fighting);
    }

    #[test]
    fn lost_is_reported_once() {
        let mut player = Player::new(keeper_player(), "keeper", true);
        assert!(player.mark_lost());
        assert!(!player.mark_lost());
    }

    #[test]
    fn availability_follows_done_set() {
        let player = Player::new(keeper_player(), "keeper", true);
        assert!(!player.is_room_available(RoomType::Library));
        assert!(!player.is_trap_available(TrapType::Spike));
        assert!(!player.is_spell_available(SpellType::CallToWar));
        assert!(!player.is_spell_available(SpellType::Null));
    }
}
