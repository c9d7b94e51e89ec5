//! Input command queue for player-issued requests.
//!
//! Requests arrive between ticks (from the network or the local client) and
//! are applied in submission order at the start of the next upkeep, so the
//! simulation only ever mutates from inside the tick.

use crate::player::Direction;
use crate::spell::{SpellTarget, SpellType};
use underkeep_core::id::{EntityId, PlayerId, TilePos};
use underkeep_research::ResearchType;

// ---------------------------------------------------------------------------
// Command enum
// ---------------------------------------------------------------------------

/// A single request made by a player.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Replace the player's pending research queue.
    SetResearchTree {
        player: PlayerId,
        researches: Vec<ResearchType>,
    },
    /// Cast a spell on targets obtained from a quote.
    CastSpell {
        player: PlayerId,
        spell: SpellType,
        targets: Vec<SpellTarget>,
    },
    /// Pick an entity up into the player's hand.
    PickUp { player: PlayerId, entity: EntityId },
    /// Drop the entity at `index` of the hand onto `tile`.
    DropHand {
        player: PlayerId,
        index: usize,
        tile: TilePos,
    },
    RotateHand {
        player: PlayerId,
        direction: Direction,
    },
}

impl Command {
    pub fn player(&self) -> PlayerId {
        match self {
            Command::SetResearchTree { player, .. }
            | Command::CastSpell { player, .. }
            | Command::PickUp { player, .. }
            | Command::DropHand { player, .. }
            | Command::RotateHand { player, .. } => *player,
        }
    }
}

// ---------------------------------------------------------------------------
// CommandQueue
// ---------------------------------------------------------------------------

/// Commands waiting for the next tick, with optional history for replay and
/// debugging.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    pending: Vec<Command>,
    /// Applied commands with the tick they were applied on.
    history: Vec<(u64, Command)>,
    /// 0 = no history.
    max_history: usize,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue that retains up to `max_history` applied commands.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            max_history,
            ..Self::default()
        }
    }

    pub fn push(&mut self, command: Command) {
        self.pending.push(command);
    }

    pub fn push_batch(&mut self, commands: impl IntoIterator<Item = Command>) {
        self.pending.extend(commands);
    }

    /// Take every pending command in submission order, recording them in the
    /// history under `tick`.
    pub fn drain(&mut self, tick: u64) -> Vec<Command> {
        let commands = std::mem::take(&mut self.pending);

        if self.max_history > 0 {
            self.history
                .extend(commands.iter().cloned().map(|cmd| (tick, cmd)));
            let excess = self.history.len().saturating_sub(self.max_history);
            self.history.drain(..excess);
        }

        commands
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn history(&self) -> &[(u64, Command)] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}
