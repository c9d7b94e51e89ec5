//! Faction registry: seats, teams and alliance relations.
//!
//! A seat is a faction slot in a game. Seats sharing a [`TeamId`] are allied;
//! the relation is reflexive and symmetric by construction because it is
//! computed from team membership rather than stored pairwise.

use crate::id::{PlayerId, SeatId, TeamId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The player controlling a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatOccupant {
    pub player: PlayerId,
    /// Computer-controlled occupants never receive outbound messages.
    pub human: bool,
}

/// A faction slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub id: SeatId,
    pub team: TeamId,
    pub occupant: Option<SeatOccupant>,
}

impl Seat {
    /// The player controlling this seat if that player is human.
    pub fn human_player(&self) -> Option<PlayerId> {
        self.occupant.filter(|o| o.human).map(|o| o.player)
    }
}

/// Errors that can occur while configuring seats.
#[derive(Debug, thiserror::Error)]
pub enum SeatError {
    #[error("duplicate seat id: {0:?}")]
    DuplicateSeat(SeatId),

    #[error("seat not found: {0:?}")]
    SeatNotFound(SeatId),

    #[error("seat {seat:?} is already claimed by {player:?}")]
    SeatTaken { seat: SeatId, player: PlayerId },
}

// ---------------------------------------------------------------------------
// SeatRegistry
// ---------------------------------------------------------------------------

/// Static per-game set of seats. Configured at session setup, queried by
/// every other component afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatRegistry {
    seats: Vec<Seat>,
}

impl SeatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an unclaimed seat on the given team.
    pub fn register(&mut self, id: SeatId, team: TeamId) -> Result<SeatId, SeatError> {
        if self.get(id).is_some() {
            return Err(SeatError::DuplicateSeat(id));
        }
        self.seats.push(Seat {
            id,
            team,
            occupant: None,
        });
        Ok(id)
    }

    /// Give control of a seat to a player.
    pub fn claim(&mut self, id: SeatId, player: PlayerId, human: bool) -> Result<(), SeatError> {
        let seat = self
            .seats
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(SeatError::SeatNotFound(id))?;

        if let Some(existing) = seat.occupant
            && existing.player != player
        {
            return Err(SeatError::SeatTaken {
                seat: id,
                player: existing.player,
            });
        }

        seat.occupant = Some(SeatOccupant { player, human });
        Ok(())
    }

    /// Remove the occupant of a seat. Returns the previous occupant, if any.
    pub fn release(&mut self, id: SeatId) -> Option<SeatOccupant> {
        self.seats
            .iter_mut()
            .find(|s| s.id == id)
            .and_then(|s| s.occupant.take())
    }

    pub fn get(&self, id: SeatId) -> Option<&Seat> {
        self.seats.iter().find(|s| s.id == id)
    }

    /// All seats in registration order.
    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    /// Whether two seats are allied. A seat is always allied with itself,
    /// even if it is not registered.
    pub fn is_allied(&self, a: SeatId, b: SeatId) -> bool {
        if a == b {
            return true;
        }
        match (self.get(a), self.get(b)) {
            (Some(sa), Some(sb)) => sa.team == sb.team,
            _ => false,
        }
    }

    /// Seats allied with `id`, excluding `id` itself.
    pub fn allied_seats(&self, id: SeatId) -> Vec<SeatId> {
        let Some(team) = self.get(id).map(|s| s.team) else {
            return Vec::new();
        };
        self.seats
            .iter()
            .filter(|s| s.id != id && s.team == team)
            .map(|s| s.id)
            .collect()
    }

    /// The human player controlling a seat, or `None` for unclaimed and
    /// computer-controlled seats.
    pub fn human_player(&self, id: SeatId) -> Option<PlayerId> {
        self.get(id).and_then(Seat::human_player)
    }

    /// The seat controlled by a player.
    pub fn seat_of_player(&self, player: PlayerId) -> Option<SeatId> {
        self.seats
            .iter()
            .find(|s| s.occupant.is_some_and(|o| o.player == player))
            .map(|s| s.id)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
