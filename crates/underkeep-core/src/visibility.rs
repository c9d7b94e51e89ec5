//! Visibility-gated notification diffing.
//!
//! Every observable entity keeps a [`VisibilityRecord`]: the seats that were
//! told the entity exists. Each tick the simulation computes which seats
//! should see the entity and calls [`VisibilityRecord::update`], which brings
//! the record in line and returns the minimal add/remove diff.
//!
//! The owning seat and its allies are always kept in the record, whatever
//! the raw vision input says. Events are only produced for seats controlled
//! by a human player; other seats are tracked silently.

use crate::id::{PlayerId, SeatId};
use crate::seat::SeatRegistry;
use serde::{Deserialize, Serialize};

/// An outbound visibility change for one human-controlled seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityEvent {
    /// The seat gained sight of the entity; send it the full state.
    Add { seat: SeatId, player: PlayerId },
    /// The seat lost sight of the entity; send the identity only.
    Remove { seat: SeatId, player: PlayerId },
}

impl VisibilityEvent {
    pub fn seat(&self) -> SeatId {
        match self {
            VisibilityEvent::Add { seat, .. } | VisibilityEvent::Remove { seat, .. } => *seat,
        }
    }

    pub fn player(&self) -> PlayerId {
        match self {
            VisibilityEvent::Add { player, .. } | VisibilityEvent::Remove { player, .. } => *player,
        }
    }
}

/// Seats currently informed of one entity. Owned by the entity's container
/// and dropped with the entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityRecord {
    notified: Vec<SeatId>,
}

impl VisibilityRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seats in the order they were added.
    pub fn seats(&self) -> &[SeatId] {
        &self.notified
    }

    pub fn contains(&self, seat: SeatId) -> bool {
        self.notified.contains(&seat)
    }

    pub fn is_empty(&self) -> bool {
        self.notified.is_empty()
    }

    /// Reconcile the record with the seats that should see the entity now.
    ///
    /// Runs three passes: evict seats that lost vision (never `owner` or an
    /// ally of `owner`), add seats that gained vision, then force `owner` and
    /// its allies in. A seat is evicted in the same step its remove event is
    /// produced.
    pub fn update(
        &mut self,
        owner: SeatId,
        seats_with_vision: &[SeatId],
        registry: &SeatRegistry,
    ) -> Vec<VisibilityEvent> {
        let mut events = Vec::new();

        self.notified.retain(|&seat| {
            if seats_with_vision.contains(&seat) || registry.is_allied(owner, seat) {
                return true;
            }
            if let Some(player) = registry.human_player(seat) {
                events.push(VisibilityEvent::Remove { seat, player });
            }
            false
        });

        let forced = std::iter::once(owner).chain(registry.allied_seats(owner));
        for seat in seats_with_vision.iter().copied().chain(forced) {
            if self.notified.contains(&seat) {
                continue;
            }
            self.notified.push(seat);
            if let Some(player) = registry.human_player(seat) {
                events.push(VisibilityEvent::Add { seat, player });
            }
        }

        events
    }

    /// Forget `seat` without producing an event, so the next
    /// [`update`](Self::update) that finds it seeing the entity adds it again.
    /// Returns whether the seat was present.
    pub fn evict(&mut self, seat: SeatId) -> bool {
        let before = self.notified.len();
        self.notified.retain(|&s| s != seat);
        self.notified.len() != before
    }

    /// Evict every seat, e.g. when the entity leaves the world.
    pub fn clear(&mut self, registry: &SeatRegistry) -> Vec<VisibilityEvent> {
        self.notified
            .drain(..)
            .filter_map(|seat| {
                registry
                    .human_player(seat)
                    .map(|player| VisibilityEvent::Remove { seat, player })
            })
            .collect()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn adds(events: &[VisibilityEvent]) -> Vec<SeatId> {
        events
            .iter()
            .filter(|e| matches!(e, VisibilityEvent::Add { .. }))
            .map(VisibilityEvent::seat)
            .collect()
    }

    fn removes(events: &[VisibilityEvent]) -> Vec<SeatId> {
        events
            .iter()
            .filter(|e| matches!(e, VisibilityEvent::Remove { .. }))
            .map(VisibilityEvent::seat)
            .collect()
    }

    #[test]
    fn owner_and_allies_forced_on_first_update() {
        let seats = keeper_seats();
        let mut record = VisibilityRecord::new();

        let events = record.update(keeper(), &[], &seats);

        // Owner and computer ally are recorded; only the human owner is told.
        assert!(record.contains(keeper()));
        assert!(record.contains(ally()));
        assert!(!record.contains(rival()));
        assert_eq!(adds(&events), vec![keeper()]);
        assert!(removes(&events).is_empty());
    }

    #[test]
    fn second_update_with_same_input_is_silent() {
        let seats = keeper_seats();
        let mut record = VisibilityRecord::new();
        record.update(keeper(), &[rival()], &seats);

        let events = record.update(keeper(), &[rival()], &seats);
        assert!(events.is_empty());
    }

    #[test]
    fn enemy_gains_then_loses_vision() {
        let seats = keeper_seats();
        let mut record = VisibilityRecord::new();
        record.update(keeper(), &[], &seats);

        let events = record.update(keeper(), &[rival()], &seats);
        assert_eq!(adds(&events), vec![rival()]);

        let events = record.update(keeper(), &[], &seats);
        assert_eq!(removes(&events), vec![rival()]);
        assert!(!record.contains(rival()));
    }

    #[test]
    fn allies_never_removed() {
        let seats = keeper_seats();
        let mut record = VisibilityRecord::new();
        record.update(keeper(), &[keeper(), ally()], &seats);

        // Raw vision drops everyone; alliance keeps owner and ally.
        let events = record.update(keeper(), &[], &seats);
        assert!(events.is_empty());
        assert!(record.contains(keeper()));
        assert!(record.contains(ally()));
    }

    #[test]
    fn computer_seats_tracked_without_events() {
        let seats = keeper_seats();
        let mut record = VisibilityRecord::new();

        // Rival owns the entity; the computer seat gains raw vision.
        let events = record.update(rival(), &[ally()], &seats);
        assert!(record.contains(ally()));
        assert_eq!(adds(&events), vec![rival()]);

        let events = record.update(rival(), &[], &seats);
        assert!(!record.contains(ally()));
        assert!(events.is_empty());
    }

    #[test]
    fn duplicate_input_seats_add_once() {
        let seats = keeper_seats();
        let mut record = VisibilityRecord::new();
        let events = record.update(rival(), &[keeper(), keeper()], &seats);
        assert_eq!(adds(&events), vec![keeper(), rival()]);
        assert_eq!(record.seats().iter().filter(|s| **s == keeper()).count(), 1);
    }

    #[test]
    fn unclaimed_seat_is_silent() {
        let seats = keeper_seats();
        let mut record = VisibilityRecord::new();
        let events = record.update(keeper(), &[neutral()], &seats);
        assert!(record.contains(neutral()));
        assert_eq!(adds(&events), vec![keeper()]);
    }

    #[test]
    fn clear_removes_everyone_and_reports_humans() {
        let seats = keeper_seats();
        let mut record = VisibilityRecord::new();
        record.update(keeper(), &[rival()], &seats);

        let events = record.clear(&seats);
        assert!(record.is_empty());
        let mut removed = removes(&events);
        removed.sort();
        assert_eq!(removed, vec![keeper(), rival()]);
    }

    #[test]
    fn evicted_seat_is_added_again() {
        let seats = keeper_seats();
        let mut record = VisibilityRecord::new();
        record.update(keeper(), &[rival()], &seats);

        assert!(record.evict(rival()));
        assert!(!record.evict(rival()));
        let events = record.update(keeper(), &[rival()], &seats);
        assert_eq!(adds(&events), vec![rival()]);
    }

    #[test]
    fn events_carry_controlling_player() {
        let seats = keeper_seats();
        let mut record = VisibilityRecord::new();
        let events = record.update(keeper(), &[rival()], &seats);
        let rival_event = events.iter().find(|e| e.seat() == rival()).unwrap();
        assert_eq!(rival_event.player(), rival_player());
    }
}
