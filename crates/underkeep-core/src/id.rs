use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies an entity owned by the world container.
    pub struct EntityId;
}

/// Identifies a seat (faction). Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeatId(pub u32);

/// Identifies a team. Seats sharing a team are allied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamId(pub u32);

/// Identifies a connected player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

/// A tile coordinate on the map grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TilePos {
    pub x: i32,
    pub y: i32,
}

impl TilePos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance: the number of king moves between two tiles.
    pub fn chebyshev(self, other: TilePos) -> u32 {
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        dx.max(dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat_id_ordering() {
        assert!(SeatId(1) < SeatId(2));
        assert_eq!(SeatId(3), SeatId(3));
    }

    #[test]
    fn chebyshev_distance() {
        let a = TilePos::new(0, 0);
        assert_eq!(a.chebyshev(TilePos::new(3, -2)), 3);
        assert_eq!(a.chebyshev(a), 0);
        assert_eq!(TilePos::new(-4, 1).chebyshev(TilePos::new(2, 2)), 6);
    }

    #[test]
    fn ids_are_hashable() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(PlayerId(0), "keeper");
        map.insert(PlayerId(1), "rival");
        assert_eq!(map[&PlayerId(1)], "rival");
    }
}
