use serde::{Deserialize, Serialize};

/// Which side of the replication boundary a piece of state lives on.
///
/// The authority validates requests, owns the simulation and emits
/// notifications. A replica mirrors what the authority announced and only
/// raises refresh flags for its presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Authority,
    Replica,
}

impl Role {
    pub fn is_authority(self) -> bool {
        matches!(self, Role::Authority)
    }
}
