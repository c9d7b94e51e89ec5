//! Binary snapshots of world and session state.
//!
//! Snapshots are `bitcode` blobs behind a versioned header. Transient state
//! (pending events, notification senders, codec and spell tables) is left
//! out and rebuilt on load.

use crate::player::Player;
use crate::world::World;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying an Underkeep snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x0D6E_0001;

/// Current format version. Increment when breaking the format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Header prepended to every snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Tick the snapshot was taken on.
    pub tick: u64,
}

impl SnapshotHeader {
    pub fn new(tick: u64) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            tick,
        }
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(SnapshotError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot<T> {
    header: SnapshotHeader,
    body: T,
}

fn encode<T: Serialize>(tick: u64, body: &T) -> Result<Vec<u8>, SnapshotError> {
    let snapshot = Snapshot {
        header: SnapshotHeader::new(tick),
        body,
    };
    bitcode::serialize(&snapshot).map_err(|e| SnapshotError::Encode(e.to_string()))
}

fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<(SnapshotHeader, T), SnapshotError> {
    let snapshot: Snapshot<T> =
        bitcode::deserialize(data).map_err(|e| SnapshotError::Decode(e.to_string()))?;
    snapshot.header.validate()?;
    Ok((snapshot.header, snapshot.body))
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

impl World {
    /// Serialize the world. Pending events are not included.
    pub fn save_snapshot(&self, tick: u64) -> Result<Vec<u8>, SnapshotError> {
        encode(tick, self)
    }

    /// Restore a world saved with [`save_snapshot`](Self::save_snapshot).
    /// Entity ids are preserved.
    pub fn load_snapshot(data: &[u8]) -> Result<(SnapshotHeader, World), SnapshotError> {
        decode(data)
    }
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Everything a session needs to resume besides its static configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub tick: u64,
    pub world: World,
    pub players: Vec<Player>,
}

impl SessionState {
    pub fn save(&self) -> Result<Vec<u8>, SnapshotError> {
        encode(self.tick, self)
    }

    pub fn load(data: &[u8]) -> Result<SessionState, SnapshotError> {
        decode(data).map(|(_, state)| state)
    }
}
