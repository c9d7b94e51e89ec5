//! Binary wire packets for live replication.
//!
//! A packet is an ordered sequence of fields with no framing: each field is
//! written with bincode's fixed-width encoding, so a reader must know the
//! field order and each field's type. Strings and sequences carry their own
//! length and are therefore self-delimiting. Reads are bounded by the bytes
//! left in the packet, so a corrupt length prefix fails instead of
//! allocating.

use bincode::Options;
use serde::Serialize;
use serde::de::DeserializeOwned;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while writing or reading packet fields.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("packet encoding failed: {0}")]
    Encode(String),
    #[error("packet decoding failed: {0}")]
    Decode(String),
    #[error("list of {0} entries exceeds the u32 count field")]
    ListTooLong(usize),
}

// ---------------------------------------------------------------------------
// Packet (writer)
// ---------------------------------------------------------------------------

/// An outbound packet under construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    bytes: Vec<u8>,
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one field.
    pub fn put<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<&mut Self, PacketError> {
        bincode::serialize_into(&mut self.bytes, value)
            .map_err(|e| PacketError::Encode(e.to_string()))?;
        Ok(self)
    }

    /// Append a `u32` count followed by each entry.
    pub fn put_list<T: Serialize>(&mut self, items: &[T]) -> Result<&mut Self, PacketError> {
        let count = u32::try_from(items.len()).map_err(|_| PacketError::ListTooLong(items.len()))?;
        self.put(&count)?;
        for item in items {
            self.put(item)?;
        }
        Ok(self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// PacketReader
// ---------------------------------------------------------------------------

/// Sequential reader over a received packet.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    remaining: &'a [u8],
}

impl<'a> PacketReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { remaining: bytes }
    }

    /// Read the next field.
    pub fn get<T: DeserializeOwned>(&mut self) -> Result<T, PacketError> {
        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .with_limit(self.remaining.len() as u64)
            .deserialize_from(&mut self.remaining)
            .map_err(|e| PacketError::Decode(e.to_string()))
    }

    /// Read a `u32` count followed by that many entries.
    pub fn get_list<T: DeserializeOwned>(&mut self) -> Result<Vec<T>, PacketError> {
        let count: u32 = self.get()?;
        // The count comes off the wire; do not trust it for preallocation.
        let mut items = Vec::with_capacity((count as usize).min(self.remaining.len()));
        for _ in 0..count {
            items.push(self.get()?);
        }
        Ok(items)
    }

    /// Bytes not consumed yet.
    pub fn remaining(&self) -> &'a [u8] {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
