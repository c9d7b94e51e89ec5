//! Underkeep World -- entities, spells, players and the session loop.
//!
//! Builds on `underkeep-core` (seats, visibility, codecs primitives) and
//! `underkeep-research` (catalog and ledger) to run one side of a game.
//!
//! # Upkeep Pipeline
//!
//! Each call to [`session::Session::upkeep`] on the authority runs:
//!
//! 1. **Commands** -- Apply queued player requests in submission order.
//! 2. **Spells** -- Count down spell lifetimes and remove expired spells.
//! 3. **Timers** -- Advance player timers (fighting, no-treasury).
//! 4. **Visibility** -- Recompute which seats see each entity.
//! 5. **Flush** -- Turn ledger and world events into notifications for
//!    human players.
//!
//! # Key Types
//!
//! - [`world::World`] -- Owns every entity, its visibility record, mana and
//!   tile claims.
//! - [`codec::EntityCodecRegistry`] -- Tag-dispatched stream and packet codecs.
//! - [`spell::SpellRegistry`] -- Spell type to quote/cast behavior table.
//! - [`player::Player`] -- Research ledger, hand and timers of one player.
//! - [`session::Session`] -- Explicit context tying the above together.
//! - [`snapshot`] -- Versioned binary snapshots via bitcode.

pub mod codec;
pub mod commands;
pub mod entity;
pub mod player;
pub mod session;
pub mod snapshot;
pub mod spell;
pub mod world;
