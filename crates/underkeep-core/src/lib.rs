//! Underkeep Core -- shared building blocks of the authoritative replication layer.
//!
//! This crate holds the pieces every other Underkeep crate depends on: typed
//! identifiers, the faction registry, the per-entity visibility notifier, the
//! outbound notification channel, and the two codec primitives (binary wire
//! packets and tab-delimited text streams) that entity serialization is built on.
//!
//! # Tick Model
//!
//! The simulation is single-writer. Every mutation of seat, visibility or
//! ledger state happens from the simulation tick through `&mut` borrows; the
//! only cross-thread boundary is [`notification::NotificationReceiver`], which
//! a transport layer may drain concurrently with enqueueing.
//!
//! # Key Types
//!
//! - [`seat::SeatRegistry`] -- factions (seats), teams and alliance queries.
//! - [`visibility::VisibilityRecord`] -- which seats were told an entity exists,
//!   and the add/remove diff when that set changes.
//! - [`notification::NotificationSender`] -- enqueue side of the outbound queue.
//! - [`packet::Packet`] / [`packet::PacketReader`] -- sequential binary fields.
//! - [`role::Role`] -- authority or replica side of a session.
//! - [`stream::StreamWriter`] / [`stream::StreamReader`] -- tab-delimited text.

pub mod id;
pub mod notification;
pub mod packet;
pub mod role;
pub mod seat;
pub mod stream;
pub mod visibility;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
