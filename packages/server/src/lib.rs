//! Ephemeral room-scoped chat server library.
//!
//! Clients join a named room over a WebSocket, exchange JSON messages and see
//! presence. Room metadata and membership live in a shared store, messages are
//! distributed through a per-room pub/sub broker, so any number of stateless
//! server instances can host connections for the same room.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
