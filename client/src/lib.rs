//! # Tank Arena Client Library
//!
//! Client-side implementation for the tank-arena game: connecting and
//! joining, decoding the server's newline-delimited JSON frames, and
//! maintaining a local replica of the world.
//!
//! The client never simulates. The server is authoritative for every
//! entity; this library's job is to mirror its broadcasts faithfully
//! and to forward the player's intent as JSON command lines.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The local world replica: entity containers keyed by id, the removal
//! rules driven by lifecycle flags, and scoreboard derivation.
//!
//! ### Network Module (`network`)
//! The connection, the two-line handshake, frame draining, and command
//! sending.

pub mod game;
pub mod network;
