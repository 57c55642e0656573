//! # Tank Arena Server Library
//!
//! Authoritative server for the tank-arena game. It owns the canonical
//! world, consumes client commands, and broadcasts the full world state
//! to every joined client once per simulation tick.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! All gameplay decisions happen here. Clients only send intent (move,
//! fire, aim); the server resolves movement, collisions, damage, scoring,
//! respawns, and powerup spawning, and its broadcast frames are the only
//! truth clients ever see.
//!
//! ### Client Lifecycle
//! Each TCP connection goes through a two-phase protocol: a plain-text
//! name line to join, then newline-delimited JSON command lines. On
//! disconnect the player's tank is flagged dead and removed after one
//! final broadcast so every other client observes the departure.
//!
//! ### State Broadcasting
//! After every tick the world is serialized once into a newline-delimited
//! JSON frame and the identical string is fanned out to all joined
//! clients. Entities that just died stay in exactly one frame with their
//! death flag raised before being dropped.
//!
//! ## Architecture
//!
//! A single event loop multiplexes the tick timer and all network events
//! with `tokio::select!`, so command latching, simulation, and broadcast
//! never race. Socket reads and writes happen on background tasks; the
//! loop only ever sees buffered text and completed lifecycle events.
//!
//! ## Module Organization
//!
//! ### World Module (`world`)
//! The canonical entity containers and the fixed-order tick phases, plus
//! the guarded wrapper serializing access from the event loop.
//!
//! ### Controller Module (`controller`)
//! The listener, per-client handshake phases, command decoding, and the
//! broadcast cadence.

pub mod controller;
pub mod world;
