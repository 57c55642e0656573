//! Shared library for the tank-arena game.
//!
//! Holds everything both sides of the wire agree on: 2D vector math, the
//! domain entities with their wire-exact JSON shapes, the newline-delimited
//! framing layer, the typed game configuration, and the asynchronous TCP
//! socket abstraction used by server and client alike.

pub mod config;
pub mod entities;
pub mod net;
pub mod protocol;
pub mod vector;

pub use config::{GameConfig, WallSpec};
pub use entities::{Beam, ControlCommand, Fire, Moving, Powerup, Projectile, Tank, Wall};
pub use net::{Connection, NetError, NetEvent};
pub use protocol::{ProtocolError, ServerMessage};
pub use vector::Vec2D;
