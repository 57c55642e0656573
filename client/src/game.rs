//! Local replica of the server's world.
//!
//! The replica never simulates; it only applies the server's frames.
//! Entities appear when first mentioned and disappear according to their
//! lifecycle flags: tanks on disconnect, projectiles and powerups on
//! death. Each beam is broadcast exactly once, so beams are collected
//! until the consumer drains them.

use shared::protocol::{self, ProtocolError};
use shared::{Beam, Powerup, Projectile, ServerMessage, Tank, Wall};
use std::collections::HashMap;

/// Everything the client knows about the arena.
#[derive(Default)]
pub struct ClientWorld {
    /// Our tank's id, from the first handshake line.
    pub player_id: Option<u32>,
    /// Side length of the square world, from the second handshake line.
    pub world_size: Option<i64>,
    pub walls: HashMap<u32, Wall>,
    pub tanks: HashMap<u32, Tank>,
    pub projectiles: HashMap<u32, Projectile>,
    pub powerups: HashMap<u32, Powerup>,
    /// Beams received since the last [`take_beams`](Self::take_beams).
    pub beams: Vec<Beam>,
}

impl ClientWorld {
    pub fn new() -> Self {
        ClientWorld::default()
    }

    /// Applies one batch of complete lines received from the server.
    /// A read batch carries no frame boundary, so nothing is discarded
    /// here; beams persist until [`take_beams`](Self::take_beams).
    pub fn apply_lines<'a>(
        &mut self,
        lines: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ProtocolError> {
        for line in lines {
            self.apply_message(protocol::decode_message(line)?);
        }
        Ok(())
    }

    /// Applies one decoded message, inserting, updating, or removing the
    /// entity it describes.
    pub fn apply_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Wall(wall) => {
                self.walls.insert(wall.id, wall);
            }
            ServerMessage::Tank(tank) => {
                if tank.dc {
                    self.tanks.remove(&tank.id);
                } else {
                    self.tanks.insert(tank.id, tank);
                }
            }
            ServerMessage::Projectile(proj) => {
                if proj.died {
                    self.projectiles.remove(&proj.id);
                } else {
                    self.projectiles.insert(proj.id, proj);
                }
            }
            ServerMessage::Powerup(powerup) => {
                if powerup.died {
                    self.powerups.remove(&powerup.id);
                } else {
                    self.powerups.insert(powerup.id, powerup);
                }
            }
            ServerMessage::Beam(beam) => {
                self.beams.push(beam);
            }
        }
    }

    /// Removes and returns every beam received since the last call.
    /// Each beam crosses the wire once, so draining here guarantees the
    /// consumer observes each one exactly once.
    pub fn take_beams(&mut self) -> Vec<Beam> {
        std::mem::take(&mut self.beams)
    }

    /// The tank we control, once the server has broadcast it.
    pub fn own_tank(&self) -> Option<&Tank> {
        self.player_id.and_then(|id| self.tanks.get(&id))
    }

    /// Current standings, highest score first.
    pub fn scoreboard(&self) -> Vec<(&str, u32)> {
        let mut rows: Vec<(&str, u32)> = self
            .tanks
            .values()
            .map(|tank| (tank.name.as_str(), tank.score))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        rows
    }
}
