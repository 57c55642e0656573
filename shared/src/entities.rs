//! Domain entities shared by server and client.
//!
//! Every entity serializes to the self-describing JSON object the wire
//! protocol expects: the discriminator key ("tank", "proj", "beam",
//! "power", "wall") carries the entity id, and server-internal fields
//! (velocity, counters) are skipped.

use crate::vector::Vec2D;
use serde::{Deserialize, Serialize};

/// A player's tank. Never removed from the world while its client is
/// connected; death is signalled through `hp == 0` and the one-tick
/// `died` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tank {
    #[serde(rename = "tank")]
    pub id: u32,
    pub loc: Vec2D,
    /// Body orientation; persists while the tank is stopped.
    pub bdir: Vec2D,
    /// Turret aim direction, taken from the latest command.
    pub tdir: Vec2D,
    pub name: String,
    pub hp: u32,
    pub score: u32,
    /// Set the tick the tank dies, cleared after one broadcast.
    pub died: bool,
    /// Set when the owning client disconnects; persists until removal.
    pub dc: bool,
    /// Set the tick the tank joins, cleared after one broadcast.
    pub join: bool,

    #[serde(skip)]
    pub velocity: Vec2D,
    /// Ticks remaining until the main weapon may fire again.
    #[serde(skip)]
    pub shot_cooldown: u32,
    #[serde(skip)]
    pub powerup_count: u32,
    /// Ticks remaining until a dead tank respawns.
    #[serde(skip)]
    pub respawn_counter: u32,
}

impl Tank {
    pub fn new(id: u32, name: String, loc: Vec2D, max_hp: u32, respawn_rate: u32) -> Self {
        let facing = Vec2D::new(0.0, -1.0);
        Tank {
            id,
            loc,
            bdir: facing,
            tdir: facing,
            name,
            hp: max_hp,
            score: 0,
            died: false,
            dc: false,
            join: true,
            velocity: Vec2D::default(),
            shot_cooldown: 0,
            powerup_count: 0,
            respawn_counter: respawn_rate,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }
}

/// A traveling round fired by the main weapon. Marked `died` on impact
/// or when it leaves the world, and removed one broadcast later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Projectile {
    #[serde(rename = "proj")]
    pub id: u32,
    pub loc: Vec2D,
    pub dir: Vec2D,
    pub died: bool,
    pub owner: u32,

    #[serde(skip)]
    pub velocity: Vec2D,
}

impl Projectile {
    pub fn new(id: u32, owner: u32, loc: Vec2D, dir: Vec2D, speed: f64) -> Self {
        Projectile {
            id,
            loc,
            dir,
            died: false,
            owner,
            velocity: dir.scale(speed),
        }
    }

    /// Circle test against a tank's collision radius (half the tank size).
    pub fn collides_tank(&self, tank_loc: &Vec2D, tank_size: f64) -> bool {
        self.loc.sub(tank_loc).magnitude() < tank_size / 2.0
    }
}

/// An instantaneous hit-scan weapon. Created and resolved within a
/// single tick; broadcast once, then removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Beam {
    #[serde(rename = "beam")]
    pub id: u32,
    pub org: Vec2D,
    pub dir: Vec2D,
    pub owner: u32,
}

impl Beam {
    pub fn new(id: u32, owner: u32, org: Vec2D, dir: Vec2D) -> Self {
        Beam {
            id,
            org,
            dir,
            owner,
        }
    }

    /// Ray-circle intersection against a tank's collision circle.
    ///
    /// With P = org + t * dir and the circle (P-C)·(P-C) = r², solving
    /// for t gives a quadratic; a negative discriminant is a miss, and
    /// the beam hits only when both roots are positive (the circle lies
    /// entirely in front of the origin).
    pub fn intersects_tank(&self, tank_loc: &Vec2D, tank_size: f64) -> bool {
        let radius = tank_size / 2.0;
        let offset = self.org.sub(tank_loc);

        let a = self.dir.dot(&self.dir);
        let b = offset.scale(2.0).dot(&self.dir);
        let c = offset.dot(&offset) - radius * radius;

        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 {
            return false;
        }

        // Only the signs of the roots matter, so dividing by 2a is skipped.
        let root1 = -b + disc.sqrt();
        let root2 = -b - disc.sqrt();
        root1 > 0.0 && root2 > 0.0
    }
}

/// A collectible that arms the alternate (beam) weapon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Powerup {
    #[serde(rename = "power")]
    pub id: u32,
    pub loc: Vec2D,
    pub died: bool,
}

impl Powerup {
    pub fn new(id: u32, loc: Vec2D) -> Self {
        Powerup {
            id,
            loc,
            died: false,
        }
    }

    pub fn collides_tank(&self, tank_loc: &Vec2D, tank_size: f64) -> bool {
        self.loc.sub(tank_loc).magnitude() < tank_size / 2.0
    }
}

/// A static axis-aligned wall segment between two endpoints. Loaded once
/// at startup and broadcast only during the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wall {
    #[serde(rename = "wall")]
    pub id: u32,
    pub p1: Vec2D,
    pub p2: Vec2D,
}

impl Wall {
    pub fn new(id: u32, p1: Vec2D, p2: Vec2D) -> Self {
        Wall { id, p1, p2 }
    }

    /// Tests whether a point falls inside this wall's bounding box grown
    /// by `padding` on every side.
    pub fn collides(&self, padding: f64, loc: &Vec2D) -> bool {
        let x_min = self.p1.x.min(self.p2.x);
        let x_max = self.p1.x.max(self.p2.x);
        let y_min = self.p1.y.min(self.p2.y);
        let y_max = self.p1.y.max(self.p2.y);

        x_min < loc.x + padding
            && x_max > loc.x - padding
            && y_min < loc.y + padding
            && y_max > loc.y - padding
    }
}

/// Movement direction requested by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Moving {
    #[default]
    None,
    Up,
    Down,
    Left,
    Right,
}

impl Moving {
    /// Unit vector for the direction, or zero for `None`.
    pub fn direction(&self) -> Vec2D {
        match self {
            Moving::None => Vec2D::default(),
            Moving::Up => Vec2D::new(0.0, -1.0),
            Moving::Down => Vec2D::new(0.0, 1.0),
            Moving::Left => Vec2D::new(-1.0, 0.0),
            Moving::Right => Vec2D::new(1.0, 0.0),
        }
    }
}

/// Weapon selection in a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Fire {
    #[default]
    None,
    Main,
    Alt,
}

/// One client input frame. A new command overwrites the previous one;
/// the server latches at most one per tick per player.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ControlCommand {
    pub moving: Moving,
    pub fire: Fire,
    pub tdir: Vec2D,
}
