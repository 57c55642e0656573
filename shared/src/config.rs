use crate::vector::Vec2D;
use serde::{Deserialize, Serialize};

/// Endpoints of one static wall segment. Walls are axis-aligned: the two
/// points share either their x or their y coordinate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WallSpec {
    pub p1: Vec2D,
    pub p2: Vec2D,
}

/// Tunables consumed by the simulation and every entity factory.
///
/// Constructed once at startup (from defaults or a JSON file) and passed
/// by reference into the engine; never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Side length of the square world, in world units.
    pub universe_size: i64,
    /// Target milliseconds per simulation tick.
    pub ms_per_frame: u64,
    /// Ticks a tank must wait between main-weapon shots.
    pub frames_per_shot: u32,
    /// Ticks a dead tank waits before respawning.
    pub respawn_rate: u32,
    /// Hit points a tank spawns with.
    pub max_hp: u32,
    /// Distance a tank moves per tick while a movement key is held.
    pub engine_power: f64,
    /// Tank model size; collision radius is half this.
    pub tank_size: f64,
    /// Distance a projectile moves per tick.
    pub projectile_speed: f64,
    /// Most powerups allowed in the world at once.
    pub max_powerups: usize,
    /// Wall model size; wall padding is half this.
    pub wall_size: f64,
    /// Upper bound on the randomized powerup spawn delay, in ticks.
    pub max_powerup_delay: u32,
    /// Static wall layout, loaded once at startup.
    pub walls: Vec<WallSpec>,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            universe_size: 2000,
            ms_per_frame: 17,
            frames_per_shot: 80,
            respawn_rate: 300,
            max_hp: 3,
            engine_power: 3.0,
            tank_size: 60.0,
            projectile_speed: 25.0,
            max_powerups: 2,
            wall_size: 50.0,
            max_powerup_delay: 1650,
            walls: Vec::new(),
        }
    }
}
