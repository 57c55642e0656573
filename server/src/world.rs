//! Authoritative world state and the fixed-order tick phases.
//!
//! All mutation happens inside [`World::tick`] or a command latch under
//! the same lock discipline; the network side only ever observes the
//! serialized frame produced after a tick.

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::protocol;
use shared::{
    Beam, ControlCommand, Fire, GameConfig, Powerup, Projectile, Tank, Vec2D, Wall,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Attempts at random placement before giving up and accepting the last
/// candidate. An unbounded retry could wedge the tick thread on a
/// pathological wall layout.
const MAX_SPAWN_ATTEMPTS: u32 = 1000;

/// Extra clearance from walls required for spawn points, beyond the
/// usual wall-plus-tank padding.
const SPAWN_WALL_MARGIN: f64 = 100.0;

/// Canonical container of every entity in the arena.
pub struct World {
    config: Arc<GameConfig>,
    /// Side length of the square world.
    pub size: f64,
    /// Number of completed ticks.
    pub tick_count: u64,
    pub tanks: HashMap<u32, Tank>,
    pub walls: HashMap<u32, Wall>,
    pub projectiles: HashMap<u32, Projectile>,
    pub beams: HashMap<u32, Beam>,
    pub powerups: HashMap<u32, Powerup>,

    /// Latest command per player; overwritten, never queued.
    commands: HashMap<u32, ControlCommand>,

    // Ids of entities to drop after the next broadcast, so observers see
    // the terminal state before disappearance.
    dead_projectiles: Vec<u32>,
    dead_powerups: Vec<u32>,
    dead_beams: Vec<u32>,
    disconnected_tanks: Vec<u32>,

    next_projectile_id: u32,
    next_beam_id: u32,
    next_powerup_id: u32,
    /// Ticks since the powerup countdown was last rescheduled.
    powerup_counter: u32,
    rng: StdRng,
}

impl World {
    pub fn new(config: Arc<GameConfig>) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Builds a world with a seeded RNG so placement is deterministic
    /// under test.
    pub fn with_seed(config: Arc<GameConfig>, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: Arc<GameConfig>, rng: StdRng) -> Self {
        let mut walls = HashMap::new();
        for (i, spec) in config.walls.iter().enumerate() {
            let id = i as u32;
            walls.insert(id, Wall::new(id, spec.p1, spec.p2));
        }

        World {
            size: config.universe_size as f64,
            tick_count: 0,
            tanks: HashMap::new(),
            walls,
            projectiles: HashMap::new(),
            beams: HashMap::new(),
            powerups: HashMap::new(),
            commands: HashMap::new(),
            dead_projectiles: Vec::new(),
            dead_powerups: Vec::new(),
            dead_beams: Vec::new(),
            disconnected_tanks: Vec::new(),
            next_projectile_id: 0,
            next_beam_id: 0,
            next_powerup_id: 0,
            powerup_counter: config.max_powerup_delay,
            rng,
            config,
        }
    }

    /// Creates a tank for a newly joined player at a valid random spawn.
    /// The tank id equals the owning connection's id.
    pub fn spawn_tank(&mut self, id: u32, name: String) {
        let loc = self.random_spawn();
        info!("Player {:?} (tank {}) has joined", name, id);
        self.tanks.insert(
            id,
            Tank::new(id, name, loc, self.config.max_hp, self.config.respawn_rate),
        );
    }

    /// Latches a command for a player, overwriting any previous one.
    pub fn latch_command(&mut self, player_id: u32, command: ControlCommand) {
        self.commands.insert(player_id, command);
    }

    /// Marks a player's tank as gone: zero hit points with the death and
    /// disconnect flags raised, so other clients observe the death before
    /// the tank is removed after the next broadcast.
    pub fn mark_disconnected(&mut self, player_id: u32) {
        if let Some(tank) = self.tanks.get_mut(&player_id) {
            tank.hp = 0;
            tank.dc = true;
            tank.died = true;
        }
    }

    /// Advances the world one tick, in fixed phase order: tank status,
    /// commands, tank movement, projectiles, powerups.
    pub fn tick(&mut self) {
        self.update_tank_status();
        self.process_commands();
        self.update_tank_movement();
        self.update_projectiles();
        self.update_powerups();
        self.tick_count += 1;
    }

    /// Marks disconnected tanks for removal, respawns dead tanks whose
    /// countdown has elapsed, and lowers the one-tick `died` flag for
    /// tanks still connected.
    fn update_tank_status(&mut self) {
        let mut respawning = Vec::new();

        for tank in self.tanks.values_mut() {
            if tank.dc {
                self.disconnected_tanks.push(tank.id);
                continue;
            }
            if !tank.is_alive() {
                if tank.respawn_counter == 0 {
                    respawning.push(tank.id);
                } else {
                    tank.respawn_counter -= 1;
                }
            } else if tank.died {
                // Observed by exactly one broadcast last tick.
                tank.died = false;
            }
        }

        for id in respawning {
            let loc = self.random_spawn();
            if let Some(tank) = self.tanks.get_mut(&id) {
                tank.hp = self.config.max_hp;
                tank.loc = loc;
                tank.respawn_counter = self.config.respawn_rate;
            }
        }
    }

    /// Applies every latched command, then clears the latch map. Dead
    /// tanks are skipped but their commands are still discarded.
    fn process_commands(&mut self) {
        let commands: Vec<(u32, ControlCommand)> = self.commands.drain().collect();

        for (player_id, cmd) in commands {
            let (loc, aim, can_shoot, has_powerup) = match self.tanks.get_mut(&player_id) {
                Some(tank) if tank.is_alive() => {
                    let direction = cmd.moving.direction();
                    if !direction.is_zero() {
                        // Facing persists while stopped.
                        tank.bdir = direction;
                    }
                    tank.velocity = direction.scale(self.config.engine_power);
                    tank.tdir = cmd.tdir;
                    (
                        tank.loc,
                        tank.tdir,
                        tank.shot_cooldown == 0,
                        tank.powerup_count > 0,
                    )
                }
                _ => continue,
            };

            match cmd.fire {
                Fire::Main if can_shoot => {
                    let id = self.next_projectile_id;
                    self.next_projectile_id += 1;
                    self.projectiles.insert(
                        id,
                        Projectile::new(id, player_id, loc, aim, self.config.projectile_speed),
                    );
                    if let Some(tank) = self.tanks.get_mut(&player_id) {
                        tank.shot_cooldown = self.config.frames_per_shot;
                    }
                }
                Fire::Alt if has_powerup => {
                    let id = self.next_beam_id;
                    self.next_beam_id += 1;
                    let beam = Beam::new(id, player_id, loc, aim);
                    self.resolve_beam(&beam);
                    self.beams.insert(id, beam);
                    // Beams never persist across ticks.
                    self.dead_beams.push(id);
                    if let Some(tank) = self.tanks.get_mut(&player_id) {
                        tank.powerup_count -= 1;
                    }
                }
                _ => {}
            }
        }
    }

    /// Hit-scan resolution: every living tank whose collision circle the
    /// beam's ray crosses is killed instantly and the firer credited.
    fn resolve_beam(&mut self, beam: &Beam) {
        let mut kills: u32 = 0;

        for tank in self.tanks.values_mut() {
            if tank.id == beam.owner || !tank.is_alive() {
                continue;
            }
            if beam.intersects_tank(&tank.loc, self.config.tank_size) {
                tank.hp = 0;
                tank.died = true;
                tank.respawn_counter = self.config.respawn_rate;
                kills += 1;
            }
        }

        if kills > 0 {
            if let Some(owner) = self.tanks.get_mut(&beam.owner) {
                owner.score += kills;
            }
        }
    }

    /// Advances tanks by their velocity, applying toroidal wraparound,
    /// rejecting moves into padded wall boxes, and transferring any
    /// powerup the tank drives over. Shot cooldowns also count down here.
    fn update_tank_movement(&mut self) {
        let half_world = self.size / 2.0;
        let half_tank = self.config.tank_size / 2.0;
        let wall_padding = self.config.wall_size / 2.0 + half_tank;

        for tank in self.tanks.values_mut() {
            if tank.shot_cooldown > 0 {
                tank.shot_cooldown -= 1;
            }
            if tank.velocity.is_zero() || !tank.is_alive() {
                continue;
            }

            let mut new_loc = tank.loc.add(&tank.velocity);

            // A tank past the wrap threshold reappears mirrored across
            // that axis, offset by half its size.
            if tank.loc.x.abs() > half_world - half_tank {
                new_loc.x = if tank.loc.x < 0.0 {
                    -(new_loc.x + half_tank)
                } else {
                    -(new_loc.x - half_tank)
                };
            }
            if tank.loc.y.abs() > half_world - half_tank {
                new_loc.y = if tank.loc.y < 0.0 {
                    -(new_loc.y + half_tank)
                } else {
                    -(new_loc.y - half_tank)
                };
            }

            let mut blocked = false;
            for wall in self.walls.values() {
                if wall.collides(wall_padding, &new_loc) {
                    tank.velocity = Vec2D::default();
                    blocked = true;
                    break;
                }
            }
            if blocked {
                continue;
            }
            tank.loc = new_loc;

            for powerup in self.powerups.values_mut() {
                if !powerup.died && powerup.collides_tank(&tank.loc, self.config.tank_size) {
                    powerup.died = true;
                    self.dead_powerups.push(powerup.id);
                    tank.powerup_count += 1;
                }
            }
        }
    }

    /// Advances projectiles, killing those that leave the world or enter
    /// a padded wall box, and resolving hits against living tanks.
    fn update_projectiles(&mut self) {
        let half_world = self.size / 2.0;
        let wall_padding = self.config.wall_size / 2.0;
        let mut kill_credits: Vec<u32> = Vec::new();

        for proj in self.projectiles.values_mut() {
            if proj.died {
                continue;
            }

            let new_loc = proj.loc.add(&proj.velocity);
            let mut stopped = proj.loc.x.abs() > half_world || proj.loc.y.abs() > half_world;
            if !stopped {
                for wall in self.walls.values() {
                    if wall.collides(wall_padding, &new_loc) {
                        stopped = true;
                        break;
                    }
                }
            }
            if stopped {
                proj.died = true;
                proj.velocity = Vec2D::default();
                self.dead_projectiles.push(proj.id);
                continue;
            }
            proj.loc = new_loc;

            for tank in self.tanks.values_mut() {
                if proj.owner == tank.id || !tank.is_alive() {
                    continue;
                }
                if proj.collides_tank(&tank.loc, self.config.tank_size) {
                    proj.died = true;
                    self.dead_projectiles.push(proj.id);
                    tank.hp -= 1;
                    if tank.hp == 0 {
                        tank.died = true;
                        tank.respawn_counter = self.config.respawn_rate;
                        kill_credits.push(proj.owner);
                    }
                    break;
                }
            }
        }

        for owner in kill_credits {
            if let Some(tank) = self.tanks.get_mut(&owner) {
                tank.score += 1;
            }
        }
    }

    /// Spawns a powerup once the randomized countdown elapses and the
    /// live count is under the cap, then reschedules the countdown.
    fn update_powerups(&mut self) {
        if self.powerup_counter > self.config.max_powerup_delay
            && self.powerups.len() < self.config.max_powerups
        {
            self.powerup_counter = self
                .rng
                .gen_range(1..self.config.max_powerup_delay.max(2));
            let loc = self.random_spawn();
            let id = self.next_powerup_id;
            self.next_powerup_id += 1;
            self.powerups.insert(id, Powerup::new(id, loc));
        }
        self.powerup_counter += 1;
    }

    /// Samples uniform points until one is farther than half a tank from
    /// every tank and clear of every wall's padded box. Bounded: after
    /// [`MAX_SPAWN_ATTEMPTS`] the last candidate is accepted as-is.
    pub fn random_spawn(&mut self) -> Vec2D {
        let half_world = self.size / 2.0;
        let half_tank = self.config.tank_size / 2.0;
        let padding = self.config.wall_size / 2.0 + half_tank + SPAWN_WALL_MARGIN;

        let mut candidate = Vec2D::default();
        for _ in 0..MAX_SPAWN_ATTEMPTS {
            candidate = Vec2D::new(
                self.rng.gen_range(-half_world..half_world),
                self.rng.gen_range(-half_world..half_world),
            );

            let clear_of_tanks = self
                .tanks
                .values()
                .all(|tank| tank.loc.sub(&candidate).magnitude() > half_tank);
            let clear_of_walls = self
                .walls
                .values()
                .all(|wall| !wall.collides(padding, &candidate));

            if clear_of_tanks && clear_of_walls {
                return candidate;
            }
        }

        warn!(
            "No valid spawn location after {} attempts; using last candidate",
            MAX_SPAWN_ATTEMPTS
        );
        candidate
    }

    /// Serializes every tank, projectile, beam, and powerup into one
    /// frame of newline-delimited JSON.
    pub fn serialize_frame(&self) -> String {
        let mut frame = String::new();
        for tank in self.tanks.values() {
            if let Ok(line) = protocol::encode_line(tank) {
                frame.push_str(&line);
            }
        }
        for proj in self.projectiles.values() {
            if let Ok(line) = protocol::encode_line(proj) {
                frame.push_str(&line);
            }
        }
        for beam in self.beams.values() {
            if let Ok(line) = protocol::encode_line(beam) {
                frame.push_str(&line);
            }
        }
        for powerup in self.powerups.values() {
            if let Ok(line) = protocol::encode_line(powerup) {
                frame.push_str(&line);
            }
        }
        frame
    }

    /// Drops entities whose terminal state has now been broadcast: dead
    /// projectiles, powerups, and beams, plus disconnected tanks. Also
    /// lowers the one-broadcast `join` flag.
    pub fn remove_dead(&mut self) {
        for id in self.dead_projectiles.drain(..) {
            self.projectiles.remove(&id);
        }
        for id in self.dead_powerups.drain(..) {
            self.powerups.remove(&id);
        }
        for id in self.dead_beams.drain(..) {
            self.beams.remove(&id);
        }
        for id in self.disconnected_tanks.drain(..) {
            if self.tanks.remove(&id).is_some() {
                info!("Removed disconnected tank {}", id);
            }
        }
        for tank in self.tanks.values_mut() {
            tank.join = false;
        }
    }
}

/// Guarded access to the world: the only way in is to run a closure
/// under exclusive access, so unguarded references cannot leak out.
#[derive(Clone)]
pub struct SharedWorld(Arc<Mutex<World>>);

impl SharedWorld {
    pub fn new(world: World) -> Self {
        SharedWorld(Arc::new(Mutex::new(world)))
    }

    /// Runs `f` with exclusive access to the world. The lock is held
    /// only for the duration of the closure, never across an await.
    pub fn with<R>(&self, f: impl FnOnce(&mut World) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}
