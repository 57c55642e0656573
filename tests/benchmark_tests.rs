//! Performance benchmarks for critical game systems

use server::world::World;
use shared::entities::{ControlCommand, Fire, Moving, Tank, Wall};
use shared::{protocol, GameConfig, Vec2D, WallSpec};
use std::sync::Arc;
use std::time::Instant;

fn crowded_world(tanks: u32, walls: usize) -> World {
    let mut config = GameConfig::default();
    for i in 0..walls {
        let offset = -800.0 + (i as f64) * 160.0;
        config.walls.push(WallSpec {
            p1: Vec2D::new(offset, -400.0),
            p2: Vec2D::new(offset, 400.0),
        });
    }

    let mut world = World::with_seed(Arc::new(config), 7);
    for id in 0..tanks {
        world.spawn_tank(id, format!("Player{}", id));
    }
    world
}

/// Benchmarks a full tick with a busy arena
#[test]
fn benchmark_world_tick() {
    let mut world = crowded_world(16, 10);

    let iterations = 1_000;
    let start = Instant::now();

    for i in 0..iterations {
        for id in 0..16 {
            world.latch_command(
                id,
                ControlCommand {
                    moving: if (i + id) % 2 == 0 {
                        Moving::Right
                    } else {
                        Moving::Up
                    },
                    fire: if (i + id) % 5 == 0 { Fire::Main } else { Fire::None },
                    tdir: Vec2D::new(1.0, 0.0),
                },
            );
        }
        world.tick();
        world.remove_dead();
    }

    let duration = start.elapsed();
    println!(
        "World tick: {} ticks with 16 tanks in {:?} ({:.2} μs/tick)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Must stay far under the 17ms frame budget
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks frame serialization with many live entities
#[test]
fn benchmark_frame_serialization() {
    let mut world = crowded_world(16, 10);
    // Populate projectiles by having everyone fire over many ticks.
    for i in 0..200 {
        for id in 0..16 {
            world.latch_command(
                id,
                ControlCommand {
                    moving: Moving::None,
                    fire: if i % 80 == 0 { Fire::Main } else { Fire::None },
                    tdir: Vec2D::new(0.0, -1.0),
                },
            );
        }
        world.tick();
    }

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let frame = world.serialize_frame();
        assert!(!frame.is_empty());
    }

    let duration = start.elapsed();
    println!(
        "Frame serialization: {} frames in {:?} ({:.2} μs/frame)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks line framing over a large receive buffer
#[test]
fn benchmark_line_draining() {
    let tank = Tank::new(0, "Bench".to_string(), Vec2D::new(1.0, 2.0), 3, 300);
    let line = protocol::encode_line(&tank).unwrap();
    let buffer: String = line.repeat(500);

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let (lines, consumed) = protocol::drain_lines(&buffer);
        assert_eq!(lines.len(), 500);
        assert_eq!(consumed, buffer.len());
    }

    let duration = start.elapsed();
    println!(
        "Line draining: {} buffers of 500 lines in {:?} ({:.2} μs/buffer)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks message decode throughput for a mixed frame
#[test]
fn benchmark_message_decoding() {
    let world = crowded_world(16, 10);
    let frame = world.serialize_frame();
    let lines: Vec<&str> = frame.lines().collect();

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        for line in &lines {
            let _ = protocol::decode_message(line).unwrap();
        }
    }

    let duration = start.elapsed();
    println!(
        "Message decoding: {} frames of {} lines in {:?} ({:.2} μs/frame)",
        iterations,
        lines.len(),
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks beam hit-scan against a large tank field
#[test]
fn benchmark_beam_hit_scan() {
    use shared::entities::Beam;

    let tanks: Vec<Tank> = (0..100)
        .map(|i| {
            Tank::new(
                i,
                format!("T{}", i),
                Vec2D::new((i as f64) * 20.0 - 1000.0, (i as f64) * 7.0 - 350.0),
                3,
                300,
            )
        })
        .collect();
    let beam = Beam::new(0, 999, Vec2D::new(-1000.0, 0.0), Vec2D::new(1.0, 0.35));

    let iterations = 100_000;
    let start = Instant::now();

    let mut hits = 0usize;
    for _ in 0..iterations {
        for tank in &tanks {
            if beam.intersects_tank(&tank.loc, 60.0) {
                hits += 1;
            }
        }
    }

    let duration = start.elapsed();
    println!(
        "Beam hit-scan: {} scans of 100 tanks in {:?} ({:.2} ns/test), {} hits",
        iterations,
        duration,
        duration.as_nanos() as f64 / (iterations as f64 * 100.0),
        hits
    );

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks wall collision checks along a padded box boundary
#[test]
fn benchmark_wall_collision() {
    let wall = Wall::new(0, Vec2D::new(-500.0, 0.0), Vec2D::new(500.0, 0.0));

    let iterations = 100_000;
    let start = Instant::now();

    let mut inside = 0usize;
    for i in 0..iterations {
        let x = (i % 1200) as f64 - 600.0;
        let probe = Vec2D::new(x, 30.0);
        if wall.collides(55.0, &probe) {
            inside += 1;
        }
    }

    let duration = start.elapsed();
    println!(
        "Wall collision: {} checks in {:?} ({:.2} ns/check), {} inside",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64,
        inside
    );

    // Should complete in under 100ms for 100k checks
    assert!(duration.as_millis() < 100);
}
