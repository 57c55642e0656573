//! Connection lifecycle and the broadcast loop.
//!
//! Each client moves through two phases: first it owes us a name line,
//! then it sends JSON command lines until it disconnects. The controller
//! multiplexes network events and the tick timer on one task, so world
//! access is serialized through [`SharedWorld`] with short lock holds.

use crate::world::{SharedWorld, World};
use log::{error, info, warn};
use shared::protocol;
use shared::{Connection, GameConfig, NetError, NetEvent};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Longest accepted player name, in characters. Longer names are cut.
const MAX_NAME_LEN: usize = 16;

/// What the server expects next from a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientPhase {
    /// Handshake: the next complete line is the player name.
    AwaitName,
    /// In-game: every complete line is a JSON control command.
    AwaitCommands,
}

struct ClientState {
    conn: Connection,
    phase: ClientPhase,
}

/// Owns the listener, the connected clients, and the world.
pub struct ServerController {
    world: SharedWorld,
    config: Arc<GameConfig>,
    clients: HashMap<u32, ClientState>,
    events: mpsc::UnboundedReceiver<NetEvent>,
    local_addr: SocketAddr,
}

impl ServerController {
    /// Binds the TCP listener and prepares an empty world. The returned
    /// controller does nothing until [`run`](Self::run) is awaited.
    pub async fn bind(addr: &str, config: Arc<GameConfig>) -> Result<Self, NetError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let local_addr = shared::net::start_listening(addr, tx).await?;
        info!("Server listening on {}", local_addr);

        Ok(ServerController {
            world: SharedWorld::new(World::new(Arc::clone(&config))),
            config,
            clients: HashMap::new(),
            events: rx,
            local_addr,
        })
    }

    /// Address the listener actually bound, useful when asking for port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the server: applies network events as they arrive and
    /// advances plus broadcasts the world on a fixed cadence. Returns
    /// only if the accept loop dies or the event channel closes.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.ms_per_frame));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick_and_broadcast();
                }
                event = self.events.recv() => {
                    match event {
                        Some(NetEvent::Accepted(conn)) => self.on_accepted(conn),
                        Some(NetEvent::Data { id }) => self.on_data(id),
                        Some(NetEvent::Closed { id, message }) => self.on_closed(id, &message),
                        Some(NetEvent::AcceptFailed { message }) => {
                            error!("Accept loop failed, shutting down: {}", message);
                            break;
                        }
                        None => break,
                    }
                }
            }
        }
    }

    fn on_accepted(&mut self, conn: Connection) {
        info!("Accepted new connection {} from {}", conn.id(), conn.peer_addr());
        self.clients.insert(
            conn.id(),
            ClientState {
                conn,
                phase: ClientPhase::AwaitName,
            },
        );
    }

    /// Drains complete lines from the client's buffer and interprets
    /// them according to its phase. Incomplete tails stay buffered.
    fn on_data(&mut self, id: u32) {
        let Some(client) = self.clients.get(&id) else {
            return;
        };
        let conn = client.conn.clone();
        let mut phase = client.phase;

        let buffer = conn.read_buffer();
        let (lines, consumed) = protocol::drain_lines(&buffer);
        if consumed == 0 {
            return;
        }
        conn.consume(consumed);

        for line in lines {
            match phase {
                ClientPhase::AwaitName => {
                    if !self.handshake(id, &conn, line) {
                        return;
                    }
                    phase = ClientPhase::AwaitCommands;
                    // Persist right away: a later line in this same batch
                    // can disconnect the client before the loop finishes,
                    // and the tank already exists.
                    if let Some(client) = self.clients.get_mut(&id) {
                        client.phase = phase;
                    }
                }
                ClientPhase::AwaitCommands => match protocol::decode_command(line) {
                    Ok(command) => self.world.with(|w| w.latch_command(id, command)),
                    Err(err) => {
                        warn!("Dropping client {}: bad command line: {}", id, err);
                        conn.close();
                        return;
                    }
                },
            }
        }
    }

    /// Completes the join: spawns the tank, then sends the player id,
    /// world size, and one line per wall. Returns false if the client
    /// was dropped instead.
    fn handshake(&mut self, id: u32, conn: &Connection, name_line: &str) -> bool {
        let name: String = name_line.trim().chars().take(MAX_NAME_LEN).collect();
        if name.is_empty() {
            warn!("Dropping client {}: empty player name", id);
            conn.close();
            return false;
        }

        let startup = self.world.with(|w| {
            w.spawn_tank(id, name);
            protocol::encode_startup(self.config.universe_size, w.walls.values())
        });

        match startup {
            Ok(block) => {
                conn.send(format!("{}\n{}", id, block));
                true
            }
            Err(err) => {
                error!("Dropping client {}: could not encode startup data: {}", id, err);
                conn.close();
                false
            }
        }
    }

    fn on_closed(&mut self, id: u32, message: &str) {
        if let Some(client) = self.clients.remove(&id) {
            if client.phase == ClientPhase::AwaitCommands {
                info!("Player {} disconnected: {}", id, message);
            } else {
                info!("Connection {} dropped before joining: {}", id, message);
            }
        }
        // The tank exists from the moment the handshake succeeds, whatever
        // the recorded phase says; marking an id without a tank is a no-op.
        self.world.with(|w| w.mark_disconnected(id));
    }

    /// One frame: advance the world, serialize it once, fan the same
    /// string out to every joined client, then drop entities whose
    /// terminal state has now been sent.
    fn tick_and_broadcast(&mut self) {
        let frame = self.world.with(|w| {
            w.tick();
            w.serialize_frame()
        });

        for client in self.clients.values() {
            if client.phase == ClientPhase::AwaitCommands {
                client.conn.send(frame.clone());
            }
        }

        self.world.with(|w| w.remove_dead());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    async fn start_server(config: GameConfig) -> SocketAddr {
        let controller = ServerController::bind("127.0.0.1:0", Arc::new(config))
            .await
            .unwrap();
        let addr = controller.local_addr();
        tokio::spawn(controller.run());
        addr
    }

    #[tokio::test]
    async fn test_handshake_assigns_id_and_sends_world_size() {
        let addr = start_server(GameConfig::default()).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        write.write_all(b"Bob\n").await.unwrap();

        let mut lines = BufReader::new(read).lines();
        let id_line = lines.next_line().await.unwrap().unwrap();
        let size_line = lines.next_line().await.unwrap().unwrap();

        assert_eq!(protocol::parse_handshake_int(&id_line).unwrap(), 0);
        assert_eq!(protocol::parse_handshake_int(&size_line).unwrap(), 2000);
    }

    #[tokio::test]
    async fn test_walls_sent_after_world_size() {
        let mut config = GameConfig::default();
        config.walls.push(shared::WallSpec {
            p1: shared::Vec2D::new(-250.0, 0.0),
            p2: shared::Vec2D::new(250.0, 0.0),
        });
        let addr = start_server(config).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        write.write_all(b"Bob\n").await.unwrap();

        let mut lines = BufReader::new(read).lines();
        lines.next_line().await.unwrap(); // id
        lines.next_line().await.unwrap(); // size
        let wall_line = lines.next_line().await.unwrap().unwrap();

        match protocol::decode_message(&wall_line).unwrap() {
            shared::ServerMessage::Wall(wall) => {
                assert_eq!(wall.p1, shared::Vec2D::new(-250.0, 0.0));
            }
            other => panic!("expected wall line, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_frames_carry_joined_tank() {
        let addr = start_server(GameConfig::default()).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        write.write_all(b"Alice\n").await.unwrap();

        let mut lines = BufReader::new(read).lines();
        lines.next_line().await.unwrap(); // id
        lines.next_line().await.unwrap(); // size

        // The next frames must contain our tank.
        loop {
            let line = lines.next_line().await.unwrap().unwrap();
            if let Ok(shared::ServerMessage::Tank(tank)) = protocol::decode_message(&line) {
                assert_eq!(tank.id, 0);
                assert_eq!(tank.name, "Alice");
                assert_eq!(tank.hp, 3);
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_malformed_command_disconnects() {
        let addr = start_server(GameConfig::default()).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        write.write_all(b"Bob\n").await.unwrap();

        let mut lines = BufReader::new(read).lines();
        lines.next_line().await.unwrap(); // id
        lines.next_line().await.unwrap(); // size

        write.write_all(b"this is not json\n").await.unwrap();

        // The server closes the socket; reads drain then end.
        loop {
            match lines.next_line().await {
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => break,
            }
        }
    }

    #[tokio::test]
    async fn test_garbage_batched_with_name_still_removes_tank() {
        let addr = start_server(GameConfig::default()).await;

        // Watcher joins first so it observes every later frame.
        let watcher = TcpStream::connect(addr).await.unwrap();
        let (read, mut watcher_write) = watcher.into_split();
        watcher_write.write_all(b"Watcher\n").await.unwrap();
        let mut lines = BufReader::new(read).lines();
        lines.next_line().await.unwrap(); // id
        lines.next_line().await.unwrap(); // size

        // Name and a malformed command arrive in one read batch; the
        // handshake spawns the tank, the garbage drops the connection.
        let vandal = TcpStream::connect(addr).await.unwrap();
        let (_vandal_read, mut vandal_write) = vandal.into_split();
        vandal_write.write_all(b"Vandal\nnot json\n").await.unwrap();

        // The spawned tank must still be flagged dead and disconnected
        // so other clients can drop it.
        loop {
            let line = lines.next_line().await.unwrap().unwrap();
            if let Ok(shared::ServerMessage::Tank(tank)) = protocol::decode_message(&line) {
                if tank.name == "Vandal" && tank.dc {
                    assert_eq!(tank.hp, 0);
                    assert!(tank.died);
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_empty_name_disconnects() {
        let addr = start_server(GameConfig::default()).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        write.write_all(b"   \n").await.unwrap();

        let mut lines = BufReader::new(read).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => break,
            }
        }
    }

    #[tokio::test]
    async fn test_long_name_is_truncated() {
        let addr = start_server(GameConfig::default()).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        write
            .write_all(b"ThisNameIsFarTooLongForTheServer\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(read).lines();
        lines.next_line().await.unwrap(); // id
        lines.next_line().await.unwrap(); // size

        loop {
            let line = lines.next_line().await.unwrap().unwrap();
            if let Ok(shared::ServerMessage::Tank(tank)) = protocol::decode_message(&line) {
                assert_eq!(tank.name.chars().count(), 16);
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_second_client_gets_next_id() {
        let addr = start_server(GameConfig::default()).await;

        let first = TcpStream::connect(addr).await.unwrap();
        let (read_a, mut write_a) = first.into_split();
        write_a.write_all(b"A\n").await.unwrap();
        let mut lines_a = BufReader::new(read_a).lines();
        let id_a = lines_a.next_line().await.unwrap().unwrap();

        let second = TcpStream::connect(addr).await.unwrap();
        let (read_b, mut write_b) = second.into_split();
        write_b.write_all(b"B\n").await.unwrap();
        let mut lines_b = BufReader::new(read_b).lines();
        let id_b = lines_b.next_line().await.unwrap().unwrap();

        assert_eq!(protocol::parse_handshake_int(&id_a).unwrap(), 0);
        assert_eq!(protocol::parse_handshake_int(&id_b).unwrap(), 1);
    }
}
