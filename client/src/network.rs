//! Client side of the wire protocol.
//!
//! Connects, sends the player name, then works through the handshake:
//! one line carrying our player id, one line carrying the world size,
//! and from then on newline-delimited JSON entity lines that are fed
//! into the local [`ClientWorld`].

use crate::game::ClientWorld;
use log::info;
use shared::protocol::{self, ProtocolError};
use shared::{net, Connection, ControlCommand, NetError, NetEvent};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Net(#[from] NetError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("connection lost: {0}")]
    Disconnected(String),
}

/// What the client expects next from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitId,
    AwaitSize,
    InGame,
}

/// A connected game client: the socket, the handshake progress, and the
/// local world replica.
pub struct GameClient {
    conn: Connection,
    events: mpsc::UnboundedReceiver<NetEvent>,
    phase: Phase,
    pub world: ClientWorld,
}

impl GameClient {
    /// Connects and immediately sends the join request: the player name
    /// on its own line.
    pub async fn connect(host: &str, port: u16, name: &str) -> Result<Self, ClientError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = net::connect(host, port, tx).await?;
        info!("Connected to {}:{}, joining as {:?}", host, port, name);
        conn.send(format!("{}\n", name.trim()));

        Ok(GameClient {
            conn,
            events: rx,
            phase: Phase::AwaitId,
            world: ClientWorld::new(),
        })
    }

    /// True once both handshake lines have been received.
    pub fn is_joined(&self) -> bool {
        self.phase == Phase::InGame
    }

    /// Sends one control command line. Returns false if the connection
    /// is already gone.
    pub fn send_command(&self, command: &ControlCommand) -> bool {
        match protocol::encode_line(command) {
            Ok(line) => self.conn.send(line),
            Err(_) => false,
        }
    }

    pub fn close(&self) {
        self.conn.close();
    }

    /// Waits for the next network event and applies it to the world.
    /// Returns Ok(()) while the connection lives, and
    /// [`ClientError::Disconnected`] once it ends for any reason.
    pub async fn poll(&mut self) -> Result<(), ClientError> {
        match self.events.recv().await {
            Some(NetEvent::Data { .. }) => self.drain_buffer(),
            Some(NetEvent::Closed { message, .. }) => Err(ClientError::Disconnected(message)),
            Some(_) => Ok(()),
            None => Err(ClientError::Disconnected("event channel closed".into())),
        }
    }

    /// Consumes every complete line in the receive buffer, advancing the
    /// handshake phase as the id and size lines arrive. Any incomplete
    /// tail stays buffered for the next read.
    fn drain_buffer(&mut self) -> Result<(), ClientError> {
        let buffer = self.conn.read_buffer();
        let (lines, consumed) = protocol::drain_lines(&buffer);
        if consumed == 0 {
            return Ok(());
        }
        self.conn.consume(consumed);

        let mut frame_lines = Vec::new();
        for line in lines {
            match self.phase {
                Phase::AwaitId => {
                    let id = protocol::parse_handshake_int(line)?;
                    self.world.player_id = Some(id as u32);
                    self.phase = Phase::AwaitSize;
                }
                Phase::AwaitSize => {
                    let size = protocol::parse_handshake_int(line)?;
                    self.world.world_size = Some(size);
                    self.phase = Phase::InGame;
                    info!(
                        "Joined as player {} in a {} world",
                        self.world.player_id.unwrap_or_default(),
                        size
                    );
                }
                Phase::InGame => frame_lines.push(line),
            }
        }
        self.world.apply_lines(frame_lines)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Tank, Vec2D, Wall};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accepts one client, checks its name line, and plays back the
    /// handshake plus one frame.
    async fn fake_server() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut name = Vec::new();
            let mut byte = [0u8; 1];
            loop {
                socket.read_exact(&mut byte).await.unwrap();
                if byte[0] == b'\n' {
                    break;
                }
                name.push(byte[0]);
            }
            assert_eq!(name, b"Bob");

            let wall =
                protocol::encode_line(&Wall::new(0, Vec2D::new(-50.0, 0.0), Vec2D::new(50.0, 0.0)))
                    .unwrap();
            let tank = protocol::encode_line(&Tank::new(
                0,
                "Bob".to_string(),
                Vec2D::new(5.0, -5.0),
                3,
                300,
            ))
            .unwrap();

            let payload = format!("0\n2000\n{}{}", wall, tank);
            socket.write_all(payload.as_bytes()).await.unwrap();
            // Keep the socket open long enough for the client to read.
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        });

        addr
    }

    #[tokio::test]
    async fn test_handshake_and_first_frame() {
        let addr = fake_server().await;

        let mut client = GameClient::connect(&addr.ip().to_string(), addr.port(), "Bob")
            .await
            .unwrap();

        while !client.is_joined() || client.world.tanks.is_empty() {
            client.poll().await.unwrap();
        }

        assert_eq!(client.world.player_id, Some(0));
        assert_eq!(client.world.world_size, Some(2000));
        assert_eq!(client.world.walls.len(), 1);
        assert_eq!(client.world.own_tank().unwrap().loc, Vec2D::new(5.0, -5.0));
    }

    #[tokio::test]
    async fn test_poll_reports_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let mut client = GameClient::connect(&addr.ip().to_string(), addr.port(), "Bob")
            .await
            .unwrap();

        loop {
            match client.poll().await {
                Ok(()) => continue,
                Err(ClientError::Disconnected(_)) => break,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_connect_to_dead_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = GameClient::connect(&addr.ip().to_string(), addr.port(), "Bob").await;
        assert!(result.is_err());
    }
}
