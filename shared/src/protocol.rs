//! Newline-delimited JSON framing used in both directions.
//!
//! Every message is a self-describing JSON object terminated by `\n`.
//! Decoders must tolerate a buffer holding zero or more complete lines
//! followed by an incomplete tail, and must not consume the tail.

use crate::entities::{Beam, ControlCommand, Powerup, Projectile, Tank, Wall};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A malformed or undecodable line. Protocol errors terminate the
/// connection; there is no retry.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("malformed handshake line: {0:?}")]
    Handshake(String),
}

/// One server-to-client message. The discriminator key of the JSON
/// object ("wall", "tank", "proj", "beam", "power") selects the variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Wall(Wall),
    Tank(Tank),
    Projectile(Projectile),
    Beam(Beam),
    Powerup(Powerup),
}

/// Encodes a value as one newline-terminated JSON line.
pub fn encode_line<T: Serialize>(value: &T) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}

/// Decodes one server-to-client line (without its trailing newline).
pub fn decode_message(line: &str) -> Result<ServerMessage, ProtocolError> {
    Ok(serde_json::from_str(line)?)
}

/// Decodes one client-to-server command line.
pub fn decode_command(line: &str) -> Result<ControlCommand, ProtocolError> {
    Ok(serde_json::from_str(line)?)
}

/// Splits a receive buffer into complete lines, leaving any incomplete
/// tail in place. Returns the lines (without terminators) and the number
/// of bytes consumed, which the caller removes from the buffer.
pub fn drain_lines(buffer: &str) -> (Vec<&str>, usize) {
    let mut lines = Vec::new();
    let mut consumed = 0;

    while let Some(pos) = buffer[consumed..].find('\n') {
        lines.push(&buffer[consumed..consumed + pos]);
        consumed += pos + 1;
    }

    (lines, consumed)
}

/// Builds the startup block sent after the player-id line: the world
/// size on its own line, followed by one line per static wall.
pub fn encode_startup<'a>(
    size: i64,
    walls: impl Iterator<Item = &'a Wall>,
) -> Result<String, ProtocolError> {
    let mut block = format!("{}\n", size);
    for wall in walls {
        block.push_str(&encode_line(wall)?);
    }
    Ok(block)
}

/// Parses one of the two integer handshake lines (player id, world size).
pub fn parse_handshake_int(line: &str) -> Result<i64, ProtocolError> {
    line.trim()
        .parse()
        .map_err(|_| ProtocolError::Handshake(line.to_string()))
}
