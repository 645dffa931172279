//! Fixed-width command framing shared by the TCP consumer and remote client.
//!
//! Every command is one or more `COMMAND_LENGTH`-byte ASCII tokens,
//! space-padded, optionally followed by a raw payload whose length was
//! itself carried in a preceding token.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::WireError;

/// Width, in bytes, of every command token.
pub const COMMAND_LENGTH: usize = 16;

/// How a work item's payload bytes were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationMode {
    /// Human-readable text (this crate uses JSON for its `Text` mode).
    Text = 0,
    /// XML. Not produced by this crate; accepted for wire compatibility.
    Xml = 1,
    /// Opaque binary.
    Binary = 2,
}

impl SerializationMode {
    fn from_id(id: u32) -> Result<Self, WireError> {
        match id {
            0 => Ok(Self::Text),
            1 => Ok(Self::Xml),
            2 => Ok(Self::Binary),
            other => Err(WireError::Protocol {
                reason: format!("unknown serialization mode id {other}"),
            }),
        }
    }

    fn id(self) -> u32 {
        self as u32
    }
}

/// One frame of the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Client is idle; please send work.
    Ready,
    /// Keep-alive probe, either direction.
    Ping,
    /// Response to [`Command::Ping`].
    Pong,
    /// A work item follows: `size` payload bytes encoded per `mode`.
    Compute { size: usize, mode: SerializationMode },
    /// A processed item follows: `size` payload bytes.
    Result { size: usize },
    /// No work available; sleep this many milliseconds before asking again.
    Idle { millis: u64 },
    /// Shut down; the recipient should close the socket after this.
    Close,
    /// The peer sent something this side did not recognize.
    Unknown,
}

fn verb(command: &Command) -> &'static str {
    match command {
        Command::Ready => "ready",
        Command::Ping => "ping",
        Command::Pong => "pong",
        Command::Compute { .. } => "compute",
        Command::Result { .. } => "result",
        Command::Idle { .. } => "idle",
        Command::Close => "close",
        Command::Unknown => "unknown",
    }
}

async fn write_token<W: AsyncWrite + Unpin>(writer: &mut W, token: &str) -> Result<(), WireError> {
    let mut buf = [b' '; COMMAND_LENGTH];
    let bytes = token.as_bytes();
    if bytes.len() > COMMAND_LENGTH {
        return Err(WireError::Protocol {
            reason: format!("token {token:?} exceeds COMMAND_LENGTH"),
        });
    }
    buf[..bytes.len()].copy_from_slice(bytes);
    writer.write_all(&buf).await?;
    Ok(())
}

async fn read_token<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String, WireError> {
    let mut buf = [0u8; COMMAND_LENGTH];
    reader.read_exact(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).trim_end().to_owned())
}

/// Write one [`Command`]'s tokens (verb plus any fixed fields). Does not
/// write the payload for `Compute`/`Result` -- call [`write_payload`] next.
pub async fn write_command<W: AsyncWrite + Unpin>(
    writer: &mut W,
    command: &Command,
) -> Result<(), WireError> {
    write_token(writer, verb(command)).await?;
    match command {
        Command::Compute { size, mode } => {
            write_token(writer, &size.to_string()).await?;
            write_token(writer, &mode.id().to_string()).await?;
        }
        Command::Result { size } => {
            write_token(writer, &size.to_string()).await?;
        }
        Command::Idle { millis } => {
            write_token(writer, &millis.to_string()).await?;
        }
        Command::Ready | Command::Ping | Command::Pong | Command::Close | Command::Unknown => {}
    }
    writer.flush().await?;
    Ok(())
}

/// Read one [`Command`]'s tokens. For `Compute`/`Result`, the payload itself
/// still needs a separate [`read_payload`] call using the returned size.
pub async fn read_command<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Command, WireError> {
    let verb = read_token(reader).await?;
    match verb.as_str() {
        "ready" => Ok(Command::Ready),
        "ping" => Ok(Command::Ping),
        "pong" => Ok(Command::Pong),
        "close" => Ok(Command::Close),
        "compute" => {
            let size = parse_token(reader).await?;
            let mode_id: u32 = parse_token(reader).await?;
            Ok(Command::Compute {
                size,
                mode: SerializationMode::from_id(mode_id)?,
            })
        }
        "result" => {
            let size = parse_token(reader).await?;
            Ok(Command::Result { size })
        }
        "idle" => {
            let millis = parse_token(reader).await?;
            Ok(Command::Idle { millis })
        }
        _ => Ok(Command::Unknown),
    }
}

async fn parse_token<R, N>(reader: &mut R) -> Result<N, WireError>
where
    R: AsyncRead + Unpin,
    N: std::str::FromStr,
{
    let token = read_token(reader).await?;
    token.trim().parse().map_err(|_| WireError::Protocol {
        reason: format!("expected a numeric token, got {token:?}"),
    })
}

/// Read exactly `size` bytes of payload following a `Compute`/`Result` command.
pub async fn read_payload<R: AsyncRead + Unpin>(
    reader: &mut R,
    size: usize,
) -> Result<Vec<u8>, WireError> {
    let mut buf = vec![0u8; size];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write a raw payload following a `Compute`/`Result` command.
pub async fn write_payload<W: AsyncWrite + Unpin>(
    writer: &mut W,
    bytes: &[u8],
) -> Result<(), WireError> {
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Command, SerializationMode, read_command, read_payload, write_command, write_payload};

    #[tokio::test]
    async fn simple_commands_round_trip() {
        for command in [Command::Ready, Command::Ping, Command::Pong, Command::Close] {
            let (client, mut server) = tokio::io::duplex(64);
            let mut client = client;
            write_command(&mut client, &command).await.unwrap();
            let decoded = read_command(&mut server).await.unwrap();
            assert_eq!(decoded, command);
        }
    }

    #[tokio::test]
    async fn compute_command_round_trips_with_payload() {
        let (mut client, mut server) = tokio::io::duplex(256);
        let payload = b"{\"value\":42}".to_vec();
        let command = Command::Compute {
            size: payload.len(),
            mode: SerializationMode::Text,
        };
        write_command(&mut client, &command).await.unwrap();
        write_payload(&mut client, &payload).await.unwrap();

        let decoded = read_command(&mut server).await.unwrap();
        assert_eq!(decoded, command);
        let Command::Compute { size, .. } = decoded else {
            unreachable!()
        };
        let bytes = read_payload(&mut server, size).await.unwrap();
        assert_eq!(bytes, payload);
    }

    #[tokio::test]
    async fn unrecognized_verb_decodes_as_unknown() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let mut buf = [b' '; super::COMMAND_LENGTH];
        buf[..7].copy_from_slice(b"bogus!!");
        tokio::io::AsyncWriteExt::write_all(&mut client, &buf)
            .await
            .unwrap();
        let decoded = read_command(&mut server).await.unwrap();
        assert_eq!(decoded, Command::Unknown);
    }

    #[tokio::test]
    async fn idle_carries_its_millisecond_field() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_command(&mut client, &Command::Idle { millis: 250 })
            .await
            .unwrap();
        assert_eq!(
            read_command(&mut server).await.unwrap(),
            Command::Idle { millis: 250 }
        );
    }
}
