//! Client handshake protocol.
//!
//! After TLS is established the client names the backend it wants (the
//! routing key) and the router answers with exactly one line:
//!
//! ```text
//! client: <connect-id>\n        (stream delivery only; CR before LF allowed)
//! router: OK\n                  then opaque bytes in both directions
//!    or:  ERROR: <message>\n    then close
//! ```

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::{KeyDeliveryMode, ListenerConfig};
use crate::domain::ConnectId;
use crate::errors::{Error, ProtocolError, Result};

/// Success acknowledgement
pub const OK_RESPONSE: &[u8] = b"OK\n";

/// Prefix of the failure line
pub const ERROR_PREFIX: &str = "ERROR: ";

/// Largest routing key frame accepted by default, line terminator included
pub const DEFAULT_MAX_FRAME_LEN: usize = 256;

/// Default deadline for the routing key to arrive
pub const DEFAULT_KEY_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the routing key comes from. One mode per listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyDelivery {
    /// First line of the TLS stream
    Stream { max_frame_len: usize, read_timeout: Duration },
    /// TLS server name `<connect-id>.<routing_domain>`
    Sni { routing_domain: String },
}

impl Default for KeyDelivery {
    fn default() -> Self {
        Self::Stream { max_frame_len: DEFAULT_MAX_FRAME_LEN, read_timeout: DEFAULT_KEY_READ_TIMEOUT }
    }
}

impl KeyDelivery {
    pub fn from_config(config: &ListenerConfig) -> Result<Self> {
        match config.key_delivery {
            KeyDeliveryMode::Stream => Ok(Self::Stream {
                max_frame_len: config.max_key_frame_bytes,
                read_timeout: config.key_read_timeout(),
            }),
            KeyDeliveryMode::Sni => {
                let routing_domain = config
                    .routing_domain
                    .as_deref()
                    .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
                    .filter(|d| !d.is_empty())
                    .ok_or_else(|| Error::config("SNI key delivery requires a routing domain"))?;
                Ok(Self::Sni { routing_domain })
            }
        }
    }

    /// Obtain the routing key for one connection.
    ///
    /// In stream mode this consumes exactly the key line from `reader`; any
    /// bytes the client sent after it stay buffered for the backend.
    pub async fn routing_key<R>(
        &self,
        reader: &mut R,
        server_name: Option<&str>,
    ) -> std::result::Result<ConnectId, ProtocolError>
    where
        R: AsyncBufRead + Unpin,
    {
        match self {
            KeyDelivery::Stream { max_frame_len, read_timeout } => {
                tokio::time::timeout(*read_timeout, read_routing_key(reader, *max_frame_len))
                    .await
                    .map_err(|_| ProtocolError::ReadTimeout(*read_timeout))?
            }
            KeyDelivery::Sni { routing_domain } => {
                let server_name = server_name.ok_or(ProtocolError::MissingServerName)?;
                connect_id_from_server_name(server_name, routing_domain)
            }
        }
    }
}

/// Read one `\n`-terminated routing key of at most `max_frame_len` bytes.
pub async fn read_routing_key<R>(
    reader: &mut R,
    max_frame_len: usize,
) -> std::result::Result<ConnectId, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut frame = Vec::with_capacity(64);
    let received = (&mut *reader).take(max_frame_len as u64).read_until(b'\n', &mut frame).await?;

    if frame.last() != Some(&b'\n') {
        return Err(if received >= max_frame_len {
            ProtocolError::FrameTooLarge { limit: max_frame_len }
        } else {
            ProtocolError::UnterminatedFrame { received }
        });
    }

    frame.pop();
    if frame.last() == Some(&b'\r') {
        frame.pop();
    }

    let key = std::str::from_utf8(&frame)
        .map_err(|_| ProtocolError::InvalidRoutingKey("routing key is not valid UTF-8".to_string()))?;

    ConnectId::parse(key)
}

/// `host-1.connect.example.com` under `connect.example.com` is `host-1`.
pub fn connect_id_from_server_name(
    server_name: &str,
    routing_domain: &str,
) -> std::result::Result<ConnectId, ProtocolError> {
    let mismatch = || ProtocolError::ServerNameMismatch {
        server_name: server_name.to_string(),
        routing_domain: routing_domain.to_string(),
    };

    let (label, rest) = server_name.split_once('.').ok_or_else(mismatch)?;
    if !rest.eq_ignore_ascii_case(routing_domain) {
        return Err(mismatch());
    }

    ConnectId::parse(label)
}

pub async fn write_ok<W>(writer: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(OK_RESPONSE).await?;
    writer.flush().await
}

/// Write `ERROR: <message>\n`; line breaks in `message` are flattened.
pub async fn write_error<W>(writer: &mut W, message: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = format!("{}{}\n", ERROR_PREFIX, message.replace(['\r', '\n'], " "));
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
