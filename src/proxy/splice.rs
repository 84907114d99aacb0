//! Bidirectional byte copy between the client and the backend.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinSet;

const SPLICE_BUFFER_CAPACITY: usize = 32 * 1024;

/// Direction of one copy task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToBackend,
    BackendToClient,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ClientToBackend => "client_to_backend",
            Direction::BackendToClient => "backend_to_client",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a splice ended.
#[derive(Debug)]
pub struct SpliceOutcome {
    pub client_to_backend: u64,
    pub backend_to_client: u64,
    /// The direction that finished first and triggered teardown
    pub first_closed: Direction,
    /// Set when the first direction ended with an error other than a normal close
    pub error: Option<io::Error>,
}

/// Copy bytes both ways until either side finishes, then tear down both.
///
/// Each direction runs as its own task. When one returns (EOF, reset or
/// error) the other is cancelled and awaited, and both streams are dropped.
pub async fn splice<C, B>(client: C, backend: B) -> SpliceOutcome
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (backend_read, backend_write) = tokio::io::split(backend);

    let upstream = Arc::new(AtomicU64::new(0));
    let downstream = Arc::new(AtomicU64::new(0));

    let mut tasks = JoinSet::new();
    {
        let counter = upstream.clone();
        tasks.spawn(async move {
            let result = pump(client_read, backend_write, &counter).await;
            (Direction::ClientToBackend, result)
        });
    }
    {
        let counter = downstream.clone();
        tasks.spawn(async move {
            let result = pump(backend_read, client_write, &counter).await;
            (Direction::BackendToClient, result)
        });
    }

    let (first_closed, error) = match tasks.join_next().await {
        Some(Ok((direction, Ok(())))) => (direction, None),
        Some(Ok((direction, Err(e)))) if is_normal_close(&e) => {
            tracing::debug!(%direction, error = %e, "peer closed connection");
            (direction, None)
        }
        Some(Ok((direction, Err(e)))) => (direction, Some(e)),
        Some(Err(join_error)) => (
            Direction::ClientToBackend,
            Some(io::Error::new(io::ErrorKind::Other, join_error.to_string())),
        ),
        None => (Direction::ClientToBackend, None),
    };

    tasks.abort_all();
    while let Some(result) = tasks.join_next().await {
        if let Ok((direction, Err(e))) = result {
            tracing::trace!(%direction, error = %e, "second copy task ended");
        }
    }

    SpliceOutcome {
        client_to_backend: upstream.load(Ordering::Relaxed),
        backend_to_client: downstream.load(Ordering::Relaxed),
        first_closed,
        error,
    }
}

async fn pump<R, W>(reader: R, mut writer: W, counter: &AtomicU64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::with_capacity(SPLICE_BUFFER_CAPACITY, reader);

    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            break;
        }
        let len = chunk.len();
        writer.write_all(chunk).await?;
        writer.flush().await?;
        reader.consume(len);
        counter.fetch_add(len as u64, Ordering::Relaxed);
    }

    // forward EOF; the peer may already be gone
    let _ = writer.shutdown().await;
    Ok(())
}

/// EOF and closed-connection conditions are ordinary ends of a session.
pub fn is_normal_close(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn copies_both_directions_until_client_closes() {
        let (mut client, client_side) = duplex(1024);
        let (backend_side, mut backend) = duplex(1024);

        let handle = tokio::spawn(splice(client_side, backend_side));

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        backend.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        backend.write_all(b"pong!").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong!");

        drop(client);
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.first_closed, Direction::ClientToBackend);
        assert_eq!(outcome.client_to_backend, 4);
        assert_eq!(outcome.backend_to_client, 5);
        assert!(outcome.error.is_none());

        // backend sees EOF once the splice is torn down
        let mut rest = Vec::new();
        backend.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn backend_close_tears_down_client() {
        let (mut client, client_side) = duplex(1024);
        let (backend_side, backend) = duplex(1024);

        let handle = tokio::spawn(splice(client_side, backend_side));
        drop(backend);

        let outcome = handle.await.unwrap();
        assert_eq!(outcome.first_closed, Direction::BackendToClient);

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[test]
    fn normal_close_kinds() {
        assert!(is_normal_close(&io::Error::from(io::ErrorKind::UnexpectedEof)));
        assert!(is_normal_close(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(!is_normal_close(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }
}
