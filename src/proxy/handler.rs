//! Per-connection state machine.
//!
//! ```text
//! Accepted -> Authenticated -> KeyRead -> Authorized -> Proxying -> Closed
//!     \____________\_____________\___________\______________-> Error
//! ```
//!
//! The TLS handshake is finished before a handler runs. Identity and
//! protocol failures close the connection without a reply; authorization
//! and dial failures send one `ERROR:` line first.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustls::pki_types::CertificateDer;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Span};

use crate::domain::{ConnectId, RouteTarget, UserIdentity};
use crate::errors::{IdentityError, ProtocolError, RouteError};
use crate::identity::Authenticator;
use crate::observability::MetricsRecorder;
use crate::routing::Router;

use super::protocol::{write_error, write_ok, KeyDelivery};
use super::splice::{splice, SpliceOutcome};

/// Default deadline for the authorization decision
pub const DEFAULT_ROUTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for the backend TCP connect
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerTimeouts {
    pub route: Duration,
    pub dial: Duration,
}

impl Default for HandlerTimeouts {
    fn default() -> Self {
        Self { route: DEFAULT_ROUTE_TIMEOUT, dial: DEFAULT_DIAL_TIMEOUT }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    Authenticated,
    KeyRead,
    Authorized,
    Proxying,
    Closed,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Accepted => "accepted",
            ConnectionState::Authenticated => "authenticated",
            ConnectionState::KeyRead => "key_read",
            ConnectionState::Authorized => "authorized",
            ConnectionState::Proxying => "proxying",
            ConnectionState::Closed => "closed",
            ConnectionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Why a connection ended before or during proxying.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("authentication failed: {0}")]
    Identity(#[from] IdentityError),

    #[error("routing key rejected: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("routing failed: {0}")]
    Route(#[from] RouteError),

    #[error("failed to connect to backend {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out connecting to backend {addr} after {timeout:?}")]
    DialTimeout { addr: String, timeout: Duration },

    #[error("failed to write response to client: {0}")]
    Respond(#[source] io::Error),

    #[error("proxying failed: {0}")]
    Splice(#[source] io::Error),
}

impl ConnectionError {
    /// Text for the `ERROR:` line, or `None` when the connection closes silently.
    ///
    /// Backend addresses are never included.
    pub fn client_message(&self) -> Option<String> {
        match self {
            ConnectionError::Identity(_) | ConnectionError::Protocol(_) => None,
            ConnectionError::Route(e) => Some(format!("routing failed: {}", e.client_message())),
            ConnectionError::Dial { source, .. } => {
                Some(format!("failed to connect to backend: {}", source))
            }
            ConnectionError::DialTimeout { .. } => {
                Some("timed out connecting to backend".to_string())
            }
            ConnectionError::Respond(_) | ConnectionError::Splice(_) => None,
        }
    }

    /// The last state reached before the failure.
    pub fn stage(&self) -> ConnectionState {
        match self {
            ConnectionError::Identity(_) => ConnectionState::Accepted,
            ConnectionError::Protocol(_) => ConnectionState::Authenticated,
            ConnectionError::Route(_) => ConnectionState::KeyRead,
            ConnectionError::Dial { .. } | ConnectionError::DialTimeout { .. } => {
                ConnectionState::Authorized
            }
            ConnectionError::Respond(_) => ConnectionState::Authorized,
            ConnectionError::Splice(_) => ConnectionState::Proxying,
        }
    }

    /// Short stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectionError::Identity(e) => e.kind(),
            ConnectionError::Protocol(e) => e.kind(),
            ConnectionError::Route(e) => e.kind(),
            ConnectionError::Dial { .. } => "dial_failed",
            ConnectionError::DialTimeout { .. } => "dial_timeout",
            ConnectionError::Respond(_) => "respond_failed",
            ConnectionError::Splice(_) => "splice_failed",
        }
    }

    /// Policy denials and client mistakes, as opposed to infrastructure failures.
    pub fn is_client_fault(&self) -> bool {
        match self {
            ConnectionError::Identity(_) | ConnectionError::Protocol(_) => true,
            ConnectionError::Route(e) => e.is_denial(),
            _ => false,
        }
    }
}

/// What the TLS handshake established about the peer.
#[derive(Debug, Clone, Default)]
pub struct TlsSession {
    /// Presented chain, leaf first
    pub peer_certificates: Vec<CertificateDer<'static>>,
    /// SNI sent by the client
    pub server_name: Option<String>,
}

impl TlsSession {
    pub fn from_stream<IO>(stream: &tokio_rustls::server::TlsStream<IO>) -> Self {
        let (_, connection) = stream.get_ref();
        Self {
            peer_certificates: connection
                .peer_certificates()
                .map(|certs| certs.iter().map(|c| c.clone().into_owned()).collect())
                .unwrap_or_default(),
            server_name: connection.server_name().map(str::to_string),
        }
    }
}

/// Runs one authenticated TLS connection from identity check to teardown.
#[derive(Clone)]
pub struct ConnectionHandler {
    authenticator: Arc<Authenticator>,
    key_delivery: Arc<KeyDelivery>,
    router: Arc<dyn Router>,
    timeouts: HandlerTimeouts,
    shutdown: CancellationToken,
    metrics: MetricsRecorder,
}

impl fmt::Debug for ConnectionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandler")
            .field("key_delivery", &self.key_delivery)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl ConnectionHandler {
    pub fn new(
        authenticator: Arc<Authenticator>,
        key_delivery: Arc<KeyDelivery>,
        router: Arc<dyn Router>,
        timeouts: HandlerTimeouts,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            authenticator,
            key_delivery,
            router,
            timeouts,
            shutdown,
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Handle one connection whose TLS handshake already completed.
    ///
    /// Returns once both sockets are closed.
    pub async fn handle<S>(&self, stream: S, session: TlsSession) -> Result<SpliceOutcome, ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let identity = match self.authenticator.authenticate(&session.peer_certificates) {
            Ok(identity) => identity,
            Err(e) => {
                transition(ConnectionState::Error);
                return Err(e.into());
            }
        };

        let span = Span::current();
        span.record("user_id", identity.user_id.as_str());
        span.record("org_id", identity.org_id.as_str());
        transition(ConnectionState::Authenticated);

        let mut client = BufReader::new(stream);

        let backend = match self.establish(&mut client, &identity, session.server_name.as_deref()).await {
            Ok(backend) => backend,
            Err(e) => {
                transition(ConnectionState::Error);
                if let Some(message) = e.client_message() {
                    if let Err(write_err) = write_error(&mut client, &message).await {
                        debug!(error = %write_err, "failed to send error line to client");
                    }
                }
                let _ = client.shutdown().await;
                return Err(e);
            }
        };

        write_ok(&mut client).await.map_err(ConnectionError::Respond)?;
        transition(ConnectionState::Proxying);

        let outcome = splice(client, backend).await;
        self.metrics.record_bytes_spliced("client_to_backend", outcome.client_to_backend);
        self.metrics.record_bytes_spliced("backend_to_client", outcome.backend_to_client);
        match outcome.error {
            Some(e) => {
                transition(ConnectionState::Error);
                Err(ConnectionError::Splice(e))
            }
            None => {
                transition(ConnectionState::Closed);
                Ok(outcome)
            }
        }
    }

    async fn establish<S>(
        &self,
        client: &mut BufReader<S>,
        identity: &UserIdentity,
        server_name: Option<&str>,
    ) -> Result<TcpStream, ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let connect_id = self.key_delivery.routing_key(client, server_name).await?;
        Span::current().record("connect_id", connect_id.as_str());
        transition(ConnectionState::KeyRead);

        let target = self.authorize(identity, &connect_id).await?;
        Span::current().record("backend", target.backend_addr.as_str());
        transition(ConnectionState::Authorized);

        self.dial(&target).await
    }

    async fn authorize(
        &self,
        identity: &UserIdentity,
        connect_id: &ConnectId,
    ) -> Result<RouteTarget, RouteError> {
        let started = Instant::now();
        let timeout = self.timeouts.route;

        let result = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(RouteError::Cancelled),
            resolved = tokio::time::timeout(timeout, self.router.resolve(identity, connect_id)) => {
                resolved.unwrap_or(Err(RouteError::Timeout(timeout)))
            }
        };

        let decision = match &result {
            Ok(_) => "allowed",
            Err(e) => e.kind(),
        };
        self.metrics.record_route_decision(decision, started.elapsed().as_secs_f64());

        result
    }

    async fn dial(&self, target: &RouteTarget) -> Result<TcpStream, ConnectionError> {
        let addr = target.backend_addr.clone();
        match tokio::time::timeout(self.timeouts.dial, TcpStream::connect(addr.as_str())).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(error = %e, "failed to set TCP_NODELAY on backend socket");
                }
                Ok(stream)
            }
            Ok(Err(source)) => Err(ConnectionError::Dial { addr, source }),
            Err(_) => Err(ConnectionError::DialTimeout { addr, timeout: self.timeouts.dial }),
        }
    }
}

fn transition(state: ConnectionState) {
    debug!(%state, "connection state");
}
