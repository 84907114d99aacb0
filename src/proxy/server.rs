//! # Proxy Server
//!
//! Owns the client-facing listener. The accept loop only accepts and spawns:
//! the TLS handshake and everything after it run in the connection's own
//! task, tracked so shutdown can wait for in-flight connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::AppConfig;
use crate::errors::{Error, Result};
use crate::identity::{Authenticator, CertificateValidator, IdentityExtractor};
use crate::observability::MetricsRecorder;
use crate::routing::Router;
use crate::utils::load_trust_pool;

use super::handler::{ConnectionError, ConnectionHandler, HandlerTimeouts, TlsSession};
use super::protocol::KeyDelivery;
use super::splice::SpliceOutcome;
use super::tls::configure_tls_acceptor;

/// Default deadline for the TLS handshake
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time shutdown waits for in-flight connections
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    pub handshake_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT, shutdown_grace: DEFAULT_SHUTDOWN_GRACE }
    }
}

pub struct ProxyServer {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    handler: ConnectionHandler,
    settings: ServerSettings,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    metrics: MetricsRecorder,
}

impl std::fmt::Debug for ProxyServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyServer")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ProxyServer {
    /// Bind the listener. Shutdown is driven by the handler's token.
    pub async fn bind(
        addr: &str,
        acceptor: TlsAcceptor,
        handler: ConnectionHandler,
        settings: ServerSettings,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::transport(format!("Failed to bind {}: {}", addr, e)))?;

        let shutdown = handler.shutdown_token().clone();

        Ok(Self {
            listener,
            acceptor,
            handler,
            settings,
            shutdown,
            tracker: TaskTracker::new(),
            metrics: MetricsRecorder::new(),
        })
    }

    /// Assemble the TLS, identity and key delivery layers from configuration
    /// around `router`, then bind.
    pub async fn from_config(config: &AppConfig, router: Arc<dyn Router>) -> Result<Self> {
        let roots = load_trust_pool(&config.tls.ca_cert_paths)?;
        info!(roots = roots.len(), bundles = config.tls.ca_cert_paths.len(), "Loaded client CA trust pool");

        let validator = CertificateValidator::new(Arc::new(roots))?;
        let acceptor = configure_tls_acceptor(&config.tls, &validator)?;
        let extractor = IdentityExtractor::new(&config.identity.scheme, &config.identity.issuer);
        let authenticator = Arc::new(Authenticator::new(validator, extractor));
        let key_delivery = Arc::new(KeyDelivery::from_config(&config.listener)?);

        let timeouts = HandlerTimeouts {
            route: config.listener.route_timeout(),
            dial: config.listener.dial_timeout(),
        };
        let handler =
            ConnectionHandler::new(authenticator, key_delivery, router, timeouts, CancellationToken::new());

        let settings = ServerSettings {
            handshake_timeout: config.listener.handshake_timeout(),
            shutdown_grace: config.listener.shutdown_grace(),
        };

        Self::bind(&config.listener.listen_addr, acceptor, handler, settings).await
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Error::from)
    }

    /// Token that stops the server when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept until shutdown, then wait for in-flight connections up to the grace period.
    pub async fn run(self) -> Result<()> {
        let local_addr = self.local_addr()?;
        info!(%local_addr, "mTLS router listening");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(e) if is_connection_error(&e) => {
                        debug!(error = %e, "connection aborted before accept");
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }

        let ProxyServer { listener, tracker, settings, .. } = self;
        drop(listener);
        tracker.close();

        info!(in_flight = tracker.len(), grace = ?settings.shutdown_grace, "Listener closed, draining connections");

        if tokio::time::timeout(settings.shutdown_grace, tracker.wait()).await.is_err() {
            warn!(remaining = tracker.len(), "Shutdown grace period elapsed with connections still open");
        } else {
            info!("All connections closed");
        }

        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let acceptor = self.acceptor.clone();
        let handler = self.handler.clone();
        let handshake_timeout = self.settings.handshake_timeout;
        let metrics = self.metrics;
        let span = crate::connection_span!(peer);

        self.tracker.spawn(
            async move {
                let tls = match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
                    Ok(Ok(tls)) => tls,
                    Ok(Err(e)) => {
                        debug!(error = %e, "TLS handshake failed");
                        metrics.record_handshake_failure("error");
                        return;
                    }
                    Err(_) => {
                        debug!(timeout = ?handshake_timeout, "TLS handshake timed out");
                        metrics.record_handshake_failure("timeout");
                        return;
                    }
                };

                let session = TlsSession::from_stream(&tls);
                metrics.record_connection_opened();
                let started = Instant::now();

                let result = handler.handle(tls, session).await;

                let outcome = match &result {
                    Ok(_) => "proxied",
                    Err(e) => e.kind(),
                };
                log_result(&result);
                metrics.record_connection_closed(outcome, started.elapsed().as_secs_f64());
            }
            .instrument(span),
        );
    }
}

fn log_result(result: &std::result::Result<SpliceOutcome, ConnectionError>) {
    match result {
        Ok(outcome) => info!(
            bytes_up = outcome.client_to_backend,
            bytes_down = outcome.backend_to_client,
            closed_by = %outcome.first_closed,
            "connection closed"
        ),
        Err(e @ ConnectionError::Identity(_)) => {
            warn!(error = %e, kind = e.kind(), "rejected client certificate")
        }
        Err(e @ ConnectionError::Route(route)) if route.is_denial() => {
            info!(error = %e, kind = e.kind(), "access denied")
        }
        Err(e) if e.is_client_fault() => {
            info!(error = %e, kind = e.kind(), stage = %e.stage(), "connection closed")
        }
        Err(e) => warn!(error = %e, kind = e.kind(), stage = %e.stage(), "connection failed"),
    }
}

fn is_connection_error(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
    )
}
