//! Common test utilities for all integration tests.
//!
//! Provides the ephemeral PKI, an in-memory authorization store, echo
//! backends, and a harness that runs the real router on a loopback port.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

pub mod memory_store;
pub mod pki;
#[cfg(feature = "postgres_tests")]
pub mod test_db;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mtls_router::client::{build_client_config, connect};
use mtls_router::config::{AppConfig, KeyDeliveryMode};
use mtls_router::proxy::ProxyServer;
use mtls_router::routing::Router;
use rustls::{ClientConfig, RootCertStore};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_util::sync::CancellationToken;

use pki::{write_bundle, Issued, TestCa};

/// Routing domain used by SNI-mode tests
pub const ROUTING_DOMAIN: &str = "connect.example.com";

pub struct RouterOptions {
    pub key_delivery: KeyDeliveryMode,
    pub route_timeout_seconds: u64,
    pub shutdown_grace_seconds: u64,
    /// Additional client CAs trusted next to the primary one
    pub extra_client_cas: Vec<TestCa>,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            key_delivery: KeyDeliveryMode::Stream,
            route_timeout_seconds: 5,
            shutdown_grace_seconds: 5,
            extra_client_cas: Vec::new(),
        }
    }
}

/// A router running on `127.0.0.1:<ephemeral>`.
pub struct TestRouter {
    pub addr: SocketAddr,
    pub ca: TestCa,
    pub extra_client_cas: Vec<TestCa>,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<mtls_router::Result<()>>,
    _dir: TempDir,
}

impl TestRouter {
    pub async fn start(router: Arc<dyn Router>) -> anyhow::Result<Self> {
        Self::start_with(router, RouterOptions::default()).await
    }

    pub async fn start_with(router: Arc<dyn Router>, options: RouterOptions) -> anyhow::Result<Self> {
        let dir = TempDir::new()?;
        let ca = TestCa::tinyscale()?;

        let wildcard = format!("*.{ROUTING_DOMAIN}");
        let server = ca.issue_server(&["localhost", wildcard.as_str()])?;
        let (server_cert_path, server_key_path) = server.write_to(dir.path(), "server")?;

        let primary_bundle = dir.path().join("ca.pem");
        write_bundle(&primary_bundle, &[&ca])?;
        let mut ca_cert_paths = vec![primary_bundle];
        if !options.extra_client_cas.is_empty() {
            let rotation_bundle = dir.path().join("rotation.pem");
            write_bundle(&rotation_bundle, &options.extra_client_cas.iter().collect::<Vec<_>>())?;
            ca_cert_paths.push(rotation_bundle);
        }

        let mut config = AppConfig::default();
        config.listener.listen_addr = "127.0.0.1:0".to_string();
        config.listener.key_delivery = options.key_delivery;
        config.listener.route_timeout_seconds = options.route_timeout_seconds;
        config.listener.shutdown_grace_seconds = options.shutdown_grace_seconds;
        if options.key_delivery == KeyDeliveryMode::Sni {
            config.listener.routing_domain = Some(ROUTING_DOMAIN.to_string());
        }
        config.tls.ca_cert_paths = ca_cert_paths;
        config.tls.server_cert_path = server_cert_path;
        config.tls.server_key_path = server_key_path;
        config.identity.issuer = pki::ISSUER.to_string();

        let server = ProxyServer::from_config(&config, router).await?;
        let addr = server.local_addr()?;
        let shutdown = server.shutdown_token();
        let handle = tokio::spawn(server.run());

        Ok(Self { addr, ca, extra_client_cas: options.extra_client_cas, shutdown, handle, _dir: dir })
    }

    /// Client config presenting `client` and trusting this router's server certificate.
    pub fn client_config(&self, client: &Issued) -> anyhow::Result<Arc<ClientConfig>> {
        let mut roots = RootCertStore::empty();
        roots.add(self.ca.der())?;
        Ok(build_client_config(vec![client.der()], client.key_der(), roots)?)
    }

    /// TLS connection as `client`, with `localhost` as the server name.
    pub async fn connect(&self, client: &Issued) -> anyhow::Result<TlsStream<TcpStream>> {
        self.connect_as(client, "localhost").await
    }

    pub async fn connect_as(&self, client: &Issued, server_name: &str) -> anyhow::Result<TlsStream<TcpStream>> {
        let config = self.client_config(client)?;
        Ok(connect(&self.addr.to_string(), server_name, config).await?)
    }

    /// Client certificate for `user` in `org` from the primary CA.
    pub fn client(&self, org: &str, user: &str) -> anyhow::Result<Issued> {
        self.ca.issue_client(&pki::identity_uri(org, user))
    }
}

/// Backend that echoes every byte back.
pub async fn spawn_echo_backend() -> anyhow::Result<SocketAddr> {
    spawn_tagged_backend("").await
}

/// Backend that first writes `tag`, then echoes.
pub async fn spawn_tagged_backend(tag: &str) -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let tag = tag.as_bytes().to_vec();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let tag = tag.clone();
            tokio::spawn(async move {
                if !tag.is_empty() && stream.write_all(&tag).await.is_err() {
                    return;
                }
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    Ok(addr)
}

/// An address nothing listens on.
pub async fn closed_port() -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

/// Read exactly `len` bytes with a deadline.
pub async fn read_exactly<R>(reader: &mut R, len: usize) -> anyhow::Result<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = vec![0u8; len];
    tokio::time::timeout(Duration::from_secs(5), reader.read_exact(&mut buf)).await??;
    Ok(buf)
}
