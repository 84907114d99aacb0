//! # Router Client
//!
//! Client side of the routing handshake, used by the `mtls-connect` binary
//! and by the integration tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::ring;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::errors::{Error, Result, TlsError};
use crate::proxy::protocol::ERROR_PREFIX;
use crate::utils::{load_certificate_bundle, load_trust_pool};

/// Longest reply line accepted from the router
const MAX_REPLY_LEN: usize = 1024;

/// The router's answer to a routing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteReply {
    Ok,
    Error(String),
}

/// Client TLS config presenting `chain`/`key` and trusting `roots` for the router.
pub fn build_client_config(
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    roots: RootCertStore,
) -> Result<Arc<ClientConfig>> {
    let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|err| TlsError::Configuration(format!("invalid protocol versions: {err}")))?
        .with_root_certificates(roots)
        .with_client_auth_cert(chain, key)
        .map_err(|err| TlsError::Configuration(format!("invalid client certificate: {err}")))?;

    Ok(Arc::new(config))
}

/// Load the client certificate, key and router CA bundles from PEM files.
pub fn load_client_config(
    cert_path: &Path,
    key_path: &Path,
    ca_paths: &[PathBuf],
) -> Result<Arc<ClientConfig>> {
    let bundle = load_certificate_bundle(cert_path, key_path, None)?;
    let roots = load_trust_pool(ca_paths)?;
    build_client_config(bundle.chain(), bundle.private_key, roots)
}

/// Open a TCP connection to `addr` and complete the TLS handshake.
pub async fn connect(
    addr: &str,
    server_name: &str,
    config: Arc<ClientConfig>,
) -> Result<TlsStream<TcpStream>> {
    let name = ServerName::try_from(server_name.to_string())
        .map_err(|e| Error::config(format!("Invalid server name '{}': {}", server_name, e)))?;

    let tcp = TcpStream::connect(addr)
        .await
        .map_err(|e| Error::transport(format!("Failed to connect to {}: {}", addr, e)))?;
    tcp.set_nodelay(true)?;

    let stream = TlsConnector::from(config)
        .connect(name, tcp)
        .await
        .map_err(|e| Error::transport(format!("TLS handshake with {} failed: {}", addr, e)))?;

    debug!(%addr, server_name, "TLS session established");
    Ok(stream)
}

/// Send the routing key (when delivered in-stream) and wait for the reply.
///
/// Pass `None` when the key travels in the TLS server name.
pub async fn open_route<S>(stream: &mut S, connect_id: Option<&str>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Some(connect_id) = connect_id {
        stream.write_all(format!("{}\n", connect_id).as_bytes()).await?;
        stream.flush().await?;
    }

    match read_reply(stream).await? {
        Some(RouteReply::Ok) => Ok(()),
        Some(RouteReply::Error(message)) => {
            Err(Error::transport(format!("Router refused connection: {}", message)))
        }
        None => Err(Error::transport("Router closed the connection without a reply")),
    }
}

/// Read one reply line. `None` when the router closes without answering.
///
/// Reads byte by byte so nothing after the line is consumed.
pub async fn read_reply<R>(reader: &mut R) -> std::io::Result<Option<RouteReply>>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::with_capacity(64);

    loop {
        let byte = match reader.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof && line.is_empty() => {
                return Ok(None)
            }
            Err(e) => return Err(e),
        };

        if byte == b'\n' {
            break;
        }
        if line.len() >= MAX_REPLY_LEN {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "reply line too long"));
        }
        line.push(byte);
    }

    let line = String::from_utf8_lossy(&line);
    let line = line.trim_end_matches('\r');

    Ok(Some(match line.strip_prefix(ERROR_PREFIX) {
        Some(message) => RouteReply::Error(message.to_string()),
        None if line == "OK" => RouteReply::Ok,
        None => RouteReply::Error(line.to_string()),
    }))
}

/// Copy `input` to the router and the router's bytes to `output`.
///
/// End of input half-closes the session; returns when the router side
/// closes, with the number of bytes received.
pub async fn pipe<S, I, O>(stream: S, mut input: I, mut output: O) -> std::io::Result<u64>
where
    S: AsyncRead + AsyncWrite,
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    let upload = async {
        if let Err(e) = tokio::io::copy(&mut input, &mut writer).await {
            debug!(error = %e, "upload ended with error");
        }
        let _ = writer.shutdown().await;
        futures::future::pending::<()>().await
    };

    let received = tokio::select! {
        copied = tokio::io::copy(&mut reader, &mut output) => copied?,
        _ = upload => 0,
    };

    output.flush().await?;
    Ok(received)
}
