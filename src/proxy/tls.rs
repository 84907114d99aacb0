//! TLS acceptor for the client-facing listener.

use std::sync::Arc;

use rustls::crypto::ring;
use tokio_rustls::TlsAcceptor;
use tracing::info;

use crate::config::TlsConfig;
use crate::errors::{Error, Result, TlsError};
use crate::identity::CertificateValidator;
use crate::utils::{load_certificate_bundle, CertificateBundle};

/// Build a TLS 1.2+ acceptor that requires a client certificate verified by `validator`.
pub fn build_acceptor(bundle: &CertificateBundle, validator: &CertificateValidator) -> Result<TlsAcceptor> {
    let server_config =
        rustls::ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|err| TlsError::Configuration(format!("invalid protocol versions: {err}")))?
            .with_client_cert_verifier(validator.client_verifier())
            .with_single_cert(bundle.chain(), bundle.private_key.clone_key())
            .map_err(|err| TlsError::Configuration(format!("failed to load server certificate: {err}")))?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

/// Load the server certificate from disk and build the acceptor.
pub fn configure_tls_acceptor(tls: &TlsConfig, validator: &CertificateValidator) -> Result<TlsAcceptor> {
    let bundle = load_certificate_bundle(
        tls.server_cert_path.as_path(),
        tls.server_key_path.as_path(),
        tls.chain_path.as_deref(),
    )
    .map_err(Error::from)?;

    info!(
        subject = %bundle.info.subject,
        issuer = %bundle.info.issuer,
        not_after = %bundle.info.not_after,
        cert_path = %bundle.cert_path.display(),
        "Loaded server certificate"
    );

    build_acceptor(&bundle, validator)
}
