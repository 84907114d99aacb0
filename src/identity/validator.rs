use std::sync::Arc;

use rustls::{
    crypto::ring,
    pki_types::{CertificateDer, UnixTime},
    server::{danger::ClientCertVerifier, WebPkiClientVerifier},
    RootCertStore,
};
use x509_parser::prelude::*;

use crate::errors::{IdentityError, TlsError};

/// Verifies client certificate chains against the configured CA trust pool.
///
/// The same verifier is installed in the TLS acceptor, so a chain that passes
/// the handshake passes here too; the explicit check exists so identity is
/// only ever derived from a chain this process has verified itself.
#[derive(Clone)]
pub struct CertificateValidator {
    verifier: Arc<dyn ClientCertVerifier>,
}

impl std::fmt::Debug for CertificateValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateValidator").finish_non_exhaustive()
    }
}

impl CertificateValidator {
    pub fn new(roots: Arc<RootCertStore>) -> Result<Self, TlsError> {
        let verifier =
            WebPkiClientVerifier::builder_with_provider(roots, Arc::new(ring::default_provider()))
                .build()
                .map_err(|e| TlsError::Configuration(e.to_string()))?;

        Ok(Self { verifier })
    }

    /// Verifier for the TLS acceptor, enforcing a client certificate.
    pub fn client_verifier(&self) -> Arc<dyn ClientCertVerifier> {
        self.verifier.clone()
    }

    /// Verify `chain` (leaf first) to any trusted root and require `clientAuth` usage.
    pub fn validate(&self, chain: &[CertificateDer<'_>]) -> Result<(), IdentityError> {
        let (leaf, intermediates) = chain.split_first().ok_or_else(|| {
            IdentityError::CertificateInvalid("no client certificate presented".to_string())
        })?;

        self.verifier
            .verify_client_cert(leaf, intermediates, UnixTime::now())
            .map_err(|e| IdentityError::CertificateInvalid(e.to_string()))?;

        require_client_auth(leaf)
    }
}

fn require_client_auth(leaf: &CertificateDer<'_>) -> Result<(), IdentityError> {
    let (_, parsed) = X509Certificate::from_der(leaf.as_ref())
        .map_err(|e| IdentityError::CertificateInvalid(format!("unparseable certificate: {e}")))?;

    let eku = parsed
        .extended_key_usage()
        .map_err(|e| IdentityError::CertificateInvalid(format!("invalid extended key usage: {e}")))?;

    match eku {
        Some(eku) if eku.value.client_auth => Ok(()),
        Some(_) => Err(IdentityError::CertificateInvalid(
            "certificate is not valid for client authentication".to_string(),
        )),
        None => Err(IdentityError::CertificateInvalid(
            "certificate has no extended key usage".to_string(),
        )),
    }
}
