use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::anyhow;
use chrono::{DateTime, TimeZone, Utc};
use rustls::{
    pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer},
    RootCertStore,
};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::errors::TlsError;

/// Metadata extracted from the primary leaf certificate for logging and validation.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// Server certificate, intermediates and key loaded for the listener.
#[derive(Debug)]
pub struct CertificateBundle {
    pub cert_path: PathBuf,
    pub leaf: CertificateDer<'static>,
    pub intermediates: Vec<CertificateDer<'static>>,
    pub private_key: PrivateKeyDer<'static>,
    pub info: CertificateInfo,
}

impl CertificateBundle {
    /// Leaf followed by intermediates, as presented during the handshake.
    pub fn chain(&self) -> Vec<CertificateDer<'static>> {
        let mut chain = Vec::with_capacity(1 + self.intermediates.len());
        chain.push(self.leaf.clone());
        chain.extend(self.intermediates.iter().cloned());
        chain
    }
}

/// Load and validate the listener's certificate materials from disk.
pub fn load_certificate_bundle(
    cert_path: &Path,
    key_path: &Path,
    chain_path: Option<&Path>,
) -> Result<CertificateBundle, TlsError> {
    let mut leaf_chain = read_pem_certificates(cert_path)?;

    if leaf_chain.is_empty() {
        return Err(TlsError::EmptyCertificateChain { path: cert_path.to_path_buf() });
    }

    let leaf = leaf_chain.remove(0);
    let mut intermediates = leaf_chain;

    if let Some(chain_path) = chain_path {
        intermediates.extend(read_pem_certificates(chain_path)?);
    }

    let key_bytes = fs::read(key_path)
        .map_err(|e| TlsError::PrivateKeyReadError { path: key_path.to_path_buf(), source: e })?;

    let private_key = PrivateKeyDer::from_pem_slice(&key_bytes).map_err(|err| {
        TlsError::InvalidPrivateKey { path: key_path.to_path_buf(), source: Some(anyhow!(err)) }
    })?;

    let info = certificate_info(&leaf, cert_path)?;
    validate_certificate_dates(&info, cert_path)?;

    Ok(CertificateBundle {
        cert_path: cert_path.to_path_buf(),
        leaf,
        intermediates,
        private_key,
        info,
    })
}

/// Build one trust pool from every CA bundle.
///
/// Each file may hold several certificates; all of them are trusted, which is
/// how an old and a new CA are kept valid side by side during rotation.
pub fn load_trust_pool(paths: &[PathBuf]) -> Result<RootCertStore, TlsError> {
    if paths.is_empty() {
        return Err(TlsError::MissingCaCertificates);
    }

    let mut store = RootCertStore::empty();

    for path in paths {
        let bytes = fs::read(path)
            .map_err(|e| TlsError::CaReadError { path: path.clone(), source: e })?;

        let certs: Vec<CertificateDer<'static>> = CertificateDer::pem_slice_iter(&bytes)
            .collect::<Result<_, _>>()
            .map_err(|err| TlsError::InvalidCaCertificate {
                path: path.clone(),
                source: anyhow!(err),
            })?;

        if certs.is_empty() {
            return Err(TlsError::EmptyCertificateChain { path: path.clone() });
        }

        for cert in certs {
            store.add(cert).map_err(|err| TlsError::InvalidCaCertificate {
                path: path.clone(),
                source: anyhow!(err),
            })?;
        }

        tracing::debug!(path = %path.display(), roots = store.len(), "loaded client CA bundle");
    }

    Ok(store)
}

fn read_pem_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let bytes = fs::read(path)
        .map_err(|e| TlsError::CertificateReadError { path: path.to_path_buf(), source: e })?;

    CertificateDer::pem_slice_iter(&bytes)
        .map(|result| {
            result.map_err(|err| TlsError::InvalidCertificatePem {
                path: path.to_path_buf(),
                source: anyhow!(err),
            })
        })
        .collect()
}

/// Subject, issuer and validity window of a DER certificate.
pub fn certificate_info(cert: &CertificateDer<'_>, path: &Path) -> Result<CertificateInfo, TlsError> {
    let (_, parsed) = X509Certificate::from_der(cert.as_ref()).map_err(|err| {
        TlsError::CertificateMetadata { path: path.to_path_buf(), source: anyhow!(err) }
    })?;

    let validity = parsed.validity();

    Ok(CertificateInfo {
        subject: parsed.subject().to_string(),
        issuer: parsed.issuer().to_string(),
        not_before: to_chrono(validity.not_before.timestamp(), path)?,
        not_after: to_chrono(validity.not_after.timestamp(), path)?,
    })
}

fn to_chrono(timestamp: i64, path: &Path) -> Result<DateTime<Utc>, TlsError> {
    Utc.timestamp_opt(timestamp, 0).single().ok_or_else(|| TlsError::CertificateMetadata {
        path: path.to_path_buf(),
        source: anyhow!("failed to convert certificate time"),
    })
}

fn validate_certificate_dates(info: &CertificateInfo, path: &Path) -> Result<(), TlsError> {
    let now = Utc::now();
    if info.not_before > now {
        return Err(TlsError::CertificateNotYetValid {
            path: path.to_path_buf(),
            not_before: info.not_before,
        });
    }
    if info.not_after <= now {
        return Err(TlsError::CertificateExpired {
            path: path.to_path_buf(),
            not_after: info.not_after,
        });
    }
    Ok(())
}
