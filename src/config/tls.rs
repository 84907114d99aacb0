use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{Result, TlsError};

/// TLS material for the client-facing listener.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct TlsConfig {
    /// Trusted client CA bundles; all of them are loaded into one pool
    pub ca_cert_paths: Vec<PathBuf>,
    pub server_cert_path: PathBuf,
    pub server_key_path: PathBuf,
    /// Optional intermediates appended after the server certificate
    pub chain_path: Option<PathBuf>,
}

impl TlsConfig {
    /// Check that the referenced files are configured and the CA bundles exist.
    pub fn validate_files(&self) -> Result<()> {
        if self.ca_cert_paths.is_empty() {
            return Err(TlsError::MissingCaCertificates.into());
        }

        for path in &self.ca_cert_paths {
            if !path.is_file() {
                return Err(TlsError::CaReadError {
                    path: path.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "CA certificate file does not exist",
                    ),
                }
                .into());
            }
        }

        if self.server_cert_path.as_os_str().is_empty() {
            return Err(TlsError::MissingCertificatePath.into());
        }

        if self.server_key_path.as_os_str().is_empty() {
            return Err(TlsError::MissingPrivateKeyPath.into());
        }

        Ok(())
    }
}

/// Split a comma-separated list of CA bundle paths, dropping blanks.
pub fn parse_ca_cert_paths(raw: &str) -> Vec<PathBuf> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .collect()
}
