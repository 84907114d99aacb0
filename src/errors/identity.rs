use thiserror::Error;

/// Reasons a presented client certificate does not yield a usable identity.
///
/// None of these are reported to the client; the connection is closed silently.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// No certificate, an unparseable certificate, or a chain that does not
    /// verify against any trusted CA with `clientAuth` usage.
    #[error("certificate invalid: {0}")]
    CertificateInvalid(String),

    /// No SAN URI uses the identity scheme.
    #[error("no {scheme} URI found in certificate")]
    IdentityNotFound { scheme: String },

    /// The identity URI, or the certificate issuer DN, names another trust domain.
    #[error("issuer mismatch: expected '{expected}', got '{actual}'")]
    IssuerMismatch { expected: String, actual: String },

    /// The identity URI path is not `/orgs/<org-id>/users/<user-id>`.
    #[error("malformed identity '{uri}': {reason}")]
    MalformedIdentity { uri: String, reason: String },
}

impl IdentityError {
    pub(crate) fn malformed(uri: &str, reason: impl Into<String>) -> Self {
        Self::MalformedIdentity { uri: uri.to_string(), reason: reason.into() }
    }

    /// Short stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            IdentityError::CertificateInvalid(_) => "certificate_invalid",
            IdentityError::IdentityNotFound { .. } => "identity_not_found",
            IdentityError::IssuerMismatch { .. } => "issuer_mismatch",
            IdentityError::MalformedIdentity { .. } => "malformed_identity",
        }
    }
}
