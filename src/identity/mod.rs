//! # Client Authentication
//!
//! Turns the certificate chain a client presented during the TLS handshake
//! into a [`UserIdentity`]: the chain is verified against the trust pool,
//! then the identity URI and issuer DN are checked against the trust domain.

pub mod extractor;
pub mod validator;

use rustls::pki_types::CertificateDer;

use crate::domain::UserIdentity;
use crate::errors::IdentityError;

pub use extractor::IdentityExtractor;
pub use validator::CertificateValidator;

/// Chain verification followed by identity extraction.
#[derive(Debug, Clone)]
pub struct Authenticator {
    validator: CertificateValidator,
    extractor: IdentityExtractor,
}

impl Authenticator {
    pub fn new(validator: CertificateValidator, extractor: IdentityExtractor) -> Self {
        Self { validator, extractor }
    }

    pub fn authenticate(&self, chain: &[CertificateDer<'_>]) -> Result<UserIdentity, IdentityError> {
        self.validator.validate(chain)?;

        let leaf = chain.first().ok_or_else(|| {
            IdentityError::CertificateInvalid("no client certificate presented".to_string())
        })?;
        self.extractor.extract(leaf)
    }
}
