//! Identity extraction from client certificates.
//!
//! The identity is carried as a URI Subject Alternative Name:
//! ```text
//! spiffe://{issuer}/orgs/{org_id}/users/{user_id}
//! ```
//! The URI host must be the configured trust domain, and the certificate's
//! issuer DN must name the same domain.

use rustls::pki_types::CertificateDer;
use url::Url;
use x509_parser::prelude::*;

use crate::domain::{OrgId, UserId, UserIdentity};
use crate::errors::IdentityError;

/// Extracts a [`UserIdentity`] from a verified client certificate.
#[derive(Debug, Clone)]
pub struct IdentityExtractor {
    scheme: String,
    issuer: String,
}

impl IdentityExtractor {
    pub fn new(scheme: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self { scheme: scheme.into().to_ascii_lowercase(), issuer: issuer.into() }
    }

    /// Parse the leaf certificate, extract its identity and check the issuer DN.
    pub fn extract(&self, cert: &CertificateDer<'_>) -> Result<UserIdentity, IdentityError> {
        let (_, parsed) = X509Certificate::from_der(cert.as_ref())
            .map_err(|e| IdentityError::CertificateInvalid(format!("unparseable certificate: {e}")))?;

        let uris = san_uris(&parsed);
        let identity = self.extract_from_uris(uris.iter().map(String::as_str))?;

        self.check_issuer_dn(parsed.issuer())?;

        Ok(identity)
    }

    /// Pick the identity out of a list of SAN URIs.
    ///
    /// URIs with another scheme are ignored. Candidates are tried in order and
    /// the first that parses wins; if none does, the first candidate's error
    /// is returned.
    pub fn extract_from_uris<'a, I>(&self, uris: I) -> Result<UserIdentity, IdentityError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut first_error = None;

        for uri in uris.into_iter().filter(|uri| self.is_candidate(uri)) {
            match self.parse_identity_uri(uri) {
                Ok(identity) => return Ok(identity),
                Err(e) => {
                    tracing::debug!(uri = %uri, error = %e, "skipping identity candidate");
                    first_error.get_or_insert(e);
                }
            }
        }

        Err(first_error.unwrap_or_else(|| IdentityError::IdentityNotFound {
            scheme: self.scheme.clone(),
        }))
    }

    /// Parse one identity URI of the configured scheme.
    pub fn parse_identity_uri(&self, raw: &str) -> Result<UserIdentity, IdentityError> {
        let uri = Url::parse(raw).map_err(|e| IdentityError::malformed(raw, e.to_string()))?;

        if uri.scheme() != self.scheme {
            return Err(IdentityError::malformed(
                raw,
                format!("expected scheme '{}', got '{}'", self.scheme, uri.scheme()),
            ));
        }

        let host = uri.host_str().unwrap_or_default();
        let authority = match uri.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        if authority != self.issuer {
            return Err(IdentityError::IssuerMismatch {
                expected: self.issuer.clone(),
                actual: authority,
            });
        }

        if uri.query().is_some() || uri.fragment().is_some() {
            return Err(IdentityError::malformed(raw, "query and fragment are not allowed"));
        }

        let (org_id, user_id) =
            parse_identity_path(raw_path(raw)).map_err(|r| IdentityError::malformed(raw, r))?;

        Ok(UserIdentity {
            user_id: UserId::from(user_id),
            org_id: OrgId::from(org_id),
            issuer: authority,
        })
    }

    /// The issuer DN must reference the trust domain, by common name first and
    /// then by any other attribute value.
    pub fn check_issuer_dn(&self, issuer: &X509Name<'_>) -> Result<(), IdentityError> {
        let common_name_matches = issuer
            .iter_common_name()
            .filter_map(|cn| cn.as_str().ok())
            .any(|cn| matches_issuer(cn, &self.issuer));

        let attribute_matches = || {
            issuer
                .iter_attributes()
                .filter_map(|attr| attr.as_str().ok())
                .any(|value| matches_issuer(value, &self.issuer))
        };

        if common_name_matches || attribute_matches() {
            Ok(())
        } else {
            Err(IdentityError::IssuerMismatch {
                expected: self.issuer.clone(),
                actual: issuer.to_string(),
            })
        }
    }

    fn is_candidate(&self, uri: &str) -> bool {
        uri.split_once(':').is_some_and(|(scheme, _)| scheme.eq_ignore_ascii_case(&self.scheme))
    }
}

/// The path exactly as written in `raw`, without scheme, authority, query or fragment.
///
/// `Url::path` resolves `.` and `..` segments, so segment checks run on this instead.
fn raw_path(raw: &str) -> &str {
    let rest = raw.split_once("://").map_or(raw, |(_, rest)| rest);
    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    rest.find('/').map_or("", |start| &rest[start..])
}

/// `orgs/<org>/users/<user>`, with or without the leading slash.
fn parse_identity_path(path: &str) -> Result<(&str, &str), String> {
    let segments: Vec<&str> = path.strip_prefix('/').unwrap_or(path).split('/').collect();

    match segments.as_slice() {
        ["orgs", org_id, "users", user_id] => {
            check_id_segment("org-id", org_id)?;
            check_id_segment("user-id", user_id)?;
            Ok((org_id, user_id))
        }
        [first, _, third, _] if *first != "orgs" || *third != "users" => Err(format!(
            "expected '/orgs/<org-id>/users/<user-id>', got segments '{first}' and '{third}'"
        )),
        _ => Err(format!(
            "expected '/orgs/<org-id>/users/<user-id>', got {} segments",
            segments.len()
        )),
    }
}

fn check_id_segment(name: &str, segment: &str) -> Result<(), String> {
    if segment.is_empty() {
        Err(format!("{name} is empty"))
    } else if segment == "." || segment == ".." {
        Err(format!("{name} cannot be a dot segment"))
    } else if segment.contains('%') {
        Err(format!("{name} cannot contain percent-encoded characters"))
    } else {
        Ok(())
    }
}

/// Case-insensitive domain match, ignoring a `*.` prefix on either side.
fn matches_issuer(domain: &str, expected: &str) -> bool {
    let domain = domain.strip_prefix("*.").unwrap_or(domain).to_ascii_lowercase();
    let expected = expected.strip_prefix("*.").unwrap_or(expected).to_ascii_lowercase();

    domain == expected || domain.ends_with(&format!(".{expected}"))
}

fn san_uris(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut uris = Vec::new();
    for ext in cert.extensions() {
        if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
            for name in &san.general_names {
                if let GeneralName::URI(uri) = name {
                    uris.push(uri.to_string());
                }
            }
        }
    }
    uris
}
