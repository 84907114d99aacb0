//! Ephemeral PKI for integration tests.
//!
//! A `TestCa` issues server certificates and client certificates carrying
//! identity URIs. PEM files are written to a temp dir when a test needs
//! paths for `TlsConfig`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, SanType,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use time::{Duration, OffsetDateTime};

/// Trust domain used throughout the tests
pub const ISSUER: &str = "tinyscale.com";

/// Identity URI for `user` in `org` under `ISSUER`.
pub fn identity_uri(org: &str, user: &str) -> String {
    format!("spiffe://{}/orgs/{}/users/{}", ISSUER, org, user)
}

/// A certificate and its key.
pub struct Issued {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl Issued {
    pub fn der(&self) -> CertificateDer<'static> {
        self.cert.der().clone()
    }

    pub fn key_der(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key.serialize_der()))
    }

    pub fn cert_pem(&self) -> String {
        self.cert.pem()
    }

    pub fn key_pem(&self) -> String {
        self.key.serialize_pem()
    }

    /// Write `<stem>.pem` and `<stem>.key` into `dir`.
    pub fn write_to(&self, dir: &Path, stem: &str) -> anyhow::Result<(PathBuf, PathBuf)> {
        let cert_path = dir.join(format!("{stem}.pem"));
        let key_path = dir.join(format!("{stem}.key"));
        fs::write(&cert_path, self.cert_pem()).context("write certificate")?;
        fs::write(&key_path, self.key_pem()).context("write private key")?;
        Ok((cert_path, key_path))
    }
}

/// Options for client certificates beyond the common case.
pub struct ClientCertOptions {
    pub uris: Vec<String>,
    pub client_auth: bool,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl ClientCertOptions {
    pub fn with_uris(uris: Vec<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self { uris, client_auth: true, not_before: now - Duration::days(1), not_after: now + Duration::days(30) }
    }
}

/// A self-signed certificate authority.
pub struct TestCa {
    pub issued: Issued,
}

impl TestCa {
    /// CA whose subject CN is `common_name`.
    pub fn new(common_name: &str) -> anyhow::Result<Self> {
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, common_name);
        params.distinguished_name.push(DnType::OrganizationName, "Tinyscale Test");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

        let now = OffsetDateTime::now_utc();
        params.not_before = now - Duration::days(1);
        params.not_after = now + Duration::days(365);

        let key = KeyPair::generate().context("generate CA key")?;
        let cert = params.self_signed(&key).context("self-sign CA")?;

        Ok(Self { issued: Issued { cert, key } })
    }

    /// CA inside the test trust domain.
    pub fn tinyscale() -> anyhow::Result<Self> {
        Self::new(&format!("ca.{ISSUER}"))
    }

    pub fn der(&self) -> CertificateDer<'static> {
        self.issued.der()
    }

    pub fn pem(&self) -> String {
        self.issued.cert_pem()
    }

    /// Server certificate for `dns_names`.
    pub fn issue_server(&self, dns_names: &[&str]) -> anyhow::Result<Issued> {
        let names = dns_names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        let mut params = CertificateParams::new(names).context("build server params")?;
        params.distinguished_name.push(DnType::CommonName, "mtls-router test");

        let now = OffsetDateTime::now_utc();
        params.not_before = now - Duration::days(1);
        params.not_after = now + Duration::days(30);

        self.sign(params)
    }

    /// Client certificate carrying `identity_uri` as a SAN URI.
    pub fn issue_client(&self, identity_uri: &str) -> anyhow::Result<Issued> {
        self.issue_client_with(ClientCertOptions::with_uris(vec![identity_uri.to_string()]))
    }

    pub fn issue_client_with(&self, options: ClientCertOptions) -> anyhow::Result<Issued> {
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, "test client");
        params.not_before = options.not_before;
        params.not_after = options.not_after;

        if options.client_auth {
            params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        } else {
            params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        }

        for uri in options.uris {
            let uri = uri.try_into().context("encode SAN URI")?;
            params.subject_alt_names.push(SanType::URI(uri));
        }

        self.sign(params)
    }

    fn sign(&self, params: CertificateParams) -> anyhow::Result<Issued> {
        let key = KeyPair::generate().context("generate leaf key")?;
        let cert = params
            .signed_by(&key, &self.issued.cert, &self.issued.key)
            .context("sign leaf certificate")?;
        Ok(Issued { cert, key })
    }
}

/// Write several CA certificates into one PEM bundle.
pub fn write_bundle(path: &Path, cas: &[&TestCa]) -> anyhow::Result<()> {
    let bundle = cas.iter().map(|ca| ca.pem()).collect::<Vec<_>>().join("");
    fs::write(path, bundle).context("write CA bundle")
}
