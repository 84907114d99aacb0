//! Utility functions and helpers

pub mod certificates;

pub use certificates::{
    certificate_info, load_certificate_bundle, load_trust_pool, CertificateBundle, CertificateInfo,
};
