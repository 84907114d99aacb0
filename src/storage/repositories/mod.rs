//! # Repositories
//!
//! Data access for the authorization tables.

pub mod backend_host;

pub use backend_host::{BackendHostRepository, SqlxBackendHostRepository};
