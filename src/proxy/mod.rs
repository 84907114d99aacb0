//! # mTLS Proxy
//!
//! Client-facing side of the router: TLS termination with required client
//! certificates, the routing key handshake, and the byte splice to the
//! selected backend.

pub mod handler;
pub mod protocol;
pub mod server;
pub mod splice;
pub mod tls;

pub use handler::{ConnectionError, ConnectionHandler, ConnectionState, HandlerTimeouts, TlsSession};
pub use protocol::{KeyDelivery, ERROR_PREFIX, OK_RESPONSE};
pub use server::{ProxyServer, ServerSettings};
pub use splice::{splice, Direction, SpliceOutcome};
pub use tls::{build_acceptor, configure_tls_acceptor};
