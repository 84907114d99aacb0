//! Connect to a backend through the mTLS router and pipe stdin/stdout.
//!
//! Works as an SSH `ProxyCommand`:
//!
//! ```text
//! ssh -o ProxyCommand='mtls-connect --connect-id %h --cert me.pem --key me.key --ca ca.pem' host-1
//! ```

use std::path::PathBuf;

use clap::Parser;
use mtls_router::{
    client::{connect, load_client_config, open_route, pipe},
    config::parse_ca_cert_paths,
    Error, Result,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mtls-connect")]
#[command(about = "Open a routed connection through the mTLS router")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Router address
    #[arg(long, env = "MTLS_CONNECT_ADDR", default_value = "localhost:8443")]
    addr: String,

    /// Backend to reach
    #[arg(long, env = "MTLS_CONNECT_ID")]
    connect_id: String,

    /// Client certificate (PEM)
    #[arg(long, env = "MTLS_CONNECT_CERT")]
    cert: PathBuf,

    /// Client private key (PEM)
    #[arg(long, env = "MTLS_CONNECT_KEY")]
    key: PathBuf,

    /// Comma-separated CA bundles trusted for the router's certificate
    #[arg(long, env = "MTLS_CONNECT_CA")]
    ca: String,

    /// TLS server name; defaults to the host part of --addr
    #[arg(long, env = "MTLS_CONNECT_SERVER_NAME")]
    server_name: Option<String>,

    /// Send the routing key as `<connect-id>.<domain>` SNI instead of in-stream
    #[arg(long, env = "MTLS_CONNECT_ROUTING_DOMAIN")]
    routing_domain: Option<String>,

    #[arg(long, env = "MTLS_CONNECT_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the session, so logs go to stderr
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .map_err(|e| Error::config(format!("Invalid log level '{}': {}", args.log_level, e)))?;
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let config = load_client_config(&args.cert, &args.key, &parse_ca_cert_paths(&args.ca))?;

    let (server_name, key_in_stream) = match &args.routing_domain {
        Some(domain) => (format!("{}.{}", args.connect_id, domain.trim_start_matches('.')), false),
        None => (args.server_name.clone().unwrap_or_else(|| host_part(&args.addr)), true),
    };

    let mut stream = connect(&args.addr, &server_name, config).await?;
    open_route(&mut stream, key_in_stream.then_some(args.connect_id.as_str())).await?;
    info!(connect_id = %args.connect_id, "route established");

    let received = pipe(stream, tokio::io::stdin(), tokio::io::stdout()).await?;
    debug!(bytes = received, "session closed");
    Ok(())
}

fn host_part(addr: &str) -> String {
    match addr.rsplit_once(':') {
        Some((host, _)) => host.trim_start_matches('[').trim_end_matches(']').to_string(),
        None => addr.to_string(),
    }
}
