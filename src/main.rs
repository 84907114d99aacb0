use std::sync::Arc;

use clap::Parser;
use mtls_router::{
    cli::Cli,
    observability::{init_observability, log_config_info},
    proxy::ProxyServer,
    routing::AuthorizationStore,
    storage::{close_pool, create_pool, SqlxBackendHostRepository},
    Result, APP_NAME, VERSION,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (optional - won't fail if missing)
    // This must happen before the CLI reads its environment fallbacks
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let config = Cli::parse().into_config();
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(2);
    }

    init_observability(&config.observability)?;

    info!(app_name = APP_NAME, version = VERSION, "Starting mTLS router");
    log_config_info(&config);

    let pool = create_pool(&config.database).await?;
    let repository = SqlxBackendHostRepository::new(pool.clone());
    let router = Arc::new(AuthorizationStore::new(Arc::new(repository)));

    let server = match ProxyServer::from_config(&config, router).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Failed to start listener");
            close_pool(&pool).await;
            return Err(e);
        }
    };

    tokio::spawn(shutdown_on_signal(server.shutdown_token()));

    let result = server.run().await;
    if let Err(e) = &result {
        error!(error = %e, "Router terminated with error");
    }

    close_pool(&pool).await;
    info!("mTLS router shutdown completed");
    result
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
async fn shutdown_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }

    shutdown.cancel();
}
