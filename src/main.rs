//! Multi-user TCP Chat Relay - Entry Point
//!
//! Loads configuration, binds the listener and serves until SIGINT/SIGTERM.

use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use chat_relay::{bind_listener, ChatServer, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Optional .env file with CHAT_* settings
    dotenvy::dotenv().ok();

    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    let config = Config::from_env()?;
    let listener = bind_listener(&config)?;
    info!("Chat relay listening on {}", config.listen_addr());

    let server = ChatServer::new(config);

    let shutdown = server.shutdown().clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    if !server.run(listener).await {
        warn!("Some sessions did not finish in time");
    }

    info!("Server finished.");
    Ok(())
}

/// Resolve on SIGINT, or SIGTERM on unix
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
