//! Server library: HTTP wiring (auth, CORS, access logging) around the
//! translation engine in `llm`. Exposed as a library so both the binary and
//! integration tests can build the same app.

#![deny(missing_docs)]

mod auth;
mod cors;
mod logger;
mod logging;

use std::net::SocketAddr;

use anyhow::anyhow;
use axum::{Router, middleware};
use config::Config;
use tokio::net::TcpListener;

pub use logger::init as init_logger;

/// Configuration for serving the proxy.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to.
    pub listen_address: SocketAddr,
    /// The loaded process configuration.
    pub config: Config,
}

/// Builds the full proxy app — the dialect router wrapped with auth, CORS,
/// and access logging — without binding a socket. Shared by [`serve`] and
/// integration tests that drive requests through the router directly.
pub async fn app(config: &Config) -> Router {
    let auth_state = auth::AuthState::new(config);

    llm::router(config)
        .await
        .layer(middleware::from_fn_with_state(auth_state, auth::require_proxy_key))
        .layer(cors::layer())
        .layer(middleware::from_fn(logging::log_requests))
}

/// Starts and runs the proxy server with the provided configuration, until
/// either the HTTP server exits or a shutdown signal is received.
pub async fn serve(ServeConfig { listen_address, config }: ServeConfig) -> anyhow::Result<()> {
    let app = app(&config).await;

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    if config.has_upstream() {
        log::info!("Proxying to configured upstream at http://{listen_address}");
    } else {
        log::info!("No upstream configured, serving in echo mode at http://{listen_address}");
    }

    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result.map_err(|e| anyhow!("Server error: {e}"))?;
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("Received shutdown signal, shutting down gracefully...");
        }
    }

    Ok(())
}
