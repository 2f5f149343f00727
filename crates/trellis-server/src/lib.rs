//! HTTP front end for the trellis flag engine.
//!
//! [`create_router`] builds the axum router around an [`AppState`];
//! [`run_server`] binds a listener and serves until Ctrl-C.

#![forbid(unsafe_code)]

pub mod error;
pub mod models;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;

use tokio::net::TcpListener;

/// Serve the API on `bind` until the process receives Ctrl-C.
///
/// # Errors
///
/// Returns an I/O error if the address cannot be bound or the server fails.
pub async fn run_server(state: AppState, bind: &str) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    let local = listener.local_addr()?;
    tracing::info!(address = %local, "Listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C; shutting down");
    }
}
