use std::sync::Arc;

use request_debugbar::config::DebugBarConfig;
use request_debugbar::logging;
use request_debugbar::server::{self, AppState};

#[tokio::main]
async fn main() {
    let config = DebugBarConfig::load().unwrap_or_else(|e| {
        eprintln!("invalid configuration: {e}");
        std::process::exit(1);
    });
    logging::init_logging(&config.log_level);

    let bind = config.server.bind.clone();
    let state = match AppState::from_config(config).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!(error = %e, "cannot initialise backends");
            std::process::exit(1);
        }
    };

    tracing::info!(
        storage = ?state.config.storage.backend,
        sessions = ?state.config.session.backend,
        "backends ready"
    );

    let app = server::create_router(state);

    let listener = match tokio::net::TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %bind, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(addr = %bind, "server listening");
    tracing::info!("open handler → http://{bind}/_debugbar/open");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server exited with error");
    }
}
