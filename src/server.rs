use crate::handlers::{config, diag, not_found, search, SharedState};
use crate::middleware::logging_middleware;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_app(state: SharedState) -> Router {
    Router::new()
        .route("/search", post(search))
        .route("/diag", get(diag))
        .route("/config", get(config))
        .fallback(not_found)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

pub struct Server {
    app: Router,
    state: SharedState,
}

impl Server {
    pub fn new(state: SharedState) -> Self {
        Self {
            app: create_app(state.clone()),
            state,
        }
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let address = self.state.settings.bind_address();
        let listener = tokio::net::TcpListener::bind(&address).await?;

        tracing::info!("{} server starting on {}", self.state.settings.app.service_name, address);
        tracing::info!("Search available at POST /search?tag=..");
        tracing::info!("Diagnostics available at /diag");

        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(drain(self.state.clone()))
        .await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

/// Resolves once the service should stop listening: after a signal, the
/// running flag is cleared and the gate closed, then `stop_delay` passes.
async fn drain(state: SharedState) {
    shutdown_signal().await;
    state.begin_shutdown();

    let delay = state.settings.stop_delay();
    tracing::info!(?delay, "Waiting before closing the listener");
    tokio::time::sleep(delay).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
