//! Axum server setup
//!
//! - Storefront routes behind the storefront token
//! - `/admin` behind the admin token
//! - Health and webhooks open (webhooks check their own credentials)
//! - Graceful shutdown on SIGTERM/Ctrl+C

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::middleware::from_extractor_with_state;
use axum::Router;
use mealdash_core::config::ServerSection;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::extractors::{AdminAuth, StorefrontAuth};
use super::routes;
use crate::state::AppState;

const LOCAL_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://127.0.0.1:3000"];

fn cors_layer(config: &ServerSection) -> CorsLayer {
    if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode enabled - all origins allowed");
        return CorsLayer::permissive();
    }

    let configured: Vec<&str> = if config.cors_origins.is_empty() {
        LOCAL_ORIGINS.to_vec()
    } else {
        config.cors_origins.iter().map(String::as_str).collect()
    };
    let origins: Vec<HeaderValue> = configured
        .into_iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Assemble every route with its auth layer.
pub fn build_router(state: AppState) -> Router {
    let state = Arc::new(state);
    let cors = cors_layer(&state.config.server);

    let storefront = Router::new()
        .merge(routes::catalog::router())
        .merge(routes::customers::router())
        .merge(routes::coupons::router())
        .merge(routes::checkout::router())
        .merge(routes::orders::router())
        .merge(routes::wallet::router())
        .merge(routes::subscriptions::router())
        .route_layer(from_extractor_with_state::<StorefrontAuth, _>(state.clone()));

    let admin = Router::new()
        .merge(routes::admin_orders::router())
        .merge(routes::admin_coupons::router())
        .merge(routes::admin_settings::router())
        .merge(routes::admin_menu::router())
        .merge(routes::wallet::admin_router())
        .merge(routes::kitchen::router())
        .route_layer(from_extractor_with_state::<AdminAuth, _>(state.clone()));

    Router::new()
        .merge(routes::health::router())
        .merge(routes::webhooks::router())
        .merge(storefront)
        .nest("/admin", admin)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server until Ctrl+C or SIGTERM.
pub async fn run_server(state: AppState) -> Result<(), ServerError> {
    let addr: SocketAddr = state.config.server.bind;
    let app = build_router(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
