use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use config_manager::SystemConfig;
use job_orchestrator::WalletTracker;
use persistence_layer::{PersistenceError, WalletStore};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

pub mod handlers;
pub mod types;

use types::ErrorResponse;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: SystemConfig,
    pub tracker: Arc<WalletTracker>,
    pub store: Arc<dyn WalletStore>,
}

/// Main application error type
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Internal server error")]
    Internal(String),
}

impl From<PersistenceError> for ApiError {
    fn from(err: PersistenceError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(detail) => {
                // Details go to the log, not to the client.
                error!("Request failed: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

/// Build the application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/wallets/track", post(handlers::track_wallet))
        .route("/api/wallets/untrack", post(handlers::untrack_wallet))
        .route("/api/wallets", get(handlers::list_wallets))
        .route("/api/wallets/transactions", get(handlers::list_transactions))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
