//! HTTP API routes

pub mod games;
pub mod health;
pub mod leaderboard;
pub mod timestamp;
pub mod users;

use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assemble the full API
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/health", health::router())
        .nest("/api/v1/health", health::router())
        .nest("/api/v1/timestamp", timestamp::router())
        .nest("/api/v1/users", users::router())
        .nest("/api/v1/games", games::router().merge(leaderboard::router()))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}
