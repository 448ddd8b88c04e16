use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod handlers;
pub mod state;

pub use state::AppState;

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::permissive();

    Router::new()
        .route("/generate", get(handlers::generate).post(handlers::generate))
        .route("/health", get(handlers::health))
        .route("/api/query", post(handlers::submit_query))
        .route("/api/query/:id", get(handlers::query_status))
        .route("/api/usage", get(handlers::usage))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(Arc::new(state))
}

pub mod prelude {
    pub use crate::{create_app, AppState};
    pub use nd_core::{Error, Result};
}
