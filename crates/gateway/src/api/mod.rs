pub mod chat;
pub mod conversations;
pub mod error;
pub mod health;
pub mod metrics;

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::state::AppState;

/// Build the full API router.
pub fn router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.server.cors_allowed_origins);

    Router::new()
        .route("/v1/chat", post(chat::chat))
        .route("/v1/conversations", get(conversations::list).post(conversations::create))
        .route("/v1/conversations/:id", get(conversations::get_one))
        .route("/v1/conversations/:id/cancel", post(conversations::cancel))
        .route("/health", get(health::health))
        .route("/metrics", get(metrics::metrics))
        .layer(cors)
        .with_state(state)
}

/// Build a CORS layer from the configured allowed origins. A single "*"
/// entry allows all origins.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    use axum::http::header;

    if allowed_origins.len() == 1 && allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(hv) => Some(hv),
            Err(_) => {
                tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
