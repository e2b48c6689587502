use axum::http::{HeaderValue, Method};
use axum::Router;
use libpostdeck::config::ServerConfig;
use tower_http::cors::{Any, CorsLayer};

use crate::AppState;

mod error;
mod extract;
mod handlers;
mod routes;

pub use error::AppError;

/// Dashboard origins used during local development
const DEV_ORIGINS: [&str; 2] = ["http://localhost:5173", "http://localhost:3000"];

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.service.config().server);

    Router::new()
        .merge(routes::health())
        .merge(routes::platforms())
        .merge(routes::auth())
        .merge(routes::posts())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let mut origins: Vec<HeaderValue> = Vec::new();
    for origin in std::iter::once(server.frontend_url.trim_end_matches('/')).chain(DEV_ORIGINS) {
        match HeaderValue::from_str(origin) {
            Ok(value) if !origins.contains(&value) => origins.push(value),
            Ok(_) => {}
            Err(err) => tracing::warn!(origin = %origin, error = %err, "ignoring invalid CORS origin"),
        }
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}
