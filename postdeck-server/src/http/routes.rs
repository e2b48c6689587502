use axum::{routing::get, routing::post, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api", get(handlers::root))
        .route("/api/health", get(handlers::health))
}

pub fn platforms() -> Router<AppState> {
    Router::new()
        .route("/api/platforms/status", get(handlers::platform_status))
        .route("/api/platforms/scheduler/jobs", get(handlers::scheduler_jobs))
}

pub fn auth() -> Router<AppState> {
    Router::new()
        .route("/api/auth/:platform/connect", get(handlers::oauth_connect))
        .route("/api/auth/:platform/callback", get(handlers::oauth_callback))
        .route("/api/auth/:platform/disconnect", post(handlers::oauth_disconnect))
}

pub fn posts() -> Router<AppState> {
    Router::new()
        .route("/api/posts/generate", post(handlers::generate_post))
        .route("/api/posts/generate-image", post(handlers::generate_image))
        .route(
            "/api/posts",
            post(handlers::create_post).get(handlers::list_posts),
        )
        .route(
            "/api/posts/:id",
            get(handlers::get_post)
                .patch(handlers::update_post)
                .delete(handlers::delete_post),
        )
        .route("/api/posts/:id/approve", post(handlers::approve_post))
        .route("/api/posts/:id/publish", post(handlers::publish_post))
}
