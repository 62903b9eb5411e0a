//! HTTP surface.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod state;

pub use error::ApiError;
pub use state::{AppState, HttpLimits};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, post},
};

use handlers::{documents, users};

/// Assemble the full API router.
///
/// `/api/docs` routes require a bearer token; the credential routes do not.
pub fn build_router(state: AppState, limits: HttpLimits) -> Router {
    let docs = Router::new()
        .route(
            "/api/docs",
            get(documents::list_documents).post(documents::upload_document),
        )
        .route(
            "/api/docs/{id}",
            get(documents::get_document).delete(documents::delete_document),
        )
        .layer(DefaultBodyLimit::max(limits.max_request_bytes))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_caller,
        ));

    Router::new()
        .route("/api/register", post(users::register))
        .route("/api/auth", post(users::authenticate))
        .route("/api/auth/{token}", delete(users::logout))
        .merge(docs)
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(
            limits,
            middleware::enforce_timeout,
        ))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}
