use super::handlers;
use super::types::AppState;
use crate::error::HandlerErr;
use axum::extract::DefaultBodyLimit;
use axum::http::{Method, Uri};
use axum::routing::get;
use axum::Router;

pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::core::health))
        .route(
            "/attendance",
            get(handlers::attendance::get_attendance).post(handlers::attendance::post_attendance),
        )
        .route("/my-attendance", get(handlers::attendance::get_my_attendance))
        .fallback(unknown_route)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

async fn unknown_route(method: Method, uri: Uri) -> HandlerErr {
    HandlerErr::not_found(format!("unknown route: {} {}", method, uri.path()))
}
