use std::any::Any;

use axum::extract::DefaultBodyLimit;
use axum::http::Uri;
use axum::response::{IntoResponse, Response};
use axum::{middleware, routing, Router};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::require_token;
use crate::error::AppError;
use crate::handlers::{account, files};
use crate::state::AppState;

pub fn build(state: AppState) -> Router<()> {
    let upload_limit = state.storage.policy().max_upload_bytes;

    let api = Router::new()
        .route("/list", routing::get(files::list))
        .route("/folder", routing::post(files::create_folder))
        .route(
            "/upload",
            routing::post(files::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/delete", routing::delete(files::delete))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    let service = ServiceBuilder::new()
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/", routing::get(|| async { "API is running" }))
        .route("/signup", routing::post(account::signup))
        .route("/signin", routing::post(account::signin))
        .nest("/api", api)
        .fallback(|uri: Uri| async move { AppError::RouteNotFound(uri.to_string()) })
        .layer(service)
        .with_state(state)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    AppError::Unhandled(detail).into_response()
}
