use std::any::Any;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::state::AppState;

pub mod auth;
pub mod form;
pub mod posts;
pub mod users;

/// Slack on top of the file limit for the other form fields.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Every JSON endpoint, relative to `/api`.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(posts::router())
        .merge(users::router())
}

/// The full application: API, uploaded media, and the shared middleware stack.
pub fn app(state: AppState) -> Router {
    let config = state.config.clone();
    // A profile edit can carry two images.
    let body_limit = config.storage.max_upload_bytes * 2 + FORM_OVERHEAD_BYTES;

    let router = Router::new()
        .nest("/api", api_router())
        .nest_service("/uploads", ServeDir::new(config.uploads_path()))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit));

    with_request_timeout(
        router,
        Duration::from_secs(config.server.request_timeout_secs),
    )
    .layer(CatchPanicLayer::custom(panic_response))
    .layer(cors_layer(&config.server.client_url))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

/// Bounds each request. A request that runs out of time gets the JSON error body.
fn with_request_timeout<S>(router: Router<S>, timeout: Duration) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(TimeoutLayer::new(timeout))
        .layer(middleware::map_response(timeout_body))
}

// No handler answers 408 itself, so every 408 here came from the timeout layer.
async fn timeout_body(response: Response) -> Response {
    if response.status() == StatusCode::REQUEST_TIMEOUT {
        return AppError::Timeout.into_response();
    }
    response
}

fn cors_layer(client_url: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
    match client_url.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!("Ignoring invalid client_url for CORS: {}", client_url);
            cors
        }
    }
}

async fn not_found() -> AppError {
    AppError::NotFound("Not found".into())
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("Handler panicked: {}", detail);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "Internal server error" })),
    )
        .into_response()
}
