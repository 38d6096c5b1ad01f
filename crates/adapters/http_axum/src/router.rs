//! Axum router assembly.

use axum::extract::State;
use axum::http::{Method, header};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::session;
use crate::state::AppState;

/// Build the top-level axum [`Router`].
///
/// WebSocket subscribers connect on `/ws`. The root path upgrades too, for
/// clients that were written against the bare `ws://host:port` URL.
/// Includes a [`TraceLayer`] that logs each HTTP request/response at the
/// `DEBUG` level using the `tracing` ecosystem. Routes under `/api` answer
/// cross-origin requests so browser dashboards can poll them.
pub fn build(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        .layer(api_cors());

    Router::new()
        .route("/", get(session::upgrade))
        .route("/ws", get(session::upgrade))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    message: &'static str,
    subscribers: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "OK",
        message: "Server is running",
        subscribers: state.hub.subscriber_count(),
    })
}
