pub mod auth;
pub mod drivers;
pub mod pricing;
pub mod riders;
pub mod trips;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .merge(auth::router())
        .merge(riders::router())
        .merge(drivers::router())
        .merge(trips::router())
        .merge(pricing::router());

    Router::new()
        .nest("/api", api)
        .merge(ws::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Ids are opaque to clients, so one that is not a UUID simply names nothing.
fn parse_id(kind: &str, raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(format!("{kind} {raw} not found")))
}

/// An empty origin list allows any origin.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer, AppError> {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        let parsed = origins
            .iter()
            .map(|origin| {
                origin
                    .parse::<HeaderValue>()
                    .map_err(|err| AppError::Internal(format!("invalid cors origin {origin}: {err}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(parsed)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    riders: usize,
    drivers: usize,
    trips: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    let counts = state.store.counts().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        riders: counts.riders,
        drivers: counts.drivers,
        trips: counts.trips,
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
