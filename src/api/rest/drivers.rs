use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use tracing::info;

use super::parse_id;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::driver::{Driver, DriverStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers/:id", get(get_driver))
        .route("/drivers/:id/location", put(update_driver_location))
        .route("/drivers/:id/status", put(update_driver_status))
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Driver>, AppError> {
    let id = parse_id("driver", &id)?;
    let driver = state
        .store
        .driver(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("driver {} not found", id)))?;

    Ok(Json(driver))
}

async fn update_driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Driver>, AppError> {
    let id = parse_id("driver", &id)?;
    let location = GeoPoint::from_lat_lng(payload.latitude, payload.longitude);
    let driver = state.store.update_driver_location(id, location).await?;

    Ok(Json(driver))
}

/// Takes the status from a JSON body or `?status=`.
async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<UpdateStatusRequest>,
    body: Option<Json<UpdateStatusRequest>>,
) -> Result<Json<Driver>, AppError> {
    let id = parse_id("driver", &id)?;
    let raw = body
        .and_then(|Json(payload)| payload.status)
        .or(query.status)
        .ok_or_else(|| AppError::Validation("status is required".to_string()))?;

    let status = raw.parse::<DriverStatus>().map_err(AppError::Validation)?;
    let driver = state.store.set_driver_status(id, status).await?;

    info!(driver_id = %id, status = %status, "driver status updated");
    Ok(Json(driver))
}
