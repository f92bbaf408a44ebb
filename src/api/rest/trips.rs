use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::parse_id;
use crate::engine::dispatch;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::trip::Trip;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/trips/request", post(request_trip))
        .route("/trips/:id", get(get_trip))
        .route("/trips/:id/start", put(start_trip))
        .route("/trips/:id/complete", put(complete_trip))
        .route("/trips/:id/cancel", put(cancel_trip))
        .route("/riders/:id/trips", get(rider_trips))
        .route("/drivers/:id/trips", get(driver_trips))
}

#[derive(Deserialize)]
pub struct TripRequest {
    pub rider_id: String,
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub dropoff_latitude: f64,
    pub dropoff_longitude: f64,
}

async fn request_trip(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TripRequest>,
) -> Result<Json<Trip>, AppError> {
    let rider_id = parse_id("rider", &payload.rider_id)?;
    let trip = dispatch::request_trip(
        &state,
        rider_id,
        GeoPoint::from_lat_lng(payload.pickup_latitude, payload.pickup_longitude),
        GeoPoint::from_lat_lng(payload.dropoff_latitude, payload.dropoff_longitude),
    )
    .await?;

    Ok(Json(trip))
}

async fn get_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Trip>, AppError> {
    let id = parse_id("trip", &id)?;
    let trip = state
        .store
        .trip(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("trip {} not found", id)))?;

    Ok(Json(trip))
}

// The lifecycle routes report a trip in the wrong state as 404, same as a
// missing one.

async fn start_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id("trip", &id)?;
    let trip = dispatch::start_trip(&state, id)
        .await
        .map_err(AppError::conflict_as_not_found)?;

    Ok(Json(json!({ "message": "Trip started", "trip": trip })))
}

async fn complete_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id("trip", &id)?;
    let trip = dispatch::complete_trip(&state, id)
        .await
        .map_err(AppError::conflict_as_not_found)?;

    Ok(Json(json!({
        "message": "Trip completed",
        "fare": trip.fare,
        "distance": trip.distance_km,
        "trip": trip,
    })))
}

async fn cancel_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id("trip", &id)?;
    let trip = dispatch::cancel_trip(&state, id)
        .await
        .map_err(AppError::conflict_as_not_found)?;

    Ok(Json(json!({ "message": "Trip cancelled", "trip": trip })))
}

async fn rider_trips(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Trip>>, AppError> {
    // Same as any unknown id: nothing to list.
    let Ok(id) = Uuid::parse_str(&id) else {
        return Ok(Json(Vec::new()));
    };
    let trips = state
        .store
        .trips_for_rider(id, state.settings.trip_page_limit)
        .await?;

    Ok(Json(trips))
}

async fn driver_trips(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Trip>>, AppError> {
    let Ok(id) = Uuid::parse_str(&id) else {
        return Ok(Json(Vec::new()));
    };
    let trips = state
        .store
        .trips_for_driver(id, state.settings.trip_page_limit)
        .await?;

    Ok(Json(trips))
}
