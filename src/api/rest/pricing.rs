use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::engine::dispatch;
use crate::engine::pricing::FareEstimate;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/pricing/estimate", get(estimate_fare))
}

#[derive(Deserialize)]
pub struct EstimateQuery {
    pub pickup_lat: f64,
    pub pickup_lon: f64,
    pub dropoff_lat: f64,
    pub dropoff_lon: f64,
}

async fn estimate_fare(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EstimateQuery>,
) -> Result<Json<FareEstimate>, AppError> {
    let estimate = dispatch::estimate_fare(
        &state,
        GeoPoint::from_lat_lng(query.pickup_lat, query.pickup_lon),
        GeoPoint::from_lat_lng(query.dropoff_lat, query.dropoff_lon),
    )
    .await?;

    Ok(Json(estimate))
}
