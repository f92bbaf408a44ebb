use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::Json;
use axum::Router;

use super::parse_id;
use crate::error::AppError;
use crate::models::rider::Rider;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/riders/:id", get(get_rider))
}

async fn get_rider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Rider>, AppError> {
    let id = parse_id("rider", &id)?;
    let rider = state
        .store
        .rider(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("rider {} not found", id)))?;

    Ok(Json(rider))
}
