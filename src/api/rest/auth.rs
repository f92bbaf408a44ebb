use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::connections::Role;
use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::rider::Rider;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/rider/register", post(register_rider))
        .route("/auth/driver/register", post(register_driver))
        .route("/auth/login", post(login))
}

#[derive(Deserialize)]
pub struct RegisterRiderRequest {
    pub name: String,
    pub phone: String,
}

#[derive(Deserialize)]
pub struct RegisterDriverRequest {
    pub name: String,
    pub phone: String,
    pub vehicle_no: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub user_type: &'static str,
    /// Opaque session handle; not a verified credential.
    pub token: String,
}

impl AuthResponse {
    fn new(role: Role, user_id: Uuid) -> Self {
        Self {
            user_id,
            user_type: role.as_str(),
            token: format!("{}_{}", role.as_str(), user_id),
        }
    }
}

fn required(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

async fn register_rider(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRiderRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    required("name", &payload.name)?;
    required("phone", &payload.phone)?;

    let rider = Rider::new(payload.name, payload.phone);
    state.store.insert_rider(rider.clone()).await?;

    info!(rider_id = %rider.id, "rider registered");
    Ok(Json(AuthResponse::new(Role::Rider, rider.id)))
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    required("name", &payload.name)?;
    required("phone", &payload.phone)?;
    required("vehicle_no", &payload.vehicle_no)?;

    let driver = Driver::new(payload.name, payload.phone, payload.vehicle_no);
    state.store.insert_driver(driver.clone()).await?;

    info!(driver_id = %driver.id, "driver registered");
    Ok(Json(AuthResponse::new(Role::Driver, driver.id)))
}

/// Accepts the phone either in a JSON body or as `?phone=`. Riders are
/// looked up before drivers.
async fn login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginRequest>,
    body: Option<Json<LoginRequest>>,
) -> Result<Json<AuthResponse>, AppError> {
    let phone = body
        .and_then(|Json(payload)| payload.phone)
        .or(query.phone)
        .filter(|phone| !phone.trim().is_empty())
        .ok_or_else(|| AppError::Validation("phone is required".to_string()))?;

    if let Some(rider) = state.store.rider_by_phone(&phone).await? {
        return Ok(Json(AuthResponse::new(Role::Rider, rider.id)));
    }

    if let Some(driver) = state.store.driver_by_phone(&phone).await? {
        return Ok(Json(AuthResponse::new(Role::Driver, driver.id)));
    }

    Err(AppError::NotFound("user not found".to_string()))
}
