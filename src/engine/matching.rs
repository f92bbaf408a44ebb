use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::connections::{Role, ServerEvent};
use crate::engine::dispatch::notify_party;
use crate::engine::lifecycle;
use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus};
use crate::models::trip::{Trip, TripStatus};
use crate::state::AppState;

#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Assigned { trip: Trip, driver: Driver },
    /// Nobody available within range; the trip stays requested.
    NoCandidates,
    /// The trip had already left `requested`.
    NotPending,
    /// Another caller changed the trip or took the driver first.
    LostRace,
}

impl MatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            MatchOutcome::Assigned { .. } => "assigned",
            MatchOutcome::NoCandidates => "no_candidates",
            MatchOutcome::NotPending => "not_pending",
            MatchOutcome::LostRace => "lost_race",
        }
    }
}

pub async fn run_matching_engine(state: Arc<AppState>, mut trip_rx: mpsc::Receiver<Uuid>) {
    info!("matching engine started");

    while let Some(trip_id) = trip_rx.recv().await {
        state.metrics.match_queue_depth.dec();

        let start = Instant::now();
        let label = match match_trip(&state, trip_id).await {
            Ok(outcome) => outcome.label(),
            Err(err) => {
                error!(trip_id = %trip_id, error = %err, "failed to match trip");
                "error"
            }
        };

        state
            .metrics
            .match_latency_seconds
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());
        state
            .metrics
            .match_attempts_total
            .with_label_values(&[label])
            .inc();
    }

    warn!("matching engine stopped: queue channel closed");
}

/// Assigns the nearest available driver to a requested trip.
///
/// The driver is claimed (`available` -> `on_trip`) before the trip is
/// assigned; if the assignment then loses its race the driver is released
/// again. A crash between the two writes can still leave the driver
/// `on_trip` without a trip.
pub async fn match_trip(state: &AppState, trip_id: Uuid) -> Result<MatchOutcome, AppError> {
    let trip = state
        .store
        .trip(trip_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;

    if trip.status != TripStatus::Requested {
        if trip.status.is_terminal() {
            info!(trip_id = %trip_id, status = %trip.status, "trip ended before matching");
        } else {
            debug!(trip_id = %trip_id, status = %trip.status, "trip no longer pending; skipping match");
        }
        return Ok(MatchOutcome::NotPending);
    }

    let candidates = state
        .geo
        .nearby_available_drivers(
            &trip.pickup,
            state.settings.match_radius_km,
            state.settings.match_candidate_limit,
        )
        .await?;

    let Some(nearest) = candidates.into_iter().next() else {
        info!(trip_id = %trip_id, "no available driver nearby; trip stays requested");
        return Ok(MatchOutcome::NoCandidates);
    };

    let driver = match state
        .store
        .compare_and_set_driver_status(nearest.id, DriverStatus::Available, DriverStatus::OnTrip)
        .await
    {
        Ok(driver) => driver,
        Err(AppError::Conflict(reason)) => {
            warn!(trip_id = %trip_id, driver_id = %nearest.id, %reason, "driver taken before claim");
            return Ok(MatchOutcome::LostRace);
        }
        Err(err) => return Err(err),
    };

    let trip = match lifecycle::assign(state.store.as_ref(), trip_id, driver.id).await {
        Ok(trip) => trip,
        Err(err) => {
            release_driver(state, driver.id).await;
            return match err {
                AppError::Conflict(reason) => {
                    warn!(trip_id = %trip_id, %reason, "trip changed before assignment");
                    Ok(MatchOutcome::LostRace)
                }
                other => Err(other),
            };
        }
    };

    info!(
        trip_id = %trip.id,
        driver_id = %driver.id,
        rider_id = %trip.rider_id,
        "trip assigned"
    );

    notify_party(
        state,
        Role::Rider,
        trip.rider_id,
        ServerEvent::TripAssigned {
            trip_id: trip.id,
            driver: Some(driver.clone()),
            trip: None,
        },
    );
    notify_party(
        state,
        Role::Driver,
        driver.id,
        ServerEvent::TripAssigned {
            trip_id: trip.id,
            driver: None,
            trip: Some(trip.clone()),
        },
    );

    Ok(MatchOutcome::Assigned { trip, driver })
}

async fn release_driver(state: &AppState, driver_id: Uuid) {
    if let Err(err) = state
        .store
        .compare_and_set_driver_status(driver_id, DriverStatus::OnTrip, DriverStatus::Available)
        .await
    {
        error!(driver_id = %driver_id, error = %err, "failed to release claimed driver");
    }
}
