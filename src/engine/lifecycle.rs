//! Trip state machine.
//!
//! Every transition is one conditional update on the stored trip, keyed on
//! the status it must leave. Two callers racing on the same transition see
//! exactly one success; the loser gets `Conflict`.

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::trip::{Trip, TripStatus};
use crate::store::{DispatchStore, TripUpdate};

async fn transition(
    store: &dyn DispatchStore,
    trip_id: Uuid,
    from: TripStatus,
    to: TripStatus,
    update: TripUpdate,
) -> Result<Trip, AppError> {
    debug_assert!(from.can_transition_to(to), "illegal transition {from} -> {to}");

    store
        .update_trip_if(
            trip_id,
            from,
            Box::new(move |trip: &mut Trip| {
                update(&mut *trip);
                trip.status = to;
            }),
        )
        .await
}

pub async fn assign(
    store: &dyn DispatchStore,
    trip_id: Uuid,
    driver_id: Uuid,
) -> Result<Trip, AppError> {
    transition(
        store,
        trip_id,
        TripStatus::Requested,
        TripStatus::Assigned,
        Box::new(move |trip: &mut Trip| {
            trip.driver_id = Some(driver_id);
            trip.assigned_at = Some(Utc::now());
        }),
    )
    .await
}

pub async fn start(store: &dyn DispatchStore, trip_id: Uuid) -> Result<Trip, AppError> {
    transition(
        store,
        trip_id,
        TripStatus::Assigned,
        TripStatus::Ongoing,
        Box::new(|trip: &mut Trip| trip.started_at = Some(Utc::now())),
    )
    .await
}

pub async fn complete(
    store: &dyn DispatchStore,
    trip_id: Uuid,
    distance_km: f64,
    fare: f64,
) -> Result<Trip, AppError> {
    transition(
        store,
        trip_id,
        TripStatus::Ongoing,
        TripStatus::Completed,
        Box::new(move |trip: &mut Trip| {
            trip.completed_at = Some(Utc::now());
            trip.distance_km = Some(distance_km);
            trip.fare = Some(fare);
        }),
    )
    .await
}

/// Cancels a trip that has not started yet. The status read here only picks
/// which conditional update to issue; the update itself still re-checks it.
pub async fn cancel(store: &dyn DispatchStore, trip_id: Uuid) -> Result<Trip, AppError> {
    let current = store
        .trip(trip_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;

    if !current.status.can_transition_to(TripStatus::Cancelled) {
        return Err(AppError::Conflict(format!(
            "trip {trip_id} is {}, cannot cancel",
            current.status
        )));
    }

    transition(
        store,
        trip_id,
        current.status,
        TripStatus::Cancelled,
        Box::new(|trip: &mut Trip| trip.cancelled_at = Some(Utc::now())),
    )
    .await
}
