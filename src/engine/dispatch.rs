//! Entry points that sequence the trip lifecycle with its notifications.

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::connections::{Delivery, Role, ServerEvent};
use crate::engine::lifecycle;
use crate::engine::pricing::{self, FareEstimate};
use crate::engine::queue::enqueue_match;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::driver::DriverStatus;
use crate::models::trip::Trip;
use crate::state::AppState;

/// Best-effort push to one party, counted by delivery outcome.
pub fn notify_party(state: &AppState, role: Role, id: Uuid, event: ServerEvent) -> Delivery {
    let delivery = state.connections.notify(role, id, event);

    state
        .metrics
        .notifications_total
        .with_label_values(&[role.as_str(), delivery.as_str()])
        .inc();

    if delivery != Delivery::Sent {
        debug!(%role, %id, delivery = delivery.as_str(), "notification dropped");
    }
    if delivery == Delivery::Closed {
        record_connections(state, role);
    }

    delivery
}

/// Sets the `live_connections` gauge for `role` from the registry.
pub fn record_connections(state: &AppState, role: Role) {
    state
        .metrics
        .live_connections
        .with_label_values(&[role.as_str()])
        .set(state.connections.connected(role) as i64);
}

fn notify_both(state: &AppState, trip: &Trip, event: ServerEvent) {
    notify_party(state, Role::Rider, trip.rider_id, event.clone());
    if let Some(driver_id) = trip.driver_id {
        notify_party(state, Role::Driver, driver_id, event);
    }
}

/// Persists a new trip and queues it for matching. The returned trip is the
/// one that was created; matching finishes on its own schedule.
pub async fn request_trip(
    state: &AppState,
    rider_id: Uuid,
    pickup: GeoPoint,
    dropoff: GeoPoint,
) -> Result<Trip, AppError> {
    state
        .store
        .rider(rider_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("rider {rider_id} not found")))?;

    let trip = Trip::requested(rider_id, pickup, dropoff);
    state.store.insert_trip(trip.clone()).await?;
    state.metrics.trips_requested_total.inc();

    info!(trip_id = %trip.id, rider_id = %rider_id, "trip requested");

    // The trip stays `requested` either way; the response never waits on
    // matching.
    if let Err(err) = enqueue_match(state, trip.id) {
        warn!(trip_id = %trip.id, error = %err, "trip stored but not queued for matching");
    }

    Ok(trip)
}

pub async fn start_trip(state: &AppState, trip_id: Uuid) -> Result<Trip, AppError> {
    let trip = lifecycle::start(state.store.as_ref(), trip_id).await?;

    info!(trip_id = %trip.id, "trip started");
    notify_both(state, &trip, ServerEvent::TripStarted { trip_id: trip.id });

    Ok(trip)
}

/// Prices the trip by pickup/dropoff distance, completes it and frees the
/// driver.
pub async fn complete_trip(state: &AppState, trip_id: Uuid) -> Result<Trip, AppError> {
    let current = state
        .store
        .trip(trip_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;

    let distance_km = pricing::distance_km(&current.pickup, &current.dropoff);
    let fare = pricing::trip_fare(distance_km);

    let trip = lifecycle::complete(state.store.as_ref(), trip_id, distance_km, fare).await?;

    if let Some(driver_id) = trip.driver_id {
        release_driver(state, driver_id).await;
    }

    info!(trip_id = %trip.id, distance_km, fare, "trip completed");
    notify_both(
        state,
        &trip,
        ServerEvent::TripCompleted {
            trip_id: trip.id,
            fare,
            distance: distance_km,
        },
    );

    Ok(trip)
}

pub async fn cancel_trip(state: &AppState, trip_id: Uuid) -> Result<Trip, AppError> {
    let trip = lifecycle::cancel(state.store.as_ref(), trip_id).await?;

    if let Some(driver_id) = trip.driver_id {
        release_driver(state, driver_id).await;
    }

    info!(trip_id = %trip.id, "trip cancelled");
    notify_both(state, &trip, ServerEvent::TripCancelled { trip_id: trip.id });

    Ok(trip)
}

async fn release_driver(state: &AppState, driver_id: Uuid) {
    match state
        .store
        .compare_and_set_driver_status(driver_id, DriverStatus::OnTrip, DriverStatus::Available)
        .await
    {
        Ok(_) => {}
        Err(AppError::Conflict(reason)) => {
            warn!(driver_id = %driver_id, %reason, "driver was not on_trip at release");
        }
        Err(err) => {
            error!(driver_id = %driver_id, error = %err, "failed to release driver");
        }
    }
}

/// Fare quote using current demand (trips requested in the surge window)
/// and supply (available drivers).
pub async fn estimate_fare(
    state: &AppState,
    pickup: GeoPoint,
    dropoff: GeoPoint,
) -> Result<FareEstimate, AppError> {
    let window = chrono::Duration::from_std(state.settings.surge_window)
        .map_err(|err| AppError::Internal(format!("invalid surge window: {err}")))?;

    let since = Utc::now()
        .checked_sub_signed(window)
        .ok_or_else(|| AppError::Internal("surge window reaches past the calendar".to_string()))?;

    let demand = state.store.count_trips_requested_since(since).await?;
    let supply = state.store.count_available_drivers().await?;

    Ok(pricing::estimate(&pickup, &dropoff, demand, supply))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::config::DispatchSettings;
    use crate::engine::matching::{match_trip, MatchOutcome};
    use crate::models::driver::Driver;
    use crate::models::rider::Rider;
    use crate::models::trip::TripStatus;

    fn delhi() -> GeoPoint {
        GeoPoint::from_lat_lng(28.6139, 77.2090)
    }

    fn nearby() -> GeoPoint {
        GeoPoint::from_lat_lng(28.6219, 77.2170)
    }

    async fn setup() -> (AppState, mpsc::Receiver<Uuid>, Rider, Driver) {
        let (state, rx) = AppState::new(DispatchSettings::default());

        let rider = Rider::new("Asha".to_string(), "9000000001".to_string());
        state.store.insert_rider(rider.clone()).await.unwrap();

        let driver = Driver::new(
            "Dev".to_string(),
            "9000000002".to_string(),
            "DL1C1234".to_string(),
        );
        state.store.insert_driver(driver.clone()).await.unwrap();
        state
            .store
            .update_driver_location(driver.id, delhi())
            .await
            .unwrap();
        state
            .store
            .set_driver_status(driver.id, DriverStatus::Available)
            .await
            .unwrap();

        (state, rx, rider, driver)
    }

    #[tokio::test]
    async fn request_for_unknown_rider_is_not_found() {
        let (state, _rx, _rider, _driver) = setup().await;
        let err = request_trip(&state, Uuid::new_v4(), delhi(), nearby())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(state.store.counts().await.unwrap().trips, 0);
    }

    #[tokio::test]
    async fn request_persists_and_queues_the_trip() {
        let (state, mut rx, rider, _driver) = setup().await;

        let trip = request_trip(&state, rider.id, delhi(), nearby())
            .await
            .unwrap();
        assert_eq!(trip.status, TripStatus::Requested);
        assert_eq!(rx.recv().await, Some(trip.id));
        assert!(state.store.trip(trip.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn request_succeeds_even_when_matching_is_down() {
        let (state, rx, rider, _driver) = setup().await;
        drop(rx);

        let trip = request_trip(&state, rider.id, delhi(), nearby())
            .await
            .unwrap();
        assert_eq!(trip.status, TripStatus::Requested);
    }

    #[tokio::test]
    async fn full_queue_does_not_hold_up_trip_creation() {
        let settings = DispatchSettings {
            match_queue_size: 1,
            ..DispatchSettings::default()
        };
        let (state, mut rx) = AppState::new(settings);
        let rider = Rider::new("Asha".to_string(), "9000000001".to_string());
        state.store.insert_rider(rider.clone()).await.unwrap();

        let first = request_trip(&state, rider.id, delhi(), nearby())
            .await
            .unwrap();
        let second = tokio::time::timeout(
            Duration::from_secs(2),
            request_trip(&state, rider.id, delhi(), nearby()),
        )
        .await
        .expect("request_trip waited on a full queue")
        .unwrap();

        assert_eq!(second.status, TripStatus::Requested);
        assert!(state.store.trip(second.id).await.unwrap().is_some());
        assert_eq!(state.metrics.match_queue_depth.get(), 1);
        assert_eq!(
            state
                .metrics
                .match_attempts_total
                .with_label_values(&["queue_full"])
                .get(),
            1
        );
        assert_eq!(rx.recv().await, Some(first.id));
    }

    #[tokio::test]
    async fn closed_channel_refreshes_the_connection_gauge() {
        let (state, _rx, rider, _driver) = setup().await;
        let (tx, rx) = mpsc::unbounded_channel();
        state.connections.register(Role::Rider, rider.id, tx);
        record_connections(&state, Role::Rider);
        drop(rx);

        let gauge = state
            .metrics
            .live_connections
            .with_label_values(&[Role::Rider.as_str()]);
        assert_eq!(gauge.get(), 1);

        let delivery = notify_party(
            &state,
            Role::Rider,
            rider.id,
            ServerEvent::TripStarted {
                trip_id: Uuid::new_v4(),
            },
        );
        assert_eq!(delivery, Delivery::Closed);
        assert_eq!(gauge.get(), 0);
    }

    #[tokio::test]
    async fn ride_from_request_to_completion() {
        let (state, mut rx, rider, driver) = setup().await;
        let (rider_tx, mut rider_rx) = mpsc::unbounded_channel();
        state.connections.register(Role::Rider, rider.id, rider_tx);

        let trip = request_trip(&state, rider.id, delhi(), nearby())
            .await
            .unwrap();
        let queued = rx.recv().await.unwrap();
        assert!(matches!(
            match_trip(&state, queued).await.unwrap(),
            MatchOutcome::Assigned { .. }
        ));
        assert!(matches!(
            rider_rx.recv().await,
            Some(ServerEvent::TripAssigned { .. })
        ));

        start_trip(&state, trip.id).await.unwrap();
        assert!(matches!(
            rider_rx.recv().await,
            Some(ServerEvent::TripStarted { .. })
        ));

        let completed = complete_trip(&state, trip.id).await.unwrap();
        assert_eq!(completed.status, TripStatus::Completed);
        let fare = completed.fare.unwrap();
        assert!((65.0..=70.0).contains(&fare), "fare {fare}");

        match rider_rx.recv().await {
            Some(ServerEvent::TripCompleted {
                fare: pushed,
                distance,
                ..
            }) => {
                assert_eq!(pushed, fare);
                assert_eq!(Some(distance), completed.distance_km);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let driver = state.store.driver(driver.id).await.unwrap().unwrap();
        assert_eq!(driver.status, DriverStatus::Available);
    }

    #[tokio::test]
    async fn start_requires_an_assigned_trip() {
        let (state, _rx, rider, _driver) = setup().await;
        let trip = request_trip(&state, rider.id, delhi(), nearby())
            .await
            .unwrap();

        assert!(matches!(
            start_trip(&state, trip.id).await.unwrap_err(),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            complete_trip(&state, trip.id).await.unwrap_err(),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            complete_trip(&state, Uuid::new_v4()).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn cancelling_an_assigned_trip_frees_the_driver() {
        let (state, mut rx, rider, driver) = setup().await;
        let trip = request_trip(&state, rider.id, delhi(), nearby())
            .await
            .unwrap();
        match_trip(&state, rx.recv().await.unwrap()).await.unwrap();

        let cancelled = cancel_trip(&state, trip.id).await.unwrap();
        assert_eq!(cancelled.status, TripStatus::Cancelled);

        let driver = state.store.driver(driver.id).await.unwrap().unwrap();
        assert_eq!(driver.status, DriverStatus::Available);
    }

    #[tokio::test]
    async fn estimate_surges_when_demand_outpaces_supply() {
        let (state, _rx, rider, driver) = setup().await;

        let calm = estimate_fare(&state, delhi(), nearby()).await.unwrap();
        assert_eq!(calm.surge_factor, 1.0);

        for _ in 0..3 {
            request_trip(&state, rider.id, delhi(), nearby())
                .await
                .unwrap();
        }
        let busy = estimate_fare(&state, delhi(), nearby()).await.unwrap();
        assert!((busy.surge_factor - 2.2).abs() < 1e-9);

        state
            .store
            .set_driver_status(driver.id, DriverStatus::Offline)
            .await
            .unwrap();
        let empty = estimate_fare(&state, delhi(), nearby()).await.unwrap();
        assert_eq!(empty.surge_factor, 2.5);
    }

    #[tokio::test]
    async fn oversized_surge_window_is_an_error() {
        let settings = DispatchSettings {
            surge_window: Duration::from_secs(10_000_000_000_000),
            ..DispatchSettings::default()
        };
        let (state, _rx) = AppState::new(settings);

        let err = estimate_fare(&state, delhi(), nearby()).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
