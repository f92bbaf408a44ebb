//! Persistence collaborator of the dispatch core.
//!
//! The core only relies on store/fetch by id, single-record conditional
//! updates and a proximity query. Each conditional update is atomic on its
//! own record; nothing here spans two records.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::driver::{Driver, DriverStatus};
use crate::models::rider::Rider;
use crate::models::trip::{Trip, TripStatus};

pub use memory::MemoryStore;

/// Mutation applied to a trip once its expected status has been confirmed.
pub type TripUpdate = Box<dyn FnOnce(&mut Trip) + Send>;

#[async_trait]
pub trait DispatchStore: Send + Sync {
    /// Fails with `Conflict` when the phone is already registered.
    async fn insert_rider(&self, rider: Rider) -> Result<(), AppError>;
    async fn rider(&self, id: Uuid) -> Result<Option<Rider>, AppError>;
    async fn rider_by_phone(&self, phone: &str) -> Result<Option<Rider>, AppError>;

    /// Fails with `Conflict` when the phone is already registered.
    async fn insert_driver(&self, driver: Driver) -> Result<(), AppError>;
    async fn driver(&self, id: Uuid) -> Result<Option<Driver>, AppError>;
    async fn driver_by_phone(&self, phone: &str) -> Result<Option<Driver>, AppError>;
    async fn update_driver_location(&self, id: Uuid, location: GeoPoint)
    -> Result<Driver, AppError>;
    async fn set_driver_status(&self, id: Uuid, status: DriverStatus) -> Result<Driver, AppError>;
    /// Sets `next` only if the driver is currently `expected`; `Conflict`
    /// otherwise.
    async fn compare_and_set_driver_status(
        &self,
        id: Uuid,
        expected: DriverStatus,
        next: DriverStatus,
    ) -> Result<Driver, AppError>;
    async fn count_available_drivers(&self) -> Result<usize, AppError>;

    async fn insert_trip(&self, trip: Trip) -> Result<(), AppError>;
    async fn trip(&self, id: Uuid) -> Result<Option<Trip>, AppError>;
    /// Applies `update` only if the trip is currently `expected`, as one
    /// atomic step. `NotFound` when absent, `Conflict` on a status mismatch.
    async fn update_trip_if(
        &self,
        id: Uuid,
        expected: TripStatus,
        update: TripUpdate,
    ) -> Result<Trip, AppError>;
    /// Newest first, at most `limit`.
    async fn trips_for_rider(&self, rider_id: Uuid, limit: usize) -> Result<Vec<Trip>, AppError>;
    /// Newest first, at most `limit`.
    async fn trips_for_driver(&self, driver_id: Uuid, limit: usize)
    -> Result<Vec<Trip>, AppError>;
    async fn count_trips_requested_since(&self, since: DateTime<Utc>) -> Result<usize, AppError>;

    async fn counts(&self) -> Result<StoreCounts, AppError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StoreCounts {
    pub riders: usize,
    pub drivers: usize,
    pub trips: usize,
}

/// Proximity lookup of assignable drivers.
#[async_trait]
pub trait GeoIndex: Send + Sync {
    /// Drivers with status `available` and a known location within
    /// `radius_km` of `origin`, nearest first, at most `limit`. Drivers at
    /// equal distance keep the index's own iteration order.
    async fn nearby_available_drivers(
        &self,
        origin: &GeoPoint,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<Driver>, AppError>;
}
