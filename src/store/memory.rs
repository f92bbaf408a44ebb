use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::{haversine_km, GeoPoint};
use crate::models::driver::{Driver, DriverStatus};
use crate::models::rider::Rider;
use crate::models::trip::{Trip, TripStatus};
use crate::store::{DispatchStore, GeoIndex, StoreCounts, TripUpdate};

/// Process-local store. Every conditional update runs under the shard lock
/// of the record it touches.
#[derive(Default)]
pub struct MemoryStore {
    riders: DashMap<Uuid, Rider>,
    rider_phones: DashMap<String, Uuid>,
    drivers: DashMap<Uuid, Driver>,
    driver_phones: DashMap<String, Uuid>,
    trips: DashMap<Uuid, Trip>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn newest_first(mut trips: Vec<Trip>, limit: usize) -> Vec<Trip> {
        trips.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        trips.truncate(limit);
        trips
    }
}

fn driver_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("driver {id} not found"))
}

#[async_trait]
impl DispatchStore for MemoryStore {
    async fn insert_rider(&self, rider: Rider) -> Result<(), AppError> {
        match self.rider_phones.entry(rider.phone.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "phone {} already registered",
                rider.phone
            ))),
            Entry::Vacant(slot) => {
                slot.insert(rider.id);
                self.riders.insert(rider.id, rider);
                Ok(())
            }
        }
    }

    async fn rider(&self, id: Uuid) -> Result<Option<Rider>, AppError> {
        Ok(self.riders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn rider_by_phone(&self, phone: &str) -> Result<Option<Rider>, AppError> {
        let Some(id) = self.rider_phones.get(phone).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        self.rider(id).await
    }

    async fn insert_driver(&self, driver: Driver) -> Result<(), AppError> {
        match self.driver_phones.entry(driver.phone.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "phone {} already registered",
                driver.phone
            ))),
            Entry::Vacant(slot) => {
                slot.insert(driver.id);
                self.drivers.insert(driver.id, driver);
                Ok(())
            }
        }
    }

    async fn driver(&self, id: Uuid) -> Result<Option<Driver>, AppError> {
        Ok(self.drivers.get(&id).map(|entry| entry.value().clone()))
    }

    async fn driver_by_phone(&self, phone: &str) -> Result<Option<Driver>, AppError> {
        let Some(id) = self.driver_phones.get(phone).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        self.driver(id).await
    }

    async fn update_driver_location(
        &self,
        id: Uuid,
        location: GeoPoint,
    ) -> Result<Driver, AppError> {
        let mut driver = self.drivers.get_mut(&id).ok_or_else(|| driver_not_found(id))?;

        driver.location = Some(location);
        driver.last_update = Utc::now();

        Ok(driver.clone())
    }

    async fn set_driver_status(&self, id: Uuid, status: DriverStatus) -> Result<Driver, AppError> {
        let mut driver = self.drivers.get_mut(&id).ok_or_else(|| driver_not_found(id))?;

        driver.status = status;
        driver.last_update = Utc::now();

        Ok(driver.clone())
    }

    async fn compare_and_set_driver_status(
        &self,
        id: Uuid,
        expected: DriverStatus,
        next: DriverStatus,
    ) -> Result<Driver, AppError> {
        let mut driver = self.drivers.get_mut(&id).ok_or_else(|| driver_not_found(id))?;

        if driver.status != expected {
            return Err(AppError::Conflict(format!(
                "driver {id} is {}, expected {expected}",
                driver.status
            )));
        }

        driver.status = next;
        driver.last_update = Utc::now();

        Ok(driver.clone())
    }

    async fn count_available_drivers(&self) -> Result<usize, AppError> {
        Ok(self
            .drivers
            .iter()
            .filter(|entry| entry.value().status == DriverStatus::Available)
            .count())
    }

    async fn insert_trip(&self, trip: Trip) -> Result<(), AppError> {
        match self.trips.entry(trip.id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!("trip {} already exists", trip.id))),
            Entry::Vacant(slot) => {
                slot.insert(trip);
                Ok(())
            }
        }
    }

    async fn trip(&self, id: Uuid) -> Result<Option<Trip>, AppError> {
        Ok(self.trips.get(&id).map(|entry| entry.value().clone()))
    }

    async fn update_trip_if(
        &self,
        id: Uuid,
        expected: TripStatus,
        update: TripUpdate,
    ) -> Result<Trip, AppError> {
        let mut trip = self
            .trips
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("trip {id} not found")))?;

        if trip.status != expected {
            return Err(AppError::Conflict(format!(
                "trip {id} is {}, expected {expected}",
                trip.status
            )));
        }

        update(trip.value_mut());
        Ok(trip.clone())
    }

    async fn trips_for_rider(&self, rider_id: Uuid, limit: usize) -> Result<Vec<Trip>, AppError> {
        let trips = self
            .trips
            .iter()
            .filter(|entry| entry.value().rider_id == rider_id)
            .map(|entry| entry.value().clone())
            .collect();
        Ok(Self::newest_first(trips, limit))
    }

    async fn trips_for_driver(
        &self,
        driver_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Trip>, AppError> {
        let trips = self
            .trips
            .iter()
            .filter(|entry| entry.value().driver_id == Some(driver_id))
            .map(|entry| entry.value().clone())
            .collect();
        Ok(Self::newest_first(trips, limit))
    }

    async fn count_trips_requested_since(&self, since: DateTime<Utc>) -> Result<usize, AppError> {
        Ok(self
            .trips
            .iter()
            .filter(|entry| entry.value().requested_at >= since)
            .count())
    }

    async fn counts(&self) -> Result<StoreCounts, AppError> {
        Ok(StoreCounts {
            riders: self.riders.len(),
            drivers: self.drivers.len(),
            trips: self.trips.len(),
        })
    }
}

#[async_trait]
impl GeoIndex for MemoryStore {
    async fn nearby_available_drivers(
        &self,
        origin: &GeoPoint,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<Driver>, AppError> {
        let mut candidates: Vec<(f64, Driver)> = self
            .drivers
            .iter()
            .filter_map(|entry| {
                let driver = entry.value();
                if driver.status != DriverStatus::Available {
                    return None;
                }
                let distance_km = haversine_km(origin, driver.location.as_ref()?);
                (distance_km <= radius_km).then(|| (distance_km, driver.clone()))
            })
            .collect();

        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(candidates
            .into_iter()
            .take(limit)
            .map(|(_, driver)| driver)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn available_driver_at(phone: &str, lat: f64, lng: f64) -> Driver {
        let mut driver = Driver::new("driver".to_string(), phone.to_string(), "DL1C".to_string());
        driver.status = DriverStatus::Available;
        driver.location = Some(GeoPoint::from_lat_lng(lat, lng));
        driver
    }

    #[tokio::test]
    async fn duplicate_rider_phone_is_a_conflict() {
        let store = MemoryStore::new();
        store
            .insert_rider(Rider::new("Asha".to_string(), "9000000001".to_string()))
            .await
            .unwrap();

        let err = store
            .insert_rider(Rider::new("Ravi".to_string(), "9000000001".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.counts().await.unwrap().riders, 1);
    }

    #[tokio::test]
    async fn lookup_by_phone_finds_the_registered_record() {
        let store = MemoryStore::new();
        let rider = Rider::new("Asha".to_string(), "9000000001".to_string());
        store.insert_rider(rider.clone()).await.unwrap();

        let found = store.rider_by_phone("9000000001").await.unwrap().unwrap();
        assert_eq!(found.id, rider.id);
        assert!(store.driver_by_phone("9000000001").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn nearby_query_orders_by_distance_and_skips_ineligible_drivers() {
        let store = MemoryStore::new();
        let far = available_driver_at("1", 28.6500, 77.2500);
        let near = available_driver_at("2", 28.6140, 77.2091);
        let mut offline = available_driver_at("3", 28.6139, 77.2090);
        offline.status = DriverStatus::Offline;
        let mut unlocated = available_driver_at("4", 28.6139, 77.2090);
        unlocated.location = None;
        let out_of_range = available_driver_at("5", 19.0760, 72.8777);

        for driver in [&far, &near, &offline, &unlocated, &out_of_range] {
            store.insert_driver(driver.clone()).await.unwrap();
        }

        let origin = GeoPoint::from_lat_lng(28.6139, 77.2090);
        let found = store
            .nearby_available_drivers(&origin, 10.0, 10)
            .await
            .unwrap();
        let ids: Vec<Uuid> = found.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![near.id, far.id]);

        let capped = store
            .nearby_available_drivers(&origin, 10.0, 1)
            .await
            .unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].id, near.id);
    }

    #[tokio::test]
    async fn conditional_trip_update_checks_expected_status() {
        let store = MemoryStore::new();
        let origin = GeoPoint::from_lat_lng(28.6139, 77.2090);
        let trip = Trip::requested(Uuid::new_v4(), origin, origin);
        store.insert_trip(trip.clone()).await.unwrap();

        let err = store
            .update_trip_if(
                trip.id,
                TripStatus::Assigned,
                Box::new(|t: &mut Trip| t.status = TripStatus::Ongoing),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let updated = store
            .update_trip_if(
                trip.id,
                TripStatus::Requested,
                Box::new(|t: &mut Trip| t.status = TripStatus::Cancelled),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, TripStatus::Cancelled);

        let missing = store
            .update_trip_if(
                Uuid::new_v4(),
                TripStatus::Requested,
                Box::new(|_: &mut Trip| {}),
            )
            .await
            .unwrap_err();
        assert!(matches!(missing, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn trip_history_is_newest_first_and_bounded() {
        let store = MemoryStore::new();
        let rider_id = Uuid::new_v4();
        let origin = GeoPoint::from_lat_lng(28.6139, 77.2090);
        let start = Utc::now();

        for minutes in 0..5 {
            let mut trip = Trip::requested(rider_id, origin, origin);
            trip.requested_at = start + Duration::minutes(minutes);
            store.insert_trip(trip).await.unwrap();
        }
        store
            .insert_trip(Trip::requested(Uuid::new_v4(), origin, origin))
            .await
            .unwrap();

        let page = store.trips_for_rider(rider_id, 3).await.unwrap();
        assert_eq!(page.len(), 3);
        assert!(page.windows(2).all(|w| w[0].requested_at >= w[1].requested_at));
        assert_eq!(page[0].requested_at, start + Duration::minutes(4));

        let recent = store
            .count_trips_requested_since(start + Duration::minutes(3))
            .await
            .unwrap();
        assert_eq!(recent, 2);
    }

    #[tokio::test]
    async fn driver_compare_and_set_rejects_unexpected_status() {
        let store = MemoryStore::new();
        let driver = available_driver_at("1", 28.6139, 77.2090);
        store.insert_driver(driver.clone()).await.unwrap();

        let claimed = store
            .compare_and_set_driver_status(driver.id, DriverStatus::Available, DriverStatus::OnTrip)
            .await
            .unwrap();
        assert_eq!(claimed.status, DriverStatus::OnTrip);

        let err = store
            .compare_and_set_driver_status(driver.id, DriverStatus::Available, DriverStatus::OnTrip)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.count_available_drivers().await.unwrap(), 0);
    }
}
