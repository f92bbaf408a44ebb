//! Fare and surge computation. Everything here is pure.

use serde::Serialize;

use crate::geo::{haversine_km, GeoPoint};

pub const BASE_FARE: f64 = 50.0;
pub const PER_KM_RATE: f64 = 15.0;
pub const MAX_SURGE: f64 = 2.5;
const SURGE_SLOPE: f64 = 0.6;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FareEstimate {
    pub base_fare: f64,
    pub distance_km: f64,
    pub per_km_rate: f64,
    pub surge_factor: f64,
    pub estimated_fare: f64,
}

pub fn distance_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    haversine_km(a, b)
}

/// `1.0` while demand does not exceed supply, rising by `0.6` per unit of
/// excess ratio, capped at `MAX_SURGE`. No supply at all is full surge.
pub fn surge_factor(demand: usize, supply: usize) -> f64 {
    if supply == 0 {
        return MAX_SURGE;
    }

    let ratio = demand as f64 / supply as f64;
    (1.0 + SURGE_SLOPE * (ratio - 1.0).max(0.0)).min(MAX_SURGE)
}

/// Fare charged when a trip completes. Surge only applies to estimates.
pub fn trip_fare(distance_km: f64) -> f64 {
    BASE_FARE + PER_KM_RATE * distance_km
}

pub fn estimate(pickup: &GeoPoint, dropoff: &GeoPoint, demand: usize, supply: usize) -> FareEstimate {
    let distance_km = distance_km(pickup, dropoff);
    let surge_factor = surge_factor(demand, supply);

    FareEstimate {
        base_fare: BASE_FARE,
        distance_km,
        per_km_rate: PER_KM_RATE,
        surge_factor,
        estimated_fare: trip_fare(distance_km) * surge_factor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_supply_means_full_surge() {
        assert_eq!(surge_factor(0, 0), 2.5);
        assert_eq!(surge_factor(40, 0), 2.5);
    }

    #[test]
    fn surplus_supply_means_no_surge() {
        assert_eq!(surge_factor(5, 10), 1.0);
        assert_eq!(surge_factor(10, 10), 1.0);
    }

    #[test]
    fn surge_grows_with_excess_demand_and_is_capped() {
        assert!((surge_factor(20, 10) - 1.6).abs() < 1e-12);
        assert_eq!(surge_factor(1_000_000, 1), MAX_SURGE);
    }

    #[test]
    fn surge_is_monotonic() {
        let mut last = surge_factor(0, 10);
        for demand in 1..100 {
            let next = surge_factor(demand, 10);
            assert!(next >= last);
            assert!((1.0..=MAX_SURGE).contains(&next));
            last = next;
        }

        let mut last = surge_factor(50, 1);
        for supply in 2..100 {
            let next = surge_factor(50, supply);
            assert!(next <= last);
            last = next;
        }
    }

    #[test]
    fn estimate_applies_surge_to_distance_fare() {
        let pickup = GeoPoint::from_lat_lng(28.6139, 77.2090);
        let dropoff = GeoPoint::from_lat_lng(28.6219, 77.2170);

        let calm = estimate(&pickup, &dropoff, 1, 10);
        assert_eq!(calm.base_fare, BASE_FARE);
        assert_eq!(calm.per_km_rate, PER_KM_RATE);
        assert_eq!(calm.surge_factor, 1.0);
        assert!((calm.estimated_fare - trip_fare(calm.distance_km)).abs() < 1e-9);
        assert!((65.0..=70.0).contains(&calm.estimated_fare));

        let busy = estimate(&pickup, &dropoff, 3, 0);
        assert!((busy.estimated_fare - calm.estimated_fare * 2.5).abs() < 1e-9);
    }

    #[test]
    fn identical_points_cost_the_base_fare() {
        let point = GeoPoint::from_lat_lng(12.9716, 77.5946);
        let quote = estimate(&point, &point, 0, 5);
        assert_eq!(quote.distance_km, 0.0);
        assert_eq!(quote.estimated_fare, BASE_FARE);
    }
}
