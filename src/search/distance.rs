// Distance annotation with on-demand geocoding of vehicle locations.

use futures::future::join_all;
use serde_json::json;
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use super::RankedVehicle;
use crate::{
    backend::Collection,
    integrations::Geocoder,
    models::{GeoPoint, Vehicle},
};

pub const EARTH_RADIUS_MILES: f64 = 3959.0;

/// Great-circle distance in miles.
pub fn haversine_miles(from: GeoPoint, to: GeoPoint) -> f64 {
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lng = (to.lng - from.lng).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + from.lat.to_radians().cos() * to.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_MILES * c
}

/// Distance rounded to the nearest mile.
pub fn rounded_miles(from: GeoPoint, to: GeoPoint) -> u32 {
    haversine_miles(from, to).round() as u32
}

// Removes the vehicle id from the in-flight set when the lookup finishes.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.id);
        }
    }
}

#[derive(Clone)]
pub struct DistanceAnnotator {
    geocoder: Arc<dyn Geocoder>,
    vehicles: Collection<Vehicle>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl DistanceAnnotator {
    pub fn new(geocoder: Arc<dyn Geocoder>, vehicles: Collection<Vehicle>) -> Self {
        Self {
            geocoder,
            vehicles,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn claim(&self, id: &str) -> Option<InFlightGuard<'_>> {
        let mut set = self.in_flight.lock().ok()?;
        if set.insert(id.to_string()) {
            Some(InFlightGuard {
                set: &self.in_flight,
                id: id.to_string(),
            })
        } else {
            None
        }
    }

    /// Annotates every vehicle with its distance from `origin`.
    /// Without an origin every distance is `None`.
    pub async fn annotate(&self, vehicles: Vec<Vehicle>, origin: Option<GeoPoint>) -> Vec<RankedVehicle> {
        let Some(origin) = origin else {
            return vehicles
                .into_iter()
                .map(|vehicle| RankedVehicle { vehicle, distance: None })
                .collect();
        };

        join_all(vehicles.into_iter().map(|vehicle| self.annotate_one(vehicle, origin))).await
    }

    async fn annotate_one(&self, mut vehicle: Vehicle, origin: GeoPoint) -> RankedVehicle {
        if vehicle.coordinates().is_none() {
            if let Some(point) = self.backfill(&vehicle).await {
                vehicle.latitude = Some(point.lat);
                vehicle.longitude = Some(point.lng);
            }
        }
        let distance = vehicle.coordinates().map(|point| rounded_miles(origin, point));
        RankedVehicle { vehicle, distance }
    }

    // Geocodes the vehicle's location and persists the result. Never fails:
    // every error is logged and treated as "no coordinates".
    async fn backfill(&self, vehicle: &Vehicle) -> Option<GeoPoint> {
        let location = vehicle.location.as_deref().map(str::trim).filter(|l| !l.is_empty())?;
        let _guard = self.claim(&vehicle.id)?;

        let point = match self.geocoder.geocode(location).await {
            Ok(Some(result)) => result.point,
            Ok(None) => {
                tracing::debug!(vehicle = %vehicle.id, location, "Location could not be geocoded");
                return None;
            }
            Err(e) => {
                tracing::warn!(vehicle = %vehicle.id, location, "Failed to geocode vehicle location: {:?}", e);
                return None;
            }
        };

        let patch = json!({ "latitude": point.lat, "longitude": point.lng });
        if let Err(e) = self.vehicles.update(&vehicle.id, &patch).await {
            tracing::warn!(vehicle = %vehicle.id, "Failed to store geocoded coordinates: {:?}", e);
        }
        Some(point)
    }
}
