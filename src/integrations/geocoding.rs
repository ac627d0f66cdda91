// Forward and reverse geocoding.
// The hosted backend exposes both as server functions; results are cached in a
// timed LRU since vehicle locations repeat heavily ("Austin, TX").

use anyhow::Result;
use async_trait::async_trait;
use cached::{Cached, TimedSizedCache};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};

use super::Integrations;
use crate::models::GeoPoint;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodeResult {
    pub point: GeoPoint,
    pub label: Option<String>,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolves "City, State" to coordinates. `Ok(None)` means the place is unknown.
    async fn geocode(&self, city_state: &str) -> Result<Option<GeocodeResult>>;

    /// Resolves coordinates to a "City, State" label.
    async fn reverse(&self, point: GeoPoint) -> Result<Option<String>>;
}

#[derive(Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    success: bool,
    coordinates: Option<GeoPoint>,
    #[serde(default)]
    formatted_address: Option<String>,
}

#[derive(Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    success: bool,
    location: Option<String>,
}

/// Geocoder backed by the backend's `geocodeCity` / `reverseGeocode` functions.
pub struct FunctionGeocoder {
    integrations: Arc<dyn Integrations>,
}

impl FunctionGeocoder {
    pub fn new(integrations: Arc<dyn Integrations>) -> Self {
        Self { integrations }
    }
}

#[async_trait]
impl Geocoder for FunctionGeocoder {
    async fn geocode(&self, city_state: &str) -> Result<Option<GeocodeResult>> {
        let value = self
            .integrations
            .invoke_function("geocodeCity", json!({ "cityState": city_state }))
            .await?;
        let response: GeocodeResponse = serde_json::from_value(value)?;
        Ok(match (response.success, response.coordinates) {
            (true, Some(point)) => Some(GeocodeResult {
                point,
                label: response.formatted_address,
            }),
            _ => None,
        })
    }

    async fn reverse(&self, point: GeoPoint) -> Result<Option<String>> {
        let value = self
            .integrations
            .invoke_function(
                "reverseGeocode",
                json!({ "latitude": point.lat, "longitude": point.lng }),
            )
            .await?;
        let response: ReverseResponse = serde_json::from_value(value)?;
        Ok(if response.success { response.location } else { None })
    }
}

/// Caches forward lookups, including "not found" answers. Errors are not cached.
pub struct CachedGeocoder {
    inner: Arc<dyn Geocoder>,
    cache: Mutex<TimedSizedCache<String, Option<GeocodeResult>>>,
}

impl CachedGeocoder {
    pub fn new(inner: Arc<dyn Geocoder>, size: usize, ttl_secs: u64) -> Self {
        Self {
            inner,
            cache: Mutex::new(TimedSizedCache::with_size_and_lifespan(size.max(1), ttl_secs)),
        }
    }

    fn cache_key(city_state: &str) -> String {
        city_state.trim().to_lowercase()
    }

    fn cached(&self, key: &String) -> Option<Option<GeocodeResult>> {
        match self.cache.lock() {
            Ok(mut cache) => cache.cache_get(key).cloned(),
            Err(_) => None,
        }
    }
}

#[async_trait]
impl Geocoder for CachedGeocoder {
    async fn geocode(&self, city_state: &str) -> Result<Option<GeocodeResult>> {
        let key = Self::cache_key(city_state);
        if let Some(hit) = self.cached(&key) {
            tracing::debug!(location = city_state, "Geocode cache hit");
            return Ok(hit);
        }

        let result = self.inner.geocode(city_state).await?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.cache_set(key, result.clone());
        }
        Ok(result)
    }

    async fn reverse(&self, point: GeoPoint) -> Result<Option<String>> {
        self.inner.reverse(point).await
    }
}
