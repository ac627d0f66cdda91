//! Marketplace filter, sort and proximity pipeline.
//!
//! Stages, in order: active-only, keyword/tag match, field filters, distance
//! annotation (with geocoding backfill), radius, sort. Field filters run before
//! annotation so that vehicles already excluded are never geocoded; every stage
//! is a pure filter so the result is the same as annotating first.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::{
    backend::{Collection, Query},
    integrations::{Geocoder, Integrations},
    models::Vehicle,
};

pub mod ai;
pub mod criteria;
pub mod distance;
pub mod keywords;
pub mod sort;
pub mod state;

pub use ai::{GuidedOutcome, GuidedTurn, Speaker};
pub use criteria::{FilterCriteria, FilterError, MarketplaceState, SearchCriteria, SearchRadius, UserLocation};
pub use distance::DistanceAnnotator;
pub use sort::SortOption;
pub use state::MarketplaceStateStore;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("Search query must not be empty")]
    EmptyQuery,
    #[error("The conversation must end with a non-empty user message")]
    NoUserTurn,
    #[error("Location must not be empty")]
    EmptyLocation,
    #[error("Could not determine that location. Please enter it manually.")]
    LocationNotFound,
    #[error("I couldn't understand that search. Please try rephrasing your request.")]
    Upstream(#[source] anyhow::Error),
}

/// A vehicle with its distance from the user, when known.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedVehicle {
    #[serde(flatten)]
    pub vehicle: Vehicle,
    pub distance: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub has_more: bool,
}

/// Slices out a 1-based page. Page 0 is treated as page 1.
pub fn paginate<T>(list: Vec<T>, page: usize, page_size: usize) -> Page<T> {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let total = list.len();
    let start = (page - 1).saturating_mul(page_size).min(total);
    let items: Vec<T> = list.into_iter().skip(start).take(page_size).collect();
    let has_more = start + items.len() < total;
    Page {
        items,
        total,
        page,
        page_size,
        has_more,
    }
}

// Stages that need no I/O.
fn select(vehicles: Vec<Vehicle>, filters: &FilterCriteria, criteria: &SearchCriteria) -> Vec<Vehicle> {
    vehicles
        .into_iter()
        .filter(Vehicle::is_active)
        .filter(|vehicle| keywords::matches(criteria, vehicle))
        .filter(|vehicle| filters.matches(vehicle))
        .collect()
}

fn finish(mut ranked: Vec<RankedVehicle>, filters: &FilterCriteria, sort: SortOption) -> Vec<RankedVehicle> {
    if let (Some(radius), Some(_)) = (filters.search_radius.limit(), filters.origin()) {
        // Unknown distance is kept.
        ranked.retain(|r| r.distance.map_or(true, |miles| miles <= radius));
    }
    sort.apply(&mut ranked);
    ranked
}

/// Runs the pipeline using only coordinates already on the records.
pub fn rank(
    vehicles: Vec<Vehicle>,
    filters: &FilterCriteria,
    criteria: &SearchCriteria,
    sort: SortOption,
) -> Vec<RankedVehicle> {
    let origin = filters.origin();
    let ranked = select(vehicles, filters, criteria)
        .into_iter()
        .map(|vehicle| {
            let distance = origin
                .zip(vehicle.coordinates())
                .map(|(from, to)| distance::rounded_miles(from, to));
            RankedVehicle { vehicle, distance }
        })
        .collect();
    finish(ranked, filters, sort)
}

#[derive(Clone)]
pub struct SearchService {
    vehicles: Collection<Vehicle>,
    annotator: DistanceAnnotator,
    integrations: Arc<dyn Integrations>,
    geocoder: Arc<dyn Geocoder>,
}

impl SearchService {
    pub fn new(vehicles: Collection<Vehicle>, integrations: Arc<dyn Integrations>, geocoder: Arc<dyn Geocoder>) -> Self {
        Self {
            annotator: DistanceAnnotator::new(Arc::clone(&geocoder), vehicles.clone()),
            vehicles,
            integrations,
            geocoder,
        }
    }

    /// Full pipeline over an already-fetched list. Geocoding failures never fail the run.
    pub async fn run(
        &self,
        vehicles: Vec<Vehicle>,
        filters: &FilterCriteria,
        criteria: &SearchCriteria,
        sort: SortOption,
    ) -> Vec<RankedVehicle> {
        let selected = select(vehicles, filters, criteria);
        let ranked = self.annotator.annotate(selected, filters.origin()).await;
        finish(ranked, filters, sort)
    }

    /// Fetches the active listings and runs the pipeline over them.
    pub async fn search(&self, state: &MarketplaceState) -> Result<Vec<RankedVehicle>> {
        let vehicles = self
            .vehicles
            .filter(Query::new().eq("status", "active").sort("-created_date"))
            .await?;
        tracing::debug!(candidates = vehicles.len(), "Running marketplace search");
        Ok(self.run(vehicles, &state.filters, &state.criteria, state.sort).await)
    }
}
