mod common;

use carlot_rust::{
    models::GeoPoint,
    search::{MarketplaceState, SearchRadius, UserLocation},
};
use common::{seed_vehicle, test_app, test_app_with_geocoder, FailingGeocoder, SELLER};
use std::sync::Arc;

fn near_austin(radius: u32) -> MarketplaceState {
    let mut state = MarketplaceState::default();
    state.filters.user_location = Some(UserLocation {
        label: "Round Rock, TX".into(),
        coordinates: Some(GeoPoint { lat: 30.5083, lng: -97.6789 }),
    });
    state.filters.search_radius = SearchRadius::Miles(radius);
    state
}

#[tokio::test]
async fn located_listings_are_geocoded_and_the_coordinates_kept() {
    let app = test_app();
    seed_vehicle(&app.data, "v1", SELLER, 18500.0).await;

    let results = app.state.search.search(&near_austin(25)).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].distance, Some(17));
    let stored = app.state.entities.vehicles.get("v1").await.unwrap().unwrap();
    assert_eq!(stored.latitude, Some(30.2672));
    assert_eq!(stored.longitude, Some(-97.7431));
}

#[tokio::test]
async fn geocoder_failures_keep_the_listing() {
    let app = test_app_with_geocoder(Arc::new(FailingGeocoder));
    seed_vehicle(&app.data, "v1", SELLER, 18500.0).await;

    let results = app.state.search.search(&near_austin(10)).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].vehicle.id, "v1");
    assert_eq!(results[0].distance, None);
    let stored = app.state.entities.vehicles.get("v1").await.unwrap().unwrap();
    assert_eq!(stored.latitude, None);
}
