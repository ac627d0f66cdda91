// Vehicle detail, saved listings, seller pages and owner listing management.

use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::{
    backend::{Entities, Query},
    integrations::Integrations,
    models::{SavedListing, Vehicle, VehicleStatus},
};

#[derive(Error, Debug)]
pub enum ListingError {
    #[error("Vehicle {0} not found")]
    NotFound(String),
    #[error("You can only manage your own listings")]
    NotOwner,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct VehicleDetail {
    pub vehicle: Vehicle,
    pub similar: Vec<Vehicle>,
    pub saved: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedVehicle {
    pub saved: SavedListing,
    pub vehicle: Vehicle,
}

/// Case-insensitive match over the fields shown on an owner's listing card.
pub fn listing_matches(vehicle: &Vehicle, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }
    [
        Some(vehicle.title.as_str()),
        Some(vehicle.make.as_str()),
        Some(vehicle.model.as_str()),
        vehicle.trim.as_deref(),
        vehicle.description.as_deref(),
        vehicle.location.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(&query))
}

#[derive(Clone)]
pub struct ListingService {
    entities: Entities,
    integrations: Arc<dyn Integrations>,
    similar_limit: usize,
}

impl ListingService {
    pub fn new(entities: Entities, integrations: Arc<dyn Integrations>, similar_limit: usize) -> Self {
        Self {
            entities,
            integrations,
            similar_limit,
        }
    }

    async fn owned_vehicle(&self, owner: &str, id: &str) -> Result<Vehicle, ListingError> {
        let vehicle = self
            .entities
            .vehicles
            .get(id)
            .await?
            .ok_or_else(|| ListingError::NotFound(id.to_string()))?;
        if vehicle.created_by.as_deref() != Some(owner) {
            return Err(ListingError::NotOwner);
        }
        Ok(vehicle)
    }

    /// Loads a vehicle with similar listings and the viewer's saved flag.
    /// The view is recorded in the background.
    pub async fn vehicle_detail(
        &self,
        id: &str,
        viewer_email: Option<&str>,
        viewer_id: &str,
    ) -> Result<VehicleDetail, ListingError> {
        let vehicle = self
            .entities
            .vehicles
            .get(id)
            .await?
            .ok_or_else(|| ListingError::NotFound(id.to_string()))?;

        self.record_view(id, viewer_email.map(str::to_string), viewer_id.to_string());

        let saved = match viewer_email {
            Some(email) => !self.saved_entries(email, id).await?.is_empty(),
            None => false,
        };
        let similar = self.similar(&vehicle).await.unwrap_or_else(|e| {
            tracing::warn!(vehicle = id, "Failed to load similar vehicles: {:?}", e);
            Vec::new()
        });

        Ok(VehicleDetail { vehicle, similar, saved })
    }

    fn record_view(&self, vehicle_id: &str, user_email: Option<String>, viewer_id: String) {
        let views = self.entities.vehicle_views.clone();
        let vehicle_id = vehicle_id.to_string();
        tokio::spawn(async move {
            let record = json!({
                "vehicle_id": vehicle_id,
                "viewer_ip": viewer_id,
                "user_email": user_email,
                "viewed_at": chrono::Utc::now(),
            });
            if let Err(e) = views.create(&record).await {
                tracing::warn!(vehicle = %vehicle_id, "Failed to record view: {:?}", e);
            }
        });
    }

    /// Active vehicles of the same make, newest first, without `vehicle` itself.
    pub async fn similar(&self, vehicle: &Vehicle) -> anyhow::Result<Vec<Vehicle>> {
        let found = self
            .entities
            .vehicles
            .filter(
                Query::new()
                    .eq("make", vehicle.make.as_str())
                    .eq("status", VehicleStatus::Active.as_str())
                    .sort("-created_date")
                    .limit(self.similar_limit),
            )
            .await?;
        Ok(found.into_iter().filter(|v| v.id != vehicle.id).collect())
    }

    async fn saved_entries(&self, user_email: &str, vehicle_id: &str) -> anyhow::Result<Vec<SavedListing>> {
        self.entities
            .saved_listings
            .filter(
                Query::new()
                    .eq("vehicle_id", vehicle_id)
                    .eq("user_email", user_email),
            )
            .await
    }

    /// Saves or unsaves a vehicle. Returns whether it is saved afterwards.
    pub async fn toggle_saved(&self, user_email: &str, vehicle_id: &str) -> Result<bool, ListingError> {
        let existing = self.saved_entries(user_email, vehicle_id).await?;
        if existing.is_empty() {
            self.entities
                .saved_listings
                .create(&json!({ "vehicle_id": vehicle_id, "user_email": user_email }))
                .await?;
            tracing::info!(vehicle = vehicle_id, user = user_email, "Listing saved");
            return Ok(true);
        }
        for entry in existing {
            self.entities.saved_listings.delete(&entry.id).await?;
        }
        tracing::info!(vehicle = vehicle_id, user = user_email, "Listing unsaved");
        Ok(false)
    }

    /// The user's saved listings, newest first. Entries whose vehicle is gone are skipped.
    pub async fn saved_vehicles(&self, user_email: &str) -> Result<Vec<SavedVehicle>, ListingError> {
        let saved = self
            .entities
            .saved_listings
            .filter(Query::new().eq("user_email", user_email).sort("-created_date"))
            .await?;

        let vehicles = join_all(saved.iter().map(|entry| self.entities.vehicles.get(&entry.vehicle_id))).await;
        let joined = saved
            .into_iter()
            .zip(vehicles)
            .filter_map(|(saved, vehicle)| match vehicle {
                Ok(Some(vehicle)) => Some(SavedVehicle { saved, vehicle }),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(vehicle = %saved.vehicle_id, "Failed to load saved vehicle: {:?}", e);
                    None
                }
            })
            .collect();
        Ok(joined)
    }

    pub async fn my_listings(&self, owner: &str, search: Option<&str>) -> Result<Vec<Vehicle>, ListingError> {
        let vehicles = self
            .entities
            .vehicles
            .filter(Query::new().eq("created_by", owner).sort("-created_date"))
            .await?;
        Ok(match search {
            Some(q) => vehicles.into_iter().filter(|v| listing_matches(v, q)).collect(),
            None => vehicles,
        })
    }

    /// Changes a listing's status and tells users who saved it, if the status really changed.
    pub async fn change_status(&self, owner: &str, id: &str, status: VehicleStatus) -> Result<Vehicle, ListingError> {
        let vehicle = self.owned_vehicle(owner, id).await?;
        let previous = vehicle.status.clone();
        if previous.as_ref() == Some(&status) {
            return Ok(vehicle);
        }

        let updated = self
            .entities
            .vehicles
            .update(id, &json!({ "status": status }))
            .await?;
        tracing::info!(vehicle = id, from = ?previous, to = %status, "Listing status changed");

        let payload = json!({
            "vehicleId": id,
            "newStatus": status,
            "previousStatus": previous,
        });
        if let Err(e) = self.integrations.invoke_function("notifySavedUsers", payload).await {
            tracing::warn!(vehicle = id, "Failed to notify users who saved the listing: {:?}", e);
        }
        Ok(updated)
    }

    pub async fn delete(&self, owner: &str, id: &str) -> Result<(), ListingError> {
        self.owned_vehicle(owner, id).await?;
        self.entities.vehicles.delete(id).await?;
        tracing::info!(vehicle = id, owner, "Listing deleted");
        Ok(())
    }

    /// A seller's public (active) listings, newest first.
    pub async fn seller_listings(&self, seller_email: &str) -> Result<Vec<Vehicle>, ListingError> {
        let vehicles = self
            .entities
            .vehicles
            .filter(
                Query::new()
                    .eq("created_by", seller_email)
                    .eq("status", VehicleStatus::Active.as_str())
                    .sort("-created_date"),
            )
            .await?;
        Ok(vehicles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_search_covers_card_fields() {
        let vehicle = Vehicle {
            title: "Clean Civic".into(),
            make: "Honda".into(),
            model: "Civic".into(),
            trim: Some("EX".into()),
            location: Some("Austin, TX".into()),
            ..Default::default()
        };
        assert!(listing_matches(&vehicle, "austin"));
        assert!(listing_matches(&vehicle, " HONDA "));
        assert!(listing_matches(&vehicle, "ex"));
        assert!(listing_matches(&vehicle, ""));
        assert!(!listing_matches(&vehicle, "toyota"));
    }
}
