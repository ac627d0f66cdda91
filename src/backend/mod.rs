//! Entity client for the hosted backend.
//!
//! [`DataService`] is the untyped wire contract (JSON records per entity kind),
//! [`Collection`] shapes typed requests on top of it and [`Entities`] bundles
//! one collection per record kind. [`AuthService`] covers the session/profile
//! calls.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::{marker::PhantomData, sync::Arc};

use crate::models::{Message, MessageThread, SavedListing, User, UserPatch, Vehicle, VehicleView};

pub mod memory;
pub mod rest;

pub use memory::{MemoryAuthService, MemoryDataService};
pub use rest::{RestAuthService, RestDataService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Vehicle,
    SavedListing,
    VehicleView,
    MessageThread,
    Message,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Vehicle => "Vehicle",
            EntityKind::SavedListing => "SavedListing",
            EntityKind::VehicleView => "VehicleView",
            EntityKind::MessageThread => "MessageThread",
            EntityKind::Message => "Message",
        }
    }
}

/// Equality filter, sort key and limit for a list/filter call.
///
/// Sort keys follow the backend convention: `"-created_date"` sorts descending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Map<String, Value>,
    pub sort: Option<String>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filter.insert(field.to_string(), value.into());
        self
    }

    pub fn sort(mut self, key: &str) -> Self {
        self.sort = Some(key.to_string());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[async_trait]
pub trait DataService: Send + Sync {
    async fn query(&self, kind: EntityKind, query: &Query) -> Result<Vec<Value>>;

    /// Creates a record. When an idempotency key is given, repeated creates
    /// with the same key return the record created first.
    async fn create(&self, kind: EntityKind, record: Value, idempotency_key: Option<&str>) -> Result<Value>;

    async fn update(&self, kind: EntityKind, id: &str, patch: Value) -> Result<Value>;

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()>;
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn me(&self, token: &str) -> Result<User>;

    /// Where to send a browser so the backend can log the user in and come back.
    fn login_url(&self, redirect_to: &str) -> String;

    async fn logout(&self, token: &str) -> Result<()>;

    async fn update_me(&self, token: &str, patch: &UserPatch) -> Result<User>;
}

pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &str;
}

impl Entity for Vehicle {
    const KIND: EntityKind = EntityKind::Vehicle;
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for SavedListing {
    const KIND: EntityKind = EntityKind::SavedListing;
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for VehicleView {
    const KIND: EntityKind = EntityKind::VehicleView;
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for MessageThread {
    const KIND: EntityKind = EntityKind::MessageThread;
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Message {
    const KIND: EntityKind = EntityKind::Message;
    fn id(&self) -> &str {
        &self.id
    }
}

/// Typed view of one entity kind.
pub struct Collection<T> {
    service: Arc<dyn DataService>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Collection<T> {
    pub fn new(service: Arc<dyn DataService>) -> Self {
        Self {
            service,
            _entity: PhantomData,
        }
    }

    pub async fn list(&self, sort: &str) -> Result<Vec<T>> {
        self.filter(Query::new().sort(sort)).await
    }

    /// Runs the query. Records that do not decode are logged and left out.
    pub async fn filter(&self, query: Query) -> Result<Vec<T>> {
        let records = self.service.query(T::KIND, &query).await?;
        let decoded = records
            .into_iter()
            .filter_map(|record| {
                let id = record.get("id").and_then(|v| v.as_str()).unwrap_or("?").to_string();
                match decode::<T>(record) {
                    Ok(entity) => Some(entity),
                    Err(e) => {
                        tracing::warn!(kind = T::KIND.as_str(), id = %id, "Skipping undecodable record: {:?}", e);
                        None
                    }
                }
            })
            .collect();
        Ok(decoded)
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>> {
        let mut found = self.filter(Query::new().eq("id", id).limit(1)).await?;
        Ok(if found.is_empty() { None } else { Some(found.remove(0)) })
    }

    pub async fn create(&self, record: &impl Serialize) -> Result<T> {
        let value = encode(record)?;
        decode(self.service.create(T::KIND, value, None).await?)
    }

    pub async fn create_idempotent(&self, record: &impl Serialize, key: &str) -> Result<T> {
        let value = encode(record)?;
        decode(self.service.create(T::KIND, value, Some(key)).await?)
    }

    pub async fn update(&self, id: &str, patch: &impl Serialize) -> Result<T> {
        let value = encode(patch)?;
        decode(self.service.update(T::KIND, id, value).await?)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.service.delete(T::KIND, id).await
    }
}

fn encode(record: &impl Serialize) -> Result<Value> {
    serde_json::to_value(record).context("Failed to serialize record for the backend")
}

fn decode<T: Entity>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .with_context(|| format!("Failed to parse {} record from the backend", T::KIND.as_str()))
}

/// One collection per record kind, sharing a single data service.
#[derive(Clone)]
pub struct Entities {
    pub vehicles: Collection<Vehicle>,
    pub saved_listings: Collection<SavedListing>,
    pub vehicle_views: Collection<VehicleView>,
    pub threads: Collection<MessageThread>,
    pub messages: Collection<Message>,
}

impl Entities {
    pub fn new(service: Arc<dyn DataService>) -> Self {
        Self {
            vehicles: Collection::new(Arc::clone(&service)),
            saved_listings: Collection::new(Arc::clone(&service)),
            vehicle_views: Collection::new(Arc::clone(&service)),
            threads: Collection::new(Arc::clone(&service)),
            messages: Collection::new(service),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn filter_skips_records_that_do_not_decode() {
        let data = Arc::new(MemoryDataService::new());
        data.seed(EntityKind::Vehicle, json!({ "id": "ok", "status": "active", "mileage": 12.5 }))
            .await;
        data.seed(EntityKind::Vehicle, json!({ "id": "broken", "features": { "sunroof": true } }))
            .await;
        let vehicles: Collection<Vehicle> = Collection::new(data);

        let found = vehicles.list("-created_date").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "ok");
        assert_eq!(found[0].mileage, 13);
        assert!(vehicles.get("broken").await.unwrap().is_none());
    }
}
