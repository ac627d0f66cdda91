// In-process implementations of the backend traits.
// Used when `backend.mode = "memory"` and by the test suites.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::{cmp::Ordering, collections::HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AuthService, DataService, EntityKind, Query};
use crate::models::{User, UserPatch};

#[derive(Default)]
struct Tables {
    records: HashMap<EntityKind, Vec<Value>>,
    // (kind, idempotency key) -> id of the record created first
    idempotency: HashMap<(EntityKind, String), String>,
}

#[derive(Default)]
pub struct MemoryDataService {
    tables: RwLock<Tables>,
}

impl MemoryDataService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record as-is (an id and created_date are filled in when missing).
    pub async fn seed(&self, kind: EntityKind, record: Value) -> Value {
        let record = stamp(record);
        let mut tables = self.tables.write().await;
        tables.records.entry(kind).or_default().push(record.clone());
        record
    }

    pub async fn count(&self, kind: EntityKind) -> usize {
        let tables = self.tables.read().await;
        tables.records.get(&kind).map_or(0, Vec::len)
    }
}

fn stamp(record: Value) -> Value {
    let mut object = match record {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let missing_id = object
        .get("id")
        .and_then(Value::as_str)
        .map_or(true, str::is_empty);
    if missing_id {
        object.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
    }
    if !object.contains_key("created_date") {
        object.insert("created_date".to_string(), Value::String(Utc::now().to_rfc3339()));
    }
    Value::Object(object)
}

fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

fn matches_filter(record: &Value, filter: &Map<String, Value>) -> bool {
    filter
        .iter()
        .all(|(field, expected)| record.get(field).unwrap_or(&Value::Null) == expected)
}

fn compare_field(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl DataService for MemoryDataService {
    async fn query(&self, kind: EntityKind, query: &Query) -> Result<Vec<Value>> {
        let tables = self.tables.read().await;
        let mut found: Vec<Value> = tables
            .records
            .get(&kind)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| matches_filter(record, &query.filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(sort) = &query.sort {
            let (field, descending) = match sort.strip_prefix('-') {
                Some(field) => (field, true),
                None => (sort.as_str(), false),
            };
            found.sort_by(|a, b| {
                let ordering = compare_field(a.get(field), b.get(field));
                if descending { ordering.reverse() } else { ordering }
            });
        }
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn create(&self, kind: EntityKind, record: Value, idempotency_key: Option<&str>) -> Result<Value> {
        let mut tables = self.tables.write().await;

        if let Some(key) = idempotency_key {
            if let Some(existing_id) = tables.idempotency.get(&(kind, key.to_string())) {
                let existing = tables
                    .records
                    .get(&kind)
                    .and_then(|records| records.iter().find(|r| record_id(r) == Some(existing_id.as_str())));
                if let Some(existing) = existing {
                    tracing::debug!(kind = kind.as_str(), key, "Idempotent create returned existing record");
                    return Ok(existing.clone());
                }
            }
        }

        let record = stamp(record);
        let id = record_id(&record).unwrap_or_default().to_string();
        tables.records.entry(kind).or_default().push(record.clone());
        if let Some(key) = idempotency_key {
            tables.idempotency.insert((kind, key.to_string()), id);
        }
        Ok(record)
    }

    async fn update(&self, kind: EntityKind, id: &str, patch: Value) -> Result<Value> {
        let Value::Object(patch) = patch else {
            return Err(anyhow!("Update patch for {} {} must be an object", kind.as_str(), id));
        };
        let mut tables = self.tables.write().await;
        let record = tables
            .records
            .get_mut(&kind)
            .and_then(|records| records.iter_mut().find(|r| record_id(r) == Some(id)))
            .ok_or_else(|| anyhow!("{} {} not found", kind.as_str(), id))?;

        if let Value::Object(fields) = &mut *record {
            for (field, value) in patch {
                if field != "id" {
                    fields.insert(field, value);
                }
            }
        }
        Ok(record.clone())
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let records = tables.records.entry(kind).or_default();
        let before = records.len();
        records.retain(|record| record_id(record) != Some(id));
        if records.len() == before {
            return Err(anyhow!("{} {} not found", kind.as_str(), id));
        }
        Ok(())
    }
}

/// Token -> user table standing in for the backend's auth service.
#[derive(Default)]
pub struct MemoryAuthService {
    users: RwLock<HashMap<String, User>>,
    login_url: String,
}

impl MemoryAuthService {
    pub fn new(login_url: impl Into<String>) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            login_url: login_url.into(),
        }
    }

    pub async fn register(&self, token: impl Into<String>, user: User) {
        self.users.write().await.insert(token.into(), user);
    }
}

#[async_trait]
impl AuthService for MemoryAuthService {
    async fn me(&self, token: &str) -> Result<User> {
        self.users
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or_else(|| anyhow!("No session for the given token"))
    }

    fn login_url(&self, redirect_to: &str) -> String {
        match url::Url::parse_with_params(&self.login_url, &[("from_url", redirect_to)]) {
            Ok(url) => url.to_string(),
            Err(_) => self.login_url.clone(),
        }
    }

    async fn logout(&self, token: &str) -> Result<()> {
        self.users.write().await.remove(token);
        Ok(())
    }

    async fn update_me(&self, token: &str, patch: &UserPatch) -> Result<User> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(token)
            .ok_or_else(|| anyhow!("No session for the given token"))?;
        let patch = patch.clone();
        if let Some(v) = patch.full_name {
            user.full_name = Some(v);
        }
        if let Some(v) = patch.bio {
            user.bio = Some(v);
        }
        if let Some(v) = patch.phone {
            user.phone = Some(v);
        }
        if let Some(v) = patch.website {
            user.website = Some(v);
        }
        if let Some(v) = patch.is_dealer {
            user.is_dealer = v;
        }
        if let Some(v) = patch.dealer_name {
            user.dealer_name = Some(v);
        }
        if let Some(v) = patch.profile_picture_url {
            user.profile_picture_url = Some(v);
        }
        Ok(user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn filter_sort_and_limit() {
        let service = MemoryDataService::new();
        for (id, price) in [("a", 300), ("b", 100), ("c", 200)] {
            service
                .seed(EntityKind::Vehicle, json!({ "id": id, "price": price, "make": "Honda" }))
                .await;
        }
        service
            .seed(EntityKind::Vehicle, json!({ "id": "d", "price": 50, "make": "Ford" }))
            .await;

        let query = Query::new().eq("make", "Honda").sort("-price").limit(2);
        let found = service.query(EntityKind::Vehicle, &query).await.unwrap();
        let ids: Vec<&str> = found.iter().filter_map(record_id).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn idempotent_create_returns_first_record() {
        let service = MemoryDataService::new();
        let first = service
            .create(EntityKind::MessageThread, json!({ "subject": "one" }), Some("k1"))
            .await
            .unwrap();
        let second = service
            .create(EntityKind::MessageThread, json!({ "subject": "two" }), Some("k1"))
            .await
            .unwrap();
        assert_eq!(first["id"], second["id"]);
        assert_eq!(second["subject"], "one");
        assert_eq!(service.count(EntityKind::MessageThread).await, 1);
    }

    #[tokio::test]
    async fn update_merges_and_missing_records_error() {
        let service = MemoryDataService::new();
        service
            .seed(EntityKind::Vehicle, json!({ "id": "v1", "price": 1, "title": "x" }))
            .await;
        let updated = service
            .update(EntityKind::Vehicle, "v1", json!({ "price": 2 }))
            .await
            .unwrap();
        assert_eq!(updated["price"], 2);
        assert_eq!(updated["title"], "x");

        assert!(service.update(EntityKind::Vehicle, "nope", json!({})).await.is_err());
        assert!(service.delete(EntityKind::Vehicle, "nope").await.is_err());
    }
}
