// REST client for the hosted backend's entity and auth endpoints.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::sync::Arc;

use super::{AuthService, DataService, EntityKind, Query};
use crate::config::BackendSettings;
use crate::models::{User, UserPatch};

const API_KEY_HEADER: &str = "api_key";
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Clone)]
pub struct RestDataService {
    http_client: Arc<Client>,
    base_url: String,
    app_id: String,
    api_key: Option<String>,
}

impl RestDataService {
    pub fn new(http_client: Arc<Client>, settings: &BackendSettings) -> Self {
        Self {
            http_client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            app_id: settings.app_id.clone(),
            api_key: settings.api_key.clone(),
        }
    }

    fn collection_url(&self, kind: EntityKind) -> String {
        format!("{}/apps/{}/entities/{}", self.base_url, self.app_id, kind.as_str())
    }

    fn record_url(&self, kind: EntityKind, id: &str) -> String {
        format!("{}/{}", self.collection_url(kind), id)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }
}

#[async_trait]
impl DataService for RestDataService {
    async fn query(&self, kind: EntityKind, query: &Query) -> Result<Vec<Value>> {
        let url = self.collection_url(kind);
        let mut params: Vec<(&str, String)> = Vec::new();
        if !query.filter.is_empty() {
            params.push(("q", Value::Object(query.filter.clone()).to_string()));
        }
        if let Some(sort) = &query.sort {
            params.push(("sort_by", sort.clone()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        tracing::debug!(kind = kind.as_str(), ?params, "Querying backend entities");

        let response = self
            .authorized(self.http_client.get(&url).query(&params))
            .send()
            .await
            .with_context(|| format!("Failed to reach backend listing {}", kind.as_str()))?
            .error_for_status()?;

        let records: Vec<Value> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} list response", kind.as_str()))?;
        Ok(records)
    }

    async fn create(&self, kind: EntityKind, record: Value, idempotency_key: Option<&str>) -> Result<Value> {
        let url = self.collection_url(kind);
        let mut request = self.authorized(self.http_client.post(&url)).json(&record);
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach backend creating {}", kind.as_str()))?
            .error_for_status()?;

        let created: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse response after creating {}", kind.as_str()))?;
        tracing::info!(
            kind = kind.as_str(),
            id = created.get("id").and_then(|v| v.as_str()).unwrap_or("?"),
            "Created backend record"
        );
        Ok(created)
    }

    async fn update(&self, kind: EntityKind, id: &str, patch: Value) -> Result<Value> {
        let url = self.record_url(kind, id);
        let response = self
            .authorized(self.http_client.put(&url))
            .json(&patch)
            .send()
            .await
            .with_context(|| format!("Failed to reach backend updating {} {}", kind.as_str(), id))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(anyhow!("{} {} not found", kind.as_str(), id));
        }
        let updated: Value = response
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("Failed to parse response after updating {} {}", kind.as_str(), id))?;
        Ok(updated)
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        let url = self.record_url(kind, id);
        self.authorized(self.http_client.delete(&url))
            .send()
            .await
            .with_context(|| format!("Failed to reach backend deleting {} {}", kind.as_str(), id))?
            .error_for_status()?;
        tracing::info!(kind = kind.as_str(), id, "Deleted backend record");
        Ok(())
    }
}

#[derive(Clone)]
pub struct RestAuthService {
    http_client: Arc<Client>,
    base_url: String,
    app_id: String,
    login_url: String,
}

impl RestAuthService {
    pub fn new(http_client: Arc<Client>, settings: &BackendSettings, login_url: &str) -> Self {
        Self {
            http_client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            app_id: settings.app_id.clone(),
            login_url: login_url.to_string(),
        }
    }

    fn me_url(&self) -> String {
        format!("{}/apps/{}/entities/User/me", self.base_url, self.app_id)
    }
}

#[async_trait]
impl AuthService for RestAuthService {
    async fn me(&self, token: &str) -> Result<User> {
        let response = self
            .http_client
            .get(self.me_url())
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await
            .context("Failed to reach backend for current user")?
            .error_for_status()?;
        response.json().await.context("Failed to parse current user response")
    }

    fn login_url(&self, redirect_to: &str) -> String {
        match url::Url::parse_with_params(&self.login_url, &[("from_url", redirect_to)]) {
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::warn!("Configured login URL '{}' is invalid: {}", self.login_url, e);
                self.login_url.clone()
            }
        }
    }

    async fn logout(&self, token: &str) -> Result<()> {
        let url = format!("{}/apps/{}/auth/logout", self.base_url, self.app_id);
        self.http_client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await
            .context("Failed to reach backend for logout")?
            .error_for_status()?;
        Ok(())
    }

    async fn update_me(&self, token: &str, patch: &UserPatch) -> Result<User> {
        let response = self
            .http_client
            .put(self.me_url())
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .json(patch)
            .send()
            .await
            .context("Failed to reach backend updating current user")?
            .error_for_status()?;
        response.json().await.context("Failed to parse updated user response")
    }
}
