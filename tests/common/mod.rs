// Shared fixtures for the integration suites: scripted integrations, a fixed
// geocoder and an app state over the in-memory backend.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use carlot_rust::{
    auth_middleware::Claims,
    backend::{EntityKind, MemoryAuthService, MemoryDataService},
    config::Settings,
    integrations::{ExtractionResult, GeocodeResult, Geocoder, Integrations, LlmRequest, UploadFile},
    models::{GeoPoint, User},
    AppState,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

pub const JWT_SECRET: &str = "integration-test-secret";
pub const SELLER: &str = "seller@example.com";
pub const BUYER: &str = "buyer@example.com";

/// Answers model calls by the first rule whose needle appears in the prompt.
#[derive(Default)]
pub struct StubIntegrations {
    rules: Mutex<Vec<(String, Value)>>,
    pub prompts: Mutex<Vec<String>>,
    pub functions: Mutex<Vec<(String, Value)>>,
    extraction: Mutex<Option<(String, Option<Value>)>>,
}

impl StubIntegrations {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn answer(&self, needle: &str, value: Value) {
        self.rules.lock().unwrap().push((needle.to_string(), value));
    }

    pub fn extraction(&self, status: &str, output: Option<Value>) {
        *self.extraction.lock().unwrap() = Some((status.to_string(), output));
    }

    pub fn prompts_containing(&self, needle: &str) -> usize {
        self.prompts.lock().unwrap().iter().filter(|p| p.contains(needle)).count()
    }

    pub fn function_calls(&self, name: &str) -> Vec<Value> {
        self.functions
            .lock()
            .unwrap()
            .iter()
            .filter(|(called, _)| called == name)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl Integrations for StubIntegrations {
    async fn upload_file(&self, file: UploadFile) -> Result<String> {
        Ok(format!("https://files.test/{}", file.file_name))
    }

    async fn invoke_llm(&self, request: LlmRequest) -> Result<Value> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        self.rules
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| request.prompt.contains(needle.as_str()))
            .map(|(_, value)| value.clone())
            .ok_or_else(|| anyhow!("No scripted answer for prompt"))
    }

    async fn extract_data(&self, _file_url: &str, _json_schema: Value) -> Result<ExtractionResult> {
        let (status, output) = self
            .extraction
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| ("error".to_string(), None));
        Ok(ExtractionResult {
            status,
            output,
            details: None,
        })
    }

    async fn generate_image(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(format!("https://images.test/{}.png", prompt.len()))
    }

    async fn invoke_function(&self, name: &str, payload: Value) -> Result<Value> {
        self.functions.lock().unwrap().push((name.to_string(), payload));
        Ok(json!({ "success": true }))
    }
}

/// Knows a fixed set of places.
#[derive(Default)]
pub struct StubGeocoder {
    places: HashMap<String, GeoPoint>,
}

impl StubGeocoder {
    pub fn with(places: &[(&str, f64, f64)]) -> Arc<Self> {
        Arc::new(Self {
            places: places
                .iter()
                .map(|(name, lat, lng)| (name.to_string(), GeoPoint { lat: *lat, lng: *lng }))
                .collect(),
        })
    }
}

#[async_trait]
impl Geocoder for StubGeocoder {
    async fn geocode(&self, city_state: &str) -> Result<Option<GeocodeResult>> {
        Ok(self.places.get(city_state).map(|point| GeocodeResult {
            point: *point,
            label: Some(city_state.to_string()),
        }))
    }

    async fn reverse(&self, point: GeoPoint) -> Result<Option<String>> {
        Ok(self
            .places
            .iter()
            .find(|(_, p)| **p == point)
            .map(|(name, _)| name.clone()))
    }
}

/// Every lookup errors, as when the geocoding function is down.
pub struct FailingGeocoder;

#[async_trait]
impl Geocoder for FailingGeocoder {
    async fn geocode(&self, _city_state: &str) -> Result<Option<GeocodeResult>> {
        Err(anyhow!("geocoding function unavailable"))
    }

    async fn reverse(&self, _point: GeoPoint) -> Result<Option<String>> {
        Err(anyhow!("geocoding function unavailable"))
    }
}

pub struct TestApp {
    pub state: AppState,
    pub data: Arc<MemoryDataService>,
    pub auth: Arc<MemoryAuthService>,
    pub integrations: Arc<StubIntegrations>,
}

pub fn settings() -> Settings {
    let mut settings = Settings::defaults().unwrap();
    settings.auth.jwt_secret = Some(JWT_SECRET.to_string());
    settings.auth.login_url = "https://login.test/login".to_string();
    settings.messaging.poll_interval_secs = 5;
    settings
}

pub fn test_app() -> TestApp {
    test_app_with_geocoder(StubGeocoder::with(&[
        ("Austin, TX", 30.2672, -97.7431),
        ("Dallas, TX", 32.7767, -96.797),
    ]))
}

pub fn test_app_with_geocoder(geocoder: Arc<dyn Geocoder>) -> TestApp {
    let data = Arc::new(MemoryDataService::new());
    let auth = Arc::new(MemoryAuthService::new("https://login.test/login"));
    let integrations = StubIntegrations::new();
    let state = AppState::with_services(settings(), data.clone(), auth.clone(), integrations.clone(), geocoder);
    TestApp {
        state,
        data,
        auth,
        integrations,
    }
}

/// HS256 session token for `email`, valid for an hour.
pub fn token_for(email: &str) -> String {
    let claims = Claims {
        sub: email.to_string(),
        email: Some(email.to_string()),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        iss: None,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

pub fn user(email: &str, name: &str) -> User {
    User {
        email: email.to_string(),
        full_name: Some(name.to_string()),
        ..Default::default()
    }
}

/// An active listing owned by `seller`.
pub async fn seed_vehicle(data: &MemoryDataService, id: &str, seller: &str, price: f64) -> Value {
    data.seed(
        EntityKind::Vehicle,
        json!({
            "id": id,
            "title": format!("2019 Honda Civic {}", id),
            "make": "Honda",
            "model": "Civic",
            "year": 2019,
            "price": price,
            "mileage": 42000,
            "condition": "good",
            "body_style": "sedan",
            "location": "Austin, TX",
            "status": "active",
            "created_by": seller,
            "images": ["https://files.test/front.jpg"],
        }),
    )
    .await
}
