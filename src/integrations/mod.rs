//! External capabilities used by the marketplace: file upload, LLM invocation,
//! document extraction, image generation, backend functions and geocoding.
//!
//! Every capability is an opaque collaborator. Callers only rely on the shape
//! of the request and response, never on the quality of the answer.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

pub mod geocoding;
pub mod rest;

pub use geocoding::{CachedGeocoder, FunctionGeocoder, GeocodeResult, Geocoder};
pub use rest::RestIntegrations;

/// A structured-output model call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LlmRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_json_schema: Option<Value>,
    pub add_context_from_internet: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_urls: Vec<String>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.response_json_schema = Some(schema);
        self
    }

    pub fn with_internet_context(mut self) -> Self {
        self.add_context_from_internet = true;
        self
    }

    pub fn with_files(mut self, file_urls: Vec<String>) -> Self {
        self.file_urls = file_urls;
        self
    }
}

/// A file received from the client, ready to be uploaded.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionResult {
    pub status: String,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub details: Option<String>,
}

impl ExtractionResult {
    pub fn is_success(&self) -> bool {
        self.status == "success" && self.output.is_some()
    }
}

#[async_trait]
pub trait Integrations: Send + Sync {
    /// Uploads a file and returns its public URL.
    async fn upload_file(&self, file: UploadFile) -> Result<String>;

    /// Returns a JSON object when a schema was supplied, otherwise a JSON string.
    async fn invoke_llm(&self, request: LlmRequest) -> Result<Value>;

    async fn extract_data(&self, file_url: &str, json_schema: Value) -> Result<ExtractionResult>;

    async fn generate_image(&self, prompt: &str) -> Result<String>;

    /// Invokes a named server-side function hosted by the backend.
    async fn invoke_function(&self, name: &str, payload: Value) -> Result<Value>;
}

/// Calls the model and parses its structured answer into `T`.
pub async fn invoke_structured<T: DeserializeOwned>(
    integrations: &dyn Integrations,
    request: LlmRequest,
) -> Result<T> {
    let value = integrations.invoke_llm(request).await?;
    serde_json::from_value(value).context("Model response did not match the requested schema")
}

/// Calls the model for free text.
pub async fn invoke_text(integrations: &dyn Integrations, request: LlmRequest) -> Result<String> {
    let value = integrations.invoke_llm(request).await?;
    Ok(match value {
        Value::String(text) => text,
        other => other.to_string(),
    })
}
