// HTTP implementation of the integration endpoints exposed by the hosted backend.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{ExtractionResult, Integrations, LlmRequest, UploadFile};
use crate::config::BackendSettings;

#[derive(Deserialize)]
struct UploadResponse {
    file_url: String,
}

#[derive(Deserialize)]
struct ImageResponse {
    url: String,
}

#[derive(Clone)]
pub struct RestIntegrations {
    http_client: Arc<Client>,
    base_url: String,
    app_id: String,
    api_key: Option<String>,
}

impl RestIntegrations {
    pub fn new(http_client: Arc<Client>, settings: &BackendSettings) -> Self {
        Self {
            http_client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            app_id: settings.app_id.clone(),
            api_key: settings.api_key.clone(),
        }
    }

    fn core_url(&self, endpoint: &str) -> String {
        format!(
            "{}/apps/{}/integration-endpoints/Core/{}",
            self.base_url, self.app_id, endpoint
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api_key", key),
            None => request,
        }
    }

    async fn post_json(&self, url: &str, payload: &Value) -> Result<Value> {
        let response = self
            .authorized(self.http_client.post(url))
            .json(payload)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to reach integration endpoint {}", url))?
            .error_for_status()?;

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }
}

#[async_trait]
impl Integrations for RestIntegrations {
    async fn upload_file(&self, file: UploadFile) -> Result<String> {
        let url = self.core_url("UploadFile");
        let size = file.bytes.len();
        let mut part = multipart::Part::bytes(file.bytes).file_name(file.file_name.clone());
        if let Some(content_type) = &file.content_type {
            part = part
                .mime_str(content_type)
                .with_context(|| format!("Invalid content type '{}'", content_type))?;
        }
        let form = multipart::Form::new().part("file", part);

        let response = self
            .authorized(self.http_client.post(&url))
            .multipart(form)
            .send()
            .await
            .context("Failed to reach upload endpoint")?
            .error_for_status()?;
        let uploaded: UploadResponse = response.json().await.context("Failed to parse upload response")?;

        tracing::info!(file = %file.file_name, size, url = %uploaded.file_url, "Uploaded file");
        Ok(uploaded.file_url)
    }

    async fn invoke_llm(&self, request: LlmRequest) -> Result<Value> {
        let url = self.core_url("InvokeLLM");
        tracing::debug!(
            prompt_len = request.prompt.len(),
            structured = request.response_json_schema.is_some(),
            files = request.file_urls.len(),
            "Invoking model"
        );
        let payload = serde_json::to_value(&request).context("Failed to serialize model request")?;
        self.post_json(&url, &payload).await
    }

    async fn extract_data(&self, file_url: &str, json_schema: Value) -> Result<ExtractionResult> {
        let url = self.core_url("ExtractDataFromUploadedFile");
        let payload = json!({
            "file_url": file_url,
            "json_schema": json_schema,
        });
        let value = self.post_json(&url, &payload).await?;
        serde_json::from_value(value).context("Failed to parse extraction response")
    }

    async fn generate_image(&self, prompt: &str) -> Result<String> {
        let url = self.core_url("GenerateImage");
        let value = self.post_json(&url, &json!({ "prompt": prompt })).await?;
        let image: ImageResponse = serde_json::from_value(value).context("Failed to parse image generation response")?;
        Ok(image.url)
    }

    async fn invoke_function(&self, name: &str, payload: Value) -> Result<Value> {
        if name.is_empty() {
            return Err(anyhow!("Function name must not be empty"));
        }
        let url = format!("{}/apps/{}/functions/{}", self.base_url, self.app_id, name);
        self.post_json(&url, &payload).await
    }
}
