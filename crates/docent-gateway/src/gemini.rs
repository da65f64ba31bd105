//! Gemini REST backend implementation.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use docent_core::{Error, Result};

use crate::backend::ModelBackend;
use crate::streaming::{parse_sse_stream, TokenStream};
use crate::types::{
    ApiErrorBody, Content, FileMetadata, GenerateContentRequest, GenerateContentResponse,
    Generation, GenerationConfig, Part, Tool, UploadResponse,
};

/// Default Gemini API endpoint.
pub const DEFAULT_BASE_URL: &str = docent_core::defaults::GEMINI_BASE_URL;

/// Default request timeout (seconds), applied to non-streaming calls.
pub const REQUEST_TIMEOUT_SECS: u64 = docent_core::defaults::REQUEST_TIMEOUT_SECS;

/// Gemini REST backend.
///
/// One instance serves every model in the configured chains; the model
/// id is a per-call argument.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

impl GeminiClient {
    /// Create a client against the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_config(
            DEFAULT_BASE_URL.to_string(),
            api_key.into(),
            REQUEST_TIMEOUT_SECS,
        )
    }

    /// Create a client with custom endpoint and timeout.
    pub fn with_config(base_url: String, api_key: String, timeout_secs: u64) -> Self {
        // No builder-level total timeout: it would cut off long SSE
        // streams. Non-streaming calls set a per-request timeout.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        info!(
            base_url = %base_url,
            timeout_secs,
            "Initializing Gemini backend"
        );

        Self {
            client,
            base_url,
            api_key,
            timeout_secs,
        }
    }

    /// Create from environment variables.
    ///
    /// `GEMINI_API_KEY` is required; `GEMINI_BASE_URL` and
    /// `DOCENT_TIMEOUT_SECS` override the defaults.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| Error::Config("GEMINI_API_KEY is not set".to_string()))?;
        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let timeout_secs = std::env::var("DOCENT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(REQUEST_TIMEOUT_SECS);

        Ok(Self::with_config(base_url, api_key, timeout_secs))
    }

    fn generate_url(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        )
    }

    fn file_url(&self, handle: &str) -> String {
        if handle.starts_with("files/") {
            format!("{}/v1beta/{}", self.base_url, handle)
        } else {
            format!("{}/v1beta/files/{}", self.base_url, handle)
        }
    }

    fn request_body(
        parts: &[Part],
        config: &GenerationConfig,
        tools: &[Tool],
    ) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::user(parts.to_vec())],
            generation_config: Some(config.clone()),
            tools: tools.to_vec(),
        }
    }
}

/// Map a non-success provider response to the error taxonomy.
///
/// HTTP 400 and provider status `INVALID_ARGUMENT` mean the request
/// itself is bad: no other chain member can succeed, so the result is
/// `NonRetryable`. Everything else stays retryable `Model`. The
/// structured body is preferred; the substring check only runs when the
/// body is not parseable JSON.
fn classify_failure(status: StatusCode, body: &str) -> Error {
    let parsed = serde_json::from_str::<ApiErrorBody>(body).ok();
    let (message, provider_status) = match &parsed {
        Some(b) => (b.error.message.clone(), b.error.status.clone()),
        None => (body.trim().to_string(), None),
    };

    let invalid_request = status == StatusCode::BAD_REQUEST
        || provider_status.as_deref() == Some("INVALID_ARGUMENT")
        || (parsed.is_none() && body.contains("INVALID_ARGUMENT"));

    let detail = if message.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status.as_u16(), message)
    };

    if invalid_request {
        Error::NonRetryable(detail)
    } else {
        Error::Model(detail)
    }
}

#[async_trait]
impl ModelBackend for GeminiClient {
    #[instrument(skip(self, parts, config, tools), fields(subsystem = "gateway", component = "gemini", op = "generate", model = %model, part_count = parts.len()))]
    async fn generate(
        &self,
        model: &str,
        parts: &[Part],
        config: &GenerationConfig,
        tools: &[Tool],
    ) -> Result<Generation> {
        let start = Instant::now();
        let request = Self::request_body(parts, config, tools);

        let response = self
            .client
            .post(self.generate_url(model))
            .header("x-goog-api-key", &self.api_key)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Model(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::Model(format!("Failed to parse response: {}", e)))?;

        if let Some(reason) = result.finish_reason() {
            if reason != "STOP" {
                warn!(finish_reason = reason, "Generation may be incomplete");
            }
        }

        let text = result
            .joined_text()
            .ok_or_else(|| Error::Model("Response carried no text".to_string()))?;

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            response_len = text.len(),
            duration_ms = elapsed,
            "Generation complete"
        );
        if elapsed > 30000 {
            warn!(duration_ms = elapsed, slow = true, "Slow generation call");
        }

        Ok(Generation {
            text,
            model: model.to_string(),
        })
    }

    #[instrument(skip(self, parts, config, tools), fields(subsystem = "gateway", component = "gemini", op = "stream", model = %model, part_count = parts.len()))]
    async fn generate_stream(
        &self,
        model: &str,
        parts: &[Part],
        config: &GenerationConfig,
        tools: &[Tool],
    ) -> Result<TokenStream> {
        let request = Self::request_body(parts, config, tools);

        let response = self
            .client
            .post(self.stream_url(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Model(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        debug!("Stream opened");
        Ok(parse_sse_stream(response.bytes_stream()))
    }

    #[instrument(skip(self, bytes), fields(subsystem = "gateway", component = "gemini", op = "upload_file", mime_type = %mime_type, byte_count = bytes.len()))]
    async fn upload_file(&self, bytes: Vec<u8>, mime_type: &str) -> Result<FileMetadata> {
        let response = self
            .client
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "raw")
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .timeout(Duration::from_secs(self.timeout_secs))
            .body(bytes)
            .send()
            .await
            .map_err(|e| Error::Model(format!("Upload request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let result: UploadResponse = response
            .json()
            .await
            .map_err(|e| Error::Model(format!("Failed to parse upload response: {}", e)))?;

        debug!(handle = %result.file.name, state = %result.file.state, "File uploaded");
        Ok(result.file)
    }

    async fn get_file(&self, handle: &str) -> Result<FileMetadata> {
        let response = self
            .client
            .get(self.file_url(handle))
            .header("x-goog-api-key", &self.api_key)
            .timeout(Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| Error::Model(format!("File probe failed: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("file {}", handle)));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let meta: FileMetadata = response
            .json()
            .await
            .map_err(|e| Error::Model(format!("Failed to parse file record: {}", e)))?;
        Ok(meta)
    }
}
