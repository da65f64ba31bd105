//! Ordered fallback across model chains.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use docent_core::{defaults, Error, Result};

use crate::backend::ModelBackend;
use crate::gemini::GeminiClient;
use crate::streaming::TokenStream;
use crate::types::{ChainKind, FileMetadata, Generation, GenerationConfig, Part, Tool};

/// Walks a configured model chain until one model succeeds.
///
/// Two chains exist: a fast one for routing-style calls and a stronger
/// one for answer generation. A `NonRetryable` failure aborts the walk
/// immediately; any other failure moves on to the next model. When the
/// chain runs out the per-model failures are folded into one
/// `ChainExhausted` error. An empty chain never reaches a model and is
/// reported as `Config`.
pub struct ModelGateway {
    backend: Arc<dyn ModelBackend>,
    routing_models: Vec<String>,
    answer_models: Vec<String>,
}

impl ModelGateway {
    /// Create a gateway with the default chains.
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self::with_chains(
            backend,
            defaults::ROUTING_MODELS.iter().map(|s| s.to_string()).collect(),
            defaults::ANSWER_MODELS.iter().map(|s| s.to_string()).collect(),
        )
    }

    /// Create a gateway with explicit chains.
    pub fn with_chains(
        backend: Arc<dyn ModelBackend>,
        routing_models: Vec<String>,
        answer_models: Vec<String>,
    ) -> Self {
        Self {
            backend,
            routing_models,
            answer_models,
        }
    }

    /// Create a gateway over a Gemini backend configured from the
    /// environment.
    ///
    /// `DOCENT_ROUTING_MODELS` and `DOCENT_ANSWER_MODELS` override the
    /// default chains as comma-separated lists.
    pub fn from_env() -> Result<Self> {
        let backend = Arc::new(GeminiClient::from_env()?);
        Ok(Self::with_chains(
            backend,
            models_from_env("DOCENT_ROUTING_MODELS", defaults::ROUTING_MODELS),
            models_from_env("DOCENT_ANSWER_MODELS", defaults::ANSWER_MODELS),
        ))
    }

    /// The underlying backend, for file operations outside the chains.
    pub fn backend(&self) -> Arc<dyn ModelBackend> {
        Arc::clone(&self.backend)
    }

    /// Upload bytes to the provider. Pass-through; no chain involved.
    pub async fn upload_file(&self, bytes: Vec<u8>, mime_type: &str) -> Result<FileMetadata> {
        self.backend.upload_file(bytes, mime_type).await
    }

    /// Probe a provider file handle. Pass-through; no chain involved.
    pub async fn get_file(&self, handle: &str) -> Result<FileMetadata> {
        self.backend.get_file(handle).await
    }

    fn chain(&self, kind: ChainKind) -> &[String] {
        match kind {
            ChainKind::Routing => &self.routing_models,
            ChainKind::Answer => &self.answer_models,
        }
    }

    /// Generate a complete response, falling back along the chain.
    #[instrument(skip(self, parts, config, tools), fields(subsystem = "gateway", op = "generate", chain = %kind))]
    pub async fn generate(
        &self,
        kind: ChainKind,
        parts: &[Part],
        config: &GenerationConfig,
        tools: &[Tool],
    ) -> Result<Generation> {
        let chain = self.chain(kind);
        if chain.is_empty() {
            return Err(Error::Config("no models configured".to_string()));
        }

        let mut failures: Vec<String> = Vec::new();
        for model in chain {
            match self.backend.generate(model, parts, config, tools).await {
                Ok(generation) => {
                    if !failures.is_empty() {
                        info!(model = %model, skipped = failures.len(), "Fallback model succeeded");
                    }
                    return Ok(generation);
                }
                Err(Error::NonRetryable(msg)) => {
                    warn!(model = %model, error = %msg, "Non-retryable failure; aborting chain");
                    return Err(Error::NonRetryable(format!("{}: {}", model, msg)));
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "Model failed; trying next");
                    failures.push(format!("{}: {}", model, e));
                }
            }
        }

        Err(Error::ChainExhausted(failures.join("; ")))
    }

    /// Open a token stream, falling back along the chain.
    ///
    /// Fallback applies only to opening the stream. Once a model has
    /// started streaming the caller is committed to it; a mid-stream
    /// failure surfaces as an error item, never as a silent retry that
    /// would replay already-delivered text.
    #[instrument(skip(self, parts, config, tools), fields(subsystem = "gateway", op = "generate_stream", chain = %kind))]
    pub async fn generate_stream(
        &self,
        kind: ChainKind,
        parts: &[Part],
        config: &GenerationConfig,
        tools: &[Tool],
    ) -> Result<(String, TokenStream)> {
        let chain = self.chain(kind);
        if chain.is_empty() {
            return Err(Error::Config("no models configured".to_string()));
        }

        let mut failures: Vec<String> = Vec::new();
        for model in chain {
            match self
                .backend
                .generate_stream(model, parts, config, tools)
                .await
            {
                Ok(stream) => {
                    if !failures.is_empty() {
                        info!(model = %model, skipped = failures.len(), "Fallback model succeeded");
                    }
                    return Ok((model.clone(), stream));
                }
                Err(Error::NonRetryable(msg)) => {
                    warn!(model = %model, error = %msg, "Non-retryable failure; aborting chain");
                    return Err(Error::NonRetryable(format!("{}: {}", model, msg)));
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "Model failed; trying next");
                    failures.push(format!("{}: {}", model, e));
                }
            }
        }

        Err(Error::ChainExhausted(failures.join("; ")))
    }
}

fn models_from_env(var: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(var) {
        Ok(raw) => {
            let models: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if models.is_empty() {
                default.iter().map(|s| s.to_string()).collect()
            } else {
                models
            }
        }
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}
