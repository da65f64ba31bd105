//! Pluggable model backend trait.

use async_trait::async_trait;

use docent_core::Result;

use crate::streaming::TokenStream;
use crate::types::{FileMetadata, Generation, GenerationConfig, Part, Tool};

/// Provider boundary: one concrete model endpoint plus its file store.
///
/// Implementations target a single provider; model selection and
/// fallback ordering live above this trait in
/// [`ModelGateway`](crate::ModelGateway). Error classification is the
/// backend's job: requests the provider rejects as invalid must surface
/// as [`docent_core::Error::NonRetryable`] so the gateway can stop
/// walking its chain.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Run one non-streaming generation against a specific model.
    async fn generate(
        &self,
        model: &str,
        parts: &[Part],
        config: &GenerationConfig,
        tools: &[Tool],
    ) -> Result<Generation>;

    /// Open a streaming generation against a specific model. The stream
    /// yields text deltas; transport and parse failures surface as
    /// `Err` items inside it.
    async fn generate_stream(
        &self,
        model: &str,
        parts: &[Part],
        config: &GenerationConfig,
        tools: &[Tool],
    ) -> Result<TokenStream>;

    /// Upload raw bytes, returning the provider file record. The record
    /// is often still pending; callers poll [`ModelBackend::get_file`]
    /// until it becomes active.
    async fn upload_file(&self, bytes: Vec<u8>, mime_type: &str) -> Result<FileMetadata>;

    /// Probe the current state of an uploaded file by handle.
    async fn get_file(&self, handle: &str) -> Result<FileMetadata>;
}
