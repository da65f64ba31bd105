//! # docent-gateway
//!
//! Model gateway for docent: the provider boundary and the fallback
//! orchestration above it.
//!
//! This crate provides:
//! - Provider boundary types (parts, generation config, file metadata)
//! - Pluggable [`ModelBackend`] trait with sync and streaming generation
//! - Gemini REST implementation (generate, SSE streaming, file upload,
//!   file-state probe, structured error classification)
//! - [`ModelGateway`]: ordered fallback chains over any backend, with
//!   non-retryable short-circuit and stream commitment
//! - [`mock::MockBackend`] for deterministic tests
//!
//! # Example
//!
//! ```rust,no_run
//! use docent_gateway::{ChainKind, GeminiClient, GenerationConfig, ModelGateway, Part};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> docent_core::Result<()> {
//!     let client = GeminiClient::from_env()?;
//!     let gateway = ModelGateway::new(Arc::new(client));
//!     let parts = vec![Part::text("Summarize the attached document.")];
//!     let config = GenerationConfig::with_max_output_tokens(256);
//!     let generation = gateway
//!         .generate(ChainKind::Answer, &parts, &config, &[])
//!         .await?;
//!     println!("{} said: {}", generation.model, generation.text);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod gateway;
pub mod gemini;
pub mod mock;
pub mod streaming;
pub mod types;

pub use backend::ModelBackend;
pub use gateway::ModelGateway;
pub use gemini::GeminiClient;
pub use streaming::{parse_sse_stream, TokenStream};
pub use types::{
    ChainKind, FileData, FileMetadata, FileState, Generation, GenerationConfig, Part, Tool,
};
