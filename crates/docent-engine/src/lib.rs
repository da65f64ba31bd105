//! # docent-engine
//!
//! The Q&A orchestration engine for docent.
//!
//! This crate provides:
//! - [`QnaEngine`]: the facade that answers questions over a project's
//!   documents, synchronously or as a stream of events
//! - [`RelevanceRouter`]: catalog-based relevance classification
//! - [`UploadMaterializer`]: storage bytes to active provider handles,
//!   backed by the persisted upload cache and per-key coalescing
//! - [`VisualExtractor`]: which pages of an attachment to render
//! - [`AnswerCache`]: LRU cache of completed answers
//! - [`ComparisonUploads`]: coordinator for user-supplied comparison
//!   documents
//! - [`testing`]: in-memory boundary implementations for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docent_engine::{testing::TestWorld, QnaEngine};
//! use docent_gateway::ModelGateway;
//!
//! #[tokio::main]
//! async fn main() -> docent_core::Result<()> {
//!     let world = TestWorld::new();
//!     world
//!         .add_document("plant-a", "datasheet", "pump.pdf", b"%PDF-1.4 ...")
//!         .await;
//!     let gateway = Arc::new(ModelGateway::from_env()?);
//!     let engine = QnaEngine::new(
//!         gateway,
//!         world.catalog.clone(),
//!         world.store.clone(),
//!         world.uploads.clone(),
//!         world.conversations.clone(),
//!     );
//!     let ctx = docent_core::RequestContext::new("plant-a", "What is the rated flow?");
//!     let answer = engine.answer(&ctx).await?;
//!     println!("{}", answer.answer);
//!     Ok(())
//! }
//! ```

pub mod answer_cache;
pub mod comparison;
pub mod config;
pub mod engine;
pub mod materialize;
pub mod parse;
pub mod preprocess;
pub mod prompt;
pub mod router;
pub mod testing;
pub mod visuals;

pub use answer_cache::AnswerCache;
pub use comparison::{parse_upload_ref, ComparisonUploads, UPLOAD_SCHEME};
pub use config::EngineConfig;
pub use engine::QnaEngine;
pub use materialize::UploadMaterializer;
pub use preprocess::{ContrastSharpen, ImagePreprocessor, Passthrough, PROCESSED_MIME};
pub use prompt::{assemble_answer, clean_breaks, DocRole, PromptDoc};
pub use router::RelevanceRouter;
pub use visuals::VisualExtractor;
