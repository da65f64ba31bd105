//! # docent-core
//!
//! Core types, traits, and abstractions for the docent Q&A engine.
//!
//! This crate provides the foundational data structures, the error type,
//! and the boundary traits (document catalog, document store, conversation
//! store, upload-cache store) that the other docent crates depend on.

pub mod defaults;
pub mod error;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
