//! Core traits for docent abstractions.
//!
//! These traits define the seams between the Q&A engine and the host
//! application: document catalogs and stores, conversation history, and
//! the persisted upload cache. Concrete implementations are pluggable,
//! which keeps the engine testable with in-memory fakes.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{ChatTurn, DocumentRecord, UploadRecord};

// =============================================================================
// DOCUMENT CATALOG
// =============================================================================

/// Read-only listing of the documents registered for a project.
///
/// The engine never enumerates storage itself; the host application
/// owns document registration and exposes it through this trait.
#[async_trait]
pub trait DocumentCatalog: Send + Sync {
    /// List every document registered for a project, in catalog order.
    async fn list_documents(&self, project: &str) -> Result<Vec<DocumentRecord>>;
}

// =============================================================================
// DOCUMENT STORE
// =============================================================================

/// Binary document storage keyed by the stable storage identity.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Check whether a document's bytes are present.
    async fn exists(&self, identity: &str) -> Result<bool>;

    /// Read a document's bytes. `Ok(None)` when the identity is unknown.
    async fn read(&self, identity: &str) -> Result<Option<Vec<u8>>>;

    /// Store bytes under a project and name, returning the new identity.
    async fn write(&self, project: &str, name: &str, bytes: &[u8]) -> Result<String>;

    /// Remove a document's bytes.
    async fn delete(&self, identity: &str) -> Result<()>;
}

// =============================================================================
// CONVERSATION STORE
// =============================================================================

/// Ordered question/answer history scoped to a conversation session.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append one completed exchange to a session.
    async fn append(&self, session: Uuid, turn: ChatTurn) -> Result<()>;

    /// Fetch a session's exchanges in chronological order.
    async fn history(&self, session: Uuid) -> Result<Vec<ChatTurn>>;
}

// =============================================================================
// UPLOAD STORE
// =============================================================================

/// Persisted mapping from `(project, identity)` to the provider-side
/// file handle last known to be active.
///
/// At most one live row per key: `upsert` replaces in place rather than
/// accumulating duplicates for re-uploaded documents.
#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Look up the cached handle for a document.
    async fn get(&self, project: &str, identity: &str) -> Result<Option<UploadRecord>>;

    /// Insert or replace the cached handle for a document.
    async fn upsert(&self, record: &UploadRecord) -> Result<()>;

    /// Drop the cached handle for a document.
    async fn delete(&self, project: &str, identity: &str) -> Result<()>;
}
