//! In-memory implementations of the engine's boundary traits.
//!
//! Always compiled so integration tests (in `tests/`) and downstream
//! crates can exercise the engine without PostgreSQL or a filesystem.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docent_engine::testing::TestWorld;
//!
//! let world = TestWorld::new();
//! world.add_document("plant-a", "datasheet", "pump.pdf", b"%PDF-1.4 ...").await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use docent_core::{
    ChatTurn, DocumentCatalog, DocumentRecord, DocumentStore, ConversationStore, Result,
    UploadRecord, UploadStore,
};

// =============================================================================
// DOCUMENT CATALOG
// =============================================================================

/// In-memory [`DocumentCatalog`].
#[derive(Default)]
pub struct InMemoryCatalog {
    records: Mutex<HashMap<String, Vec<DocumentRecord>>>,
    next_id: Mutex<i64>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a catalog record, returning its assigned id.
    pub async fn add(&self, project: &str, kind: &str, name: &str, path: &str) -> i64 {
        let mut next_id = self.next_id.lock().await;
        *next_id += 1;
        let id = *next_id;
        self.records
            .lock()
            .await
            .entry(project.to_string())
            .or_default()
            .push(DocumentRecord {
                id,
                kind: kind.to_string(),
                name: name.to_string(),
                path: path.to_string(),
            });
        id
    }
}

#[async_trait]
impl DocumentCatalog for InMemoryCatalog {
    async fn list_documents(&self, project: &str) -> Result<Vec<DocumentRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .get(project)
            .cloned()
            .unwrap_or_default())
    }
}

// =============================================================================
// DOCUMENT STORE
// =============================================================================

/// In-memory [`DocumentStore`] keyed by storage identity.
#[derive(Default)]
pub struct InMemoryStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed bytes under an explicit identity.
    pub async fn put(&self, identity: &str, bytes: &[u8]) {
        self.files
            .lock()
            .await
            .insert(identity.to_string(), bytes.to_vec());
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn exists(&self, identity: &str) -> Result<bool> {
        Ok(self.files.lock().await.contains_key(identity))
    }

    async fn read(&self, identity: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.files.lock().await.get(identity).cloned())
    }

    async fn write(&self, project: &str, name: &str, bytes: &[u8]) -> Result<String> {
        let identity = format!("docs/{}/{}", project, name);
        self.put(&identity, bytes).await;
        Ok(identity)
    }

    async fn delete(&self, identity: &str) -> Result<()> {
        self.files.lock().await.remove(identity);
        Ok(())
    }
}

// =============================================================================
// CONVERSATION STORE
// =============================================================================

/// In-memory [`ConversationStore`].
#[derive(Default)]
pub struct InMemoryConversations {
    sessions: Mutex<HashMap<Uuid, Vec<ChatTurn>>>,
}

impl InMemoryConversations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total turns appended across all sessions.
    pub async fn turn_count(&self) -> usize {
        self.sessions.lock().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversations {
    async fn append(&self, session: Uuid, turn: ChatTurn) -> Result<()> {
        self.sessions
            .lock()
            .await
            .entry(session)
            .or_default()
            .push(turn);
        Ok(())
    }

    async fn history(&self, session: Uuid) -> Result<Vec<ChatTurn>> {
        Ok(self
            .sessions
            .lock()
            .await
            .get(&session)
            .cloned()
            .unwrap_or_default())
    }
}

// =============================================================================
// UPLOAD STORE
// =============================================================================

/// In-memory [`UploadStore`] with the same upsert-in-place semantics as
/// the PostgreSQL implementation.
#[derive(Default)]
pub struct InMemoryUploads {
    rows: Mutex<HashMap<(String, String), UploadRecord>>,
}

impl InMemoryUploads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live rows.
    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }
}

#[async_trait]
impl UploadStore for InMemoryUploads {
    async fn get(&self, project: &str, identity: &str) -> Result<Option<UploadRecord>> {
        Ok(self
            .rows
            .lock()
            .await
            .get(&(project.to_string(), identity.to_string()))
            .cloned())
    }

    async fn upsert(&self, record: &UploadRecord) -> Result<()> {
        self.rows.lock().await.insert(
            (record.project.clone(), record.identity.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn delete(&self, project: &str, identity: &str) -> Result<()> {
        self.rows
            .lock()
            .await
            .remove(&(project.to_string(), identity.to_string()));
        Ok(())
    }
}

// =============================================================================
// COMPOSED FIXTURE
// =============================================================================

/// All four in-memory boundaries wired together for engine tests.
pub struct TestWorld {
    pub catalog: Arc<InMemoryCatalog>,
    pub store: Arc<InMemoryStore>,
    pub uploads: Arc<InMemoryUploads>,
    pub conversations: Arc<InMemoryConversations>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            catalog: Arc::new(InMemoryCatalog::new()),
            store: Arc::new(InMemoryStore::new()),
            uploads: Arc::new(InMemoryUploads::new()),
            conversations: Arc::new(InMemoryConversations::new()),
        }
    }

    /// Register a document in the catalog and seed its bytes in the
    /// store under `docs/{project}/{name}`.
    pub async fn add_document(&self, project: &str, kind: &str, name: &str, bytes: &[u8]) -> String {
        let identity = format!("docs/{}/{}", project, name);
        self.catalog.add(project, kind, name, &identity).await;
        self.store.put(&identity, bytes).await;
        identity
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}
