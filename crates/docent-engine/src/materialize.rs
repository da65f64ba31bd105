//! Document materialization: storage bytes to active provider handles.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use docent_core::{defaults, DocumentRecord, DocumentStore, Result, UploadRecord, UploadStore};
use docent_gateway::{FileMetadata, FileState, ModelBackend};

use crate::preprocess::{is_image_mime, ImagePreprocessor, PROCESSED_MIME};

/// Materializes catalog documents as active provider file handles,
/// reusing the persisted upload cache where possible.
///
/// Concurrent `ensure` calls for the same `(project, identity)` are
/// coalesced on a per-key lock: the first caller uploads while the rest
/// wait, then find the fresh row on their double-checked cache lookup.
pub struct UploadMaterializer {
    store: Arc<dyn DocumentStore>,
    uploads: Arc<dyn UploadStore>,
    preprocessor: Arc<dyn ImagePreprocessor>,
    // Key locks live for the process lifetime; the map is bounded by
    // the number of distinct documents ever materialized.
    inflight: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
    poll_attempts: u32,
    poll_interval: Duration,
}

impl UploadMaterializer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        uploads: Arc<dyn UploadStore>,
        preprocessor: Arc<dyn ImagePreprocessor>,
    ) -> Self {
        Self {
            store,
            uploads,
            preprocessor,
            inflight: Mutex::new(HashMap::new()),
            poll_attempts: defaults::UPLOAD_POLL_ATTEMPTS,
            poll_interval: Duration::from_millis(defaults::UPLOAD_POLL_INTERVAL_MS),
        }
    }

    /// Override the active-state poll bounds. Intended for tests.
    pub fn with_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.poll_attempts = attempts;
        self.poll_interval = interval;
        self
    }

    async fn key_lock(&self, project: &str, identity: &str) -> Arc<Mutex<()>> {
        let mut inflight = self.inflight.lock().await;
        Arc::clone(
            inflight
                .entry((project.to_string(), identity.to_string()))
                .or_default(),
        )
    }

    /// Materialize one document, returning its active provider handle.
    ///
    /// `Ok(None)` is the soft-failure outcome: bytes missing from
    /// storage, upload rejected, or the handle never reaching the
    /// active state. The caller skips the document and continues.
    #[instrument(skip(self, backend, record), fields(subsystem = "materializer", project = %project, identity = %record.path))]
    pub async fn ensure(
        &self,
        backend: &dyn ModelBackend,
        project: &str,
        record: &DocumentRecord,
    ) -> Result<Option<FileMetadata>> {
        let identity = record.path.as_str();
        let key_lock = self.key_lock(project, identity).await;
        let _guard = key_lock.lock().await;

        // Double-checked under the key lock: a coalesced waiter sees the
        // row the first caller just upserted.
        if let Some(cached) = self.uploads.get(project, identity).await? {
            match backend.get_file(&cached.handle).await {
                Ok(meta) if meta.is_active() => {
                    debug!(handle = %cached.handle, "Cache hit; handle active");
                    return Ok(Some(meta));
                }
                Ok(meta) => {
                    warn!(handle = %cached.handle, state = ?meta.state, "Cached handle stale; re-uploading");
                }
                Err(e) => {
                    warn!(handle = %cached.handle, error = %e, "Cached handle probe failed; re-uploading");
                }
            }
        }

        if !self.store.exists(identity).await? {
            warn!("Document bytes missing from storage; skipping");
            return Ok(None);
        }
        let Some(bytes) = self.store.read(identity).await? else {
            warn!("Document bytes missing from storage; skipping");
            return Ok(None);
        };

        let mut mime = mime_for_path(identity).to_string();
        let bytes = if is_image_mime(&mime) {
            match self.preprocessor.process(&bytes) {
                Some(processed) => {
                    mime = PROCESSED_MIME.to_string();
                    processed
                }
                None => bytes,
            }
        } else {
            bytes
        };

        let mut meta = match backend.upload_file(bytes, &mime).await {
            Ok(meta) => meta,
            Err(e) => {
                warn!(error = %e, "Upload failed; skipping document");
                return Ok(None);
            }
        };

        for attempt in 0..self.poll_attempts {
            match meta.state {
                FileState::Active => {
                    self.uploads
                        .upsert(&UploadRecord {
                            project: project.to_string(),
                            identity: identity.to_string(),
                            handle: meta.name.clone(),
                            mime_type: meta.mime_type.clone(),
                            verified_at: Utc::now(),
                        })
                        .await?;
                    debug!(handle = %meta.name, attempt, "Upload active; cached");
                    return Ok(Some(meta));
                }
                FileState::Failed => {
                    warn!(handle = %meta.name, "Upload entered failed state; skipping document");
                    return Ok(None);
                }
                FileState::Pending => {}
            }

            tokio::time::sleep(self.poll_interval).await;
            meta = match backend.get_file(&meta.name).await {
                Ok(m) => m,
                Err(e) => {
                    warn!(handle = %meta.name, error = %e, "State probe failed; skipping document");
                    return Ok(None);
                }
            };
        }

        warn!(
            handle = %meta.name,
            attempts = self.poll_attempts,
            "Upload never became active; skipping document"
        );
        Ok(None)
    }
}

/// MIME type derived from a storage identity's extension.
pub fn mime_for_path(path: &str) -> &'static str {
    let ext = path
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "webp" => "image/webp",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        _ => "application/octet-stream",
    }
}
