//! Coordinator for user-supplied comparison documents.
//!
//! The upload starts in the background the moment the file arrives, so
//! by the time the question referencing it reaches the engine the
//! provider handle is usually already bound. `upload:<uuid>` entries in
//! a request's selected files route through here; anything else is
//! treated as an already-materialized provider handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use docent_core::{defaults, Error, Result};
use docent_gateway::{FileMetadata, FileState, ModelGateway};

/// Prefix marking a selected-file entry as a coordinator binding.
pub const UPLOAD_SCHEME: &str = "upload:";

/// Parse an `upload:<uuid>` selected-file entry.
pub fn parse_upload_ref(entry: &str) -> Option<Uuid> {
    entry
        .strip_prefix(UPLOAD_SCHEME)
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

enum Slot {
    /// Background upload still running; bytes retained for the
    /// synchronous fallback.
    Pending { bytes: Vec<u8>, mime_type: String },
    /// Upload complete and active.
    Bound(FileMetadata),
    Failed(String),
}

/// Bindings from upload ids to provider handles.
pub struct ComparisonUploads {
    slots: Arc<Mutex<HashMap<Uuid, Slot>>>,
    poll_attempts: u32,
    poll_interval: Duration,
}

impl ComparisonUploads {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            poll_attempts: defaults::BINDING_POLL_ATTEMPTS,
            poll_interval: Duration::from_millis(defaults::BINDING_POLL_INTERVAL_MS),
        }
    }

    /// Override the binding poll bounds. Intended for tests.
    pub fn with_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.poll_attempts = attempts;
        self.poll_interval = interval;
        self
    }

    /// Accept an external document and start its upload in the
    /// background. Returns the id the caller embeds as
    /// `upload:<uuid>` in a later request.
    #[instrument(skip(self, gateway, bytes), fields(subsystem = "comparison", byte_count = bytes.len()))]
    pub async fn register(
        &self,
        gateway: Arc<ModelGateway>,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.slots.lock().await.insert(
            id,
            Slot::Pending {
                bytes: bytes.clone(),
                mime_type: mime_type.to_string(),
            },
        );

        let slots = Arc::clone(&self.slots);
        let mime_type = mime_type.to_string();
        let attempts = self.poll_attempts;
        let interval = self.poll_interval;
        tokio::spawn(async move {
            let outcome = upload_and_activate(&gateway, bytes, &mime_type, attempts, interval).await;
            let mut slots = slots.lock().await;
            // A resolve call may have claimed the slot for its synchronous
            // fallback in the meantime; binding it again would strand an
            // entry nobody consumes.
            let Some(slot) = slots.get_mut(&id) else {
                debug!(%id, "Slot already claimed; discarding background result");
                return;
            };
            match outcome {
                Ok(meta) => {
                    debug!(%id, handle = %meta.name, "Comparison upload bound");
                    *slot = Slot::Bound(meta);
                }
                Err(e) => {
                    warn!(%id, error = %e, "Background comparison upload failed");
                    *slot = Slot::Failed(e.to_string());
                }
            }
        });

        id
    }

    /// Resolve an upload id to its active provider handle, consuming
    /// the slot.
    ///
    /// Waits for the background upload up to the poll bounds; if it is
    /// still pending afterwards the retained bytes are uploaded
    /// synchronously instead.
    #[instrument(skip(self, gateway), fields(subsystem = "comparison", %id))]
    pub async fn resolve(&self, gateway: &ModelGateway, id: Uuid) -> Result<FileMetadata> {
        for _ in 0..self.poll_attempts {
            {
                let mut slots = self.slots.lock().await;
                match slots.get(&id) {
                    Some(Slot::Bound(_)) => {
                        if let Some(Slot::Bound(meta)) = slots.remove(&id) {
                            return Ok(meta);
                        }
                    }
                    Some(Slot::Failed(_)) => {
                        let msg = match slots.remove(&id) {
                            Some(Slot::Failed(msg)) => msg,
                            _ => "upload failed".to_string(),
                        };
                        return Err(Error::Unavailable(format!(
                            "comparison upload {} failed: {}",
                            id, msg
                        )));
                    }
                    Some(Slot::Pending { .. }) => {}
                    None => {
                        return Err(Error::Unavailable(format!(
                            "unknown comparison upload {}",
                            id
                        )));
                    }
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        // Background task never bound the slot in time. Claim it by
        // removing it before the fallback upload, so a late background
        // result cannot re-insert an entry nobody will resolve again.
        let (bytes, mime_type) = {
            let mut slots = self.slots.lock().await;
            match slots.remove(&id) {
                Some(Slot::Pending { bytes, mime_type }) => (bytes, mime_type),
                // The background task resolved the slot while we gave
                // up waiting.
                Some(Slot::Bound(meta)) => return Ok(meta),
                Some(Slot::Failed(msg)) => {
                    return Err(Error::Unavailable(format!(
                        "comparison upload {} failed: {}",
                        id, msg
                    )));
                }
                None => {
                    return Err(Error::Unavailable(format!(
                        "unknown comparison upload {}",
                        id
                    )));
                }
            }
        };

        warn!(%id, "Background upload too slow; uploading synchronously");
        upload_and_activate(gateway, bytes, &mime_type, self.poll_attempts, self.poll_interval)
            .await
    }

    /// Number of unresolved slots.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }
}

impl Default for ComparisonUploads {
    fn default() -> Self {
        Self::new()
    }
}

/// Upload bytes and poll until the handle turns active.
async fn upload_and_activate(
    gateway: &ModelGateway,
    bytes: Vec<u8>,
    mime_type: &str,
    attempts: u32,
    interval: Duration,
) -> Result<FileMetadata> {
    let mut meta = gateway.upload_file(bytes, mime_type).await?;
    for _ in 0..attempts {
        match meta.state {
            FileState::Active => return Ok(meta),
            FileState::Failed => {
                return Err(Error::Unavailable(format!(
                    "upload {} entered failed state",
                    meta.name
                )));
            }
            FileState::Pending => {}
        }
        tokio::time::sleep(interval).await;
        meta = gateway.get_file(&meta.name).await?;
    }
    Err(Error::Unavailable(format!(
        "upload {} never became active",
        meta.name
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docent_gateway::mock::MockBackend;

    fn gateway(backend: Arc<MockBackend>) -> Arc<ModelGateway> {
        Arc::new(ModelGateway::new(backend))
    }

    fn coordinator() -> ComparisonUploads {
        ComparisonUploads::new().with_polling(20, Duration::from_millis(1))
    }

    #[test]
    fn test_parse_upload_ref() {
        let id = Uuid::new_v4();
        assert_eq!(parse_upload_ref(&format!("upload:{}", id)), Some(id));
        assert_eq!(parse_upload_ref("files/abc123"), None);
        assert_eq!(parse_upload_ref("upload:not-a-uuid"), None);
    }

    #[tokio::test]
    async fn test_register_then_resolve_uses_background_upload() {
        let backend = Arc::new(MockBackend::new());
        let gw = gateway(backend.clone());
        let coordinator = coordinator();

        let id = coordinator
            .register(Arc::clone(&gw), b"external pdf".to_vec(), "application/pdf")
            .await;
        let meta = coordinator.resolve(&gw, id).await.unwrap();

        assert!(meta.is_active());
        assert_eq!(backend.upload_count(), 1);
        // Slot consumed.
        assert_eq!(coordinator.len().await, 0);
    }

    #[tokio::test]
    async fn test_resolve_twice_fails_second_time() {
        let backend = Arc::new(MockBackend::new());
        let gw = gateway(backend);
        let coordinator = coordinator();

        let id = coordinator
            .register(Arc::clone(&gw), b"doc".to_vec(), "application/pdf")
            .await;
        coordinator.resolve(&gw, id).await.unwrap();

        let err = coordinator.resolve(&gw, id).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_unknown_id_is_unavailable() {
        let backend = Arc::new(MockBackend::new());
        let gw = gateway(backend);
        let coordinator = coordinator();

        let err = coordinator.resolve(&gw, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_pending_upload_waits_for_binding() {
        let backend = Arc::new(
            MockBackend::new()
                .with_upload_state(FileState::Pending)
                .with_activation_after(3),
        );
        let gw = gateway(backend.clone());
        let coordinator = coordinator();

        let id = coordinator
            .register(Arc::clone(&gw), b"doc".to_vec(), "application/pdf")
            .await;
        let meta = coordinator.resolve(&gw, id).await.unwrap();

        assert!(meta.is_active());
        assert_eq!(backend.upload_count(), 1);
    }

    #[tokio::test]
    async fn test_sync_fallback_claims_slot_from_background_task() {
        // Uploads that never activate force resolve into its synchronous
        // fallback. The fallback claims the slot; when the background
        // task finishes afterwards it must not re-insert the entry, or
        // the map would grow by one orphan per slow upload.
        let backend = Arc::new(
            MockBackend::new()
                .with_upload_state(FileState::Pending)
                .with_activation_after(1_000),
        );
        let gw = gateway(backend.clone());
        let coordinator = ComparisonUploads::new().with_polling(3, Duration::from_millis(1));

        let id = coordinator
            .register(Arc::clone(&gw), b"doc".to_vec(), "application/pdf")
            .await;
        let err = coordinator.resolve(&gw, id).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));

        // Wait out the background task; the claimed slot must stay gone.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(coordinator.len().await, 0);
    }

    #[tokio::test]
    async fn test_failed_background_upload_surfaces() {
        let backend = Arc::new(MockBackend::new().with_upload_state(FileState::Failed));
        let gw = gateway(backend);
        let coordinator = coordinator();

        let id = coordinator
            .register(Arc::clone(&gw), b"doc".to_vec(), "application/pdf")
            .await;
        let err = coordinator.resolve(&gw, id).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }
}
