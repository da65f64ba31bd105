//! LRU cache of completed answers, keyed by a request fingerprint.

use std::num::NonZeroUsize;

use lru::LruCache;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

use docent_core::{defaults, Answer, RequestContext};

/// In-process answer cache with LRU eviction.
///
/// The fingerprint covers every request field that shapes the answer;
/// the conversation session is deliberately excluded so the same
/// question asked in two sessions shares one entry.
pub struct AnswerCache {
    inner: Option<Mutex<LruCache<String, Answer>>>,
}

impl AnswerCache {
    /// Cache holding up to `capacity` answers. Zero capacity disables
    /// caching entirely.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|c| Mutex::new(LruCache::new(c))),
        }
    }

    /// A cache that stores nothing and never hits.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Deterministic fingerprint of the answer-shaping request fields.
    pub fn fingerprint(ctx: &RequestContext) -> String {
        let history: Vec<[&str; 2]> = ctx
            .chat_history
            .iter()
            .map(|t| [t.question.as_str(), t.answer.as_str()])
            .collect();
        // serde_json orders map keys, so the rendered shape is stable.
        let shape = serde_json::json!({
            "project": ctx.project,
            "question": ctx.question,
            "primary_mode": ctx.primary_mode.to_string(),
            "advanced_mode": ctx.advanced_mode.to_string(),
            "selected_files": ctx.selected_files,
            "chat_history": history,
            "related_projects": ctx.related_projects,
            "want_visuals": ctx.want_visuals,
        });
        hex::encode(Sha256::digest(shape.to_string().as_bytes()))
    }

    /// Look up a cached answer, marking it most recently used.
    pub async fn get(&self, key: &str) -> Option<Answer> {
        let inner = self.inner.as_ref()?;
        let hit = inner.lock().await.get(key).cloned();
        match &hit {
            Some(_) => debug!(key = %key_prefix(key), "Answer cache hit"),
            None => debug!(key = %key_prefix(key), "Answer cache miss"),
        }
        hit
    }

    /// Store an answer, evicting the least recently used entry when full.
    pub async fn put(&self, key: &str, answer: Answer) {
        if let Some(inner) = &self.inner {
            inner.lock().await.put(key.to_string(), answer);
            debug!(key = %key_prefix(key), "Answer cached");
        }
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        match &self.inner {
            Some(inner) => inner.lock().await.len(),
            None => 0,
        }
    }
}

impl Default for AnswerCache {
    fn default() -> Self {
        Self::new(defaults::ANSWER_CACHE_CAPACITY)
    }
}

fn key_prefix(key: &str) -> &str {
    &key[..key.len().min(defaults::CACHE_KEY_LOG_PREFIX)]
}
