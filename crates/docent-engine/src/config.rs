//! Engine tuning knobs.

use docent_core::defaults;

/// Engine configuration options.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Answer-cache capacity in entries; zero disables caching.
    pub answer_cache_capacity: usize,
    /// Maximum documents attached to one generation call.
    pub max_attachments: usize,
    /// Maximum file names the relevance router asks for.
    pub routing_max_files: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            answer_cache_capacity: defaults::ANSWER_CACHE_CAPACITY,
            max_attachments: defaults::MAX_ATTACHMENTS,
            routing_max_files: defaults::ROUTING_MAX_FILES,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read engine tuning from the environment.
    ///
    /// `DOCENT_ANSWER_CACHE_CAPACITY`, `DOCENT_MAX_ATTACHMENTS`, and
    /// `DOCENT_ROUTING_MAX_FILES` override the defaults when set to
    /// parseable values.
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(name: &str, default: T) -> T {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        let defaults = Self::default();
        Self {
            answer_cache_capacity: var(
                "DOCENT_ANSWER_CACHE_CAPACITY",
                defaults.answer_cache_capacity,
            ),
            max_attachments: var("DOCENT_MAX_ATTACHMENTS", defaults.max_attachments),
            routing_max_files: var("DOCENT_ROUTING_MAX_FILES", defaults.routing_max_files),
        }
    }

    /// Set the answer-cache capacity.
    pub fn answer_cache_capacity(mut self, capacity: usize) -> Self {
        self.answer_cache_capacity = capacity;
        self
    }

    /// Set the attachment limit.
    pub fn max_attachments(mut self, n: usize) -> Self {
        self.max_attachments = n;
        self
    }

    /// Set the routing file limit.
    pub fn routing_max_files(mut self, n: usize) -> Self {
        self.routing_max_files = n;
        self
    }
}
