//! Centralized default constants for docent.
//!
//! **This module is the single source of truth** for all shared default
//! values. The other crates reference these constants instead of defining
//! their own magic numbers; anything env-tunable falls back to the value
//! here.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// MODEL CHAINS
// =============================================================================

/// Default fallback chain for cheap classification calls (routing,
/// visual-page extraction, chat titles). Ordered by preference.
pub const ROUTING_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.0-flash",
    "gemini-3-flash-preview",
];

/// Default fallback chain for answer generation. Ordered by preference.
pub const ANSWER_MODELS: &[&str] = &[
    "gemini-2.5-pro",
    "gemini-2.0-flash",
    "gemini-3-pro-preview",
];

// =============================================================================
// PROVIDER
// =============================================================================

/// Default Gemini API base URL.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// HTTP timeout for generation requests in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// ROUTING
// =============================================================================

/// Maximum file names the relevance router asks the model for.
pub const ROUTING_MAX_FILES: usize = 3;

/// Character budget for the catalog text handed to the routing model.
pub const CATALOG_TEXT_BUDGET: usize = 30_000;

/// Characters reserved off the head when the catalog text is truncated.
/// The head keeps `CATALOG_TEXT_BUDGET - CATALOG_HEAD_MARGIN` characters.
pub const CATALOG_HEAD_MARGIN: usize = 2_000;

/// Trailing characters of the original catalog text kept after the
/// `...` elision marker.
pub const CATALOG_TAIL_KEEP: usize = 1_000;

// =============================================================================
// ATTACHMENTS
// =============================================================================

/// Maximum documents attached to a single generation call.
pub const MAX_ATTACHMENTS: usize = 3;

// =============================================================================
// OUTPUT TOKEN CAPS
// =============================================================================

/// Output cap for answer generation.
pub const MAX_OUTPUT_TOKENS_ANSWER: u32 = 5000;

/// Output cap for routing classification.
pub const MAX_OUTPUT_TOKENS_ROUTING: u32 = 4000;

/// Output cap for visual-page extraction.
pub const MAX_OUTPUT_TOKENS_VISUALS: u32 = 300;

/// Output cap for chat-title generation.
pub const MAX_OUTPUT_TOKENS_TITLE: u32 = 100;

/// Output cap for document-description generation.
pub const MAX_OUTPUT_TOKENS_DESCRIPTION: u32 = 150;

// =============================================================================
// SUPPLEMENTAL GENERATION
// =============================================================================

/// Characters of the question forwarded to chat-title generation.
pub const TITLE_QUESTION_CLIP: usize = 500;

/// Word cap enforced on generated document descriptions.
pub const DESCRIPTION_MAX_WORDS: usize = 50;

// =============================================================================
// UPLOAD POLLING
// =============================================================================

/// Attempts when polling an upload for the active state.
pub const UPLOAD_POLL_ATTEMPTS: u32 = 15;

/// Interval between upload state polls in milliseconds.
pub const UPLOAD_POLL_INTERVAL_MS: u64 = 1000;

/// Attempts when polling a comparison-upload binding for completion.
pub const BINDING_POLL_ATTEMPTS: u32 = 30;

/// Interval between comparison-binding polls in milliseconds.
pub const BINDING_POLL_INTERVAL_MS: u64 = 500;

// =============================================================================
// ANSWER CACHE
// =============================================================================

/// Default answer-cache capacity (entries, LRU eviction).
pub const ANSWER_CACHE_CAPACITY: usize = 200;

/// Characters of the fingerprint shown in cache hit/miss debug logs.
pub const CACHE_KEY_LOG_PREFIX: usize = 12;

// =============================================================================
// FIXED RESPONSES
// =============================================================================

/// Returned without any model call when routing and materialization
/// produce zero attachments.
pub const MISSING_DOCUMENTS_ANSWER: &str = "Relevant documents missing. \
    I can only answer based on the documents available for this project.";

/// Returned when comparison mode finds no relevant internal documents
/// to compare the uploaded document against.
pub const COMPARISON_NO_INTERNAL_ANSWER: &str = "Comparison requires at \
    least one uploaded document and at least one relevant project document. \
    No relevant project documents were found for your question.";

/// Returned when fewer than two attachments survive the active-state
/// probe in comparison mode.
pub const COMPARISON_TOO_FEW_ANSWER: &str = "Please provide at least two \
    valid documents to compare (e.g. one uploaded file and project \
    documents).";
