//! Core data models for docent.
//!
//! These types are shared across all docent crates and represent the
//! domain entities of the Q&A pipeline: catalog records, request
//! context, answers, visual references, and stream events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// DOCUMENT TYPES
// =============================================================================

/// One entry in a project's document catalog.
///
/// `path` is the stable storage identity: it keys the upload cache and
/// is what `DocumentStore` resolves to bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: i64,
    /// Kind of data the document holds (e.g. "datasheet", "manual").
    pub kind: String,
    /// Display name shown to the routing model and in citations.
    pub name: String,
    /// Stable storage identity.
    pub path: String,
}

/// Persisted upload-cache row: one live provider handle per
/// `(project, identity)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub project: String,
    /// Storage identity of the source document (`DocumentRecord::path`).
    pub identity: String,
    /// Provider-side file handle (e.g. `files/abc123`).
    pub handle: String,
    pub mime_type: String,
    /// When the handle was last observed in the active state.
    pub verified_at: DateTime<Utc>,
}

// =============================================================================
// REQUEST TYPES
// =============================================================================

/// Answer style requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimaryMode {
    /// Short, simple, direct answers
    #[default]
    Basic,
    /// Detailed answers with supporting points and web grounding
    Research,
    /// Comparisons, evaluation, and reasoning
    Analytical,
    /// Deep expert-level answers with calculations
    Expert,
}

impl std::fmt::Display for PrimaryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Research => write!(f, "research"),
            Self::Analytical => write!(f, "analytical"),
            Self::Expert => write!(f, "expert"),
        }
    }
}

/// Structural answering mode, orthogonal to [`PrimaryMode`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvancedMode {
    /// Single-project answering
    #[default]
    None,
    /// Parent project plus related child projects
    CrossProject,
    /// Internal documents compared against a user-supplied external document
    Comparison,
}

impl std::fmt::Display for AdvancedMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::CrossProject => write!(f, "cross_project"),
            Self::Comparison => write!(f, "comparison"),
        }
    }
}

/// One prior question/answer exchange in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

impl ChatTurn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Immutable per-request input to the Q&A pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub question: String,
    pub project: String,
    #[serde(default)]
    pub primary_mode: PrimaryMode,
    #[serde(default)]
    pub advanced_mode: AdvancedMode,
    /// Comparison mode: external attachments, either `upload:<uuid>`
    /// coordinator bindings or already-materialized provider handles.
    #[serde(default)]
    pub selected_files: Vec<String>,
    #[serde(default)]
    pub chat_history: Vec<ChatTurn>,
    /// Cross-project mode: the first entry defines the parent project.
    #[serde(default)]
    pub related_projects: Vec<String>,
    #[serde(default)]
    pub want_visuals: bool,
    /// Conversation session for the final-turn append. Not part of the
    /// answer-cache fingerprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Uuid>,
}

impl RequestContext {
    /// A single-project basic request with no history or extras.
    pub fn new(project: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            project: project.into(),
            primary_mode: PrimaryMode::default(),
            advanced_mode: AdvancedMode::default(),
            selected_files: Vec::new(),
            chat_history: Vec::new(),
            related_projects: Vec::new(),
            want_visuals: false,
            session: None,
        }
    }
}

// =============================================================================
// ANSWER TYPES
// =============================================================================

/// Pages of one attachment worth rendering alongside the answer.
///
/// `pages` are zero-based. Non-PDF assets carry `[0]`, meaning the
/// whole asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualRef {
    /// Storage identity of the source document.
    pub file_path: String,
    pub pages: Vec<u32>,
}

/// A grounded answer produced by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    /// Display names of the documents that were attached.
    pub relevant_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub visuals: Vec<VisualRef>,
    /// Chain member that produced the text. Absent for fixed responses
    /// and cache hits recorded before the field existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// One frame of the streaming answer protocol.
///
/// Serialized as JSON with a `type` tag, e.g.
/// `{"type":"chunk","text":"..."}`. Every stream carries exactly one
/// terminal event (`done` or `error`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Incremental answer text.
    Chunk { text: String },
    /// Terminal success frame carrying the full answer.
    Done {
        answer: String,
        relevant_files: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        visuals: Vec<VisualRef>,
    },
    /// Terminal failure frame (stream never produced an answer).
    Error { message: String },
}

impl StreamEvent {
    /// True for the `done` and `error` frames that end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}
