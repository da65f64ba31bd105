//! Scripted in-memory backend for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use docent_core::{Error, Result};

use crate::backend::ModelBackend;
use crate::streaming::TokenStream;
use crate::types::{FileMetadata, FileState, Generation, GenerationConfig, Part, Tool};

/// One scripted result for a generate or stream call.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Successful generation with this text.
    Text(String),
    /// Failure the chain should retry past.
    Retryable(String),
    /// Failure the chain must abort on.
    NonRetryable(String),
    /// Stream that yields these chunks and ends cleanly.
    Stream(Vec<String>),
    /// Stream that yields these chunks and then an error item.
    FailingStream(Vec<String>, String),
}

/// Record of one backend call.
#[derive(Debug, Clone)]
pub enum MockCall {
    Generate { model: String, parts: Vec<Part> },
    GenerateStream { model: String, parts: Vec<Part> },
    UploadFile { mime_type: String, byte_count: usize },
    GetFile { handle: String },
}

/// In-memory `ModelBackend` with scripted outcomes and a call log.
///
/// Generate and stream calls consume the script front to back; once it
/// runs out every call succeeds with the default response. Uploaded
/// files land in an in-memory map that `get_file` serves back, so cache
/// probe and re-upload paths can be exercised without a network.
pub struct MockBackend {
    script: Mutex<VecDeque<MockOutcome>>,
    default_response: String,
    upload_state: FileState,
    pending_probes: Mutex<u32>,
    files: Mutex<HashMap<String, FileMetadata>>,
    upload_seq: Mutex<u64>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_response: "mock response".to_string(),
            upload_state: FileState::Active,
            pending_probes: Mutex::new(0),
            files: Mutex::new(HashMap::new()),
            upload_seq: Mutex::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful text outcome.
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.with_outcome(MockOutcome::Text(text.into()))
    }

    /// Queue an arbitrary outcome.
    pub fn with_outcome(self, outcome: MockOutcome) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    /// Queue a clean stream outcome.
    pub fn with_stream(self, chunks: Vec<&str>) -> Self {
        self.with_outcome(MockOutcome::Stream(
            chunks.into_iter().map(String::from).collect(),
        ))
    }

    /// Queue a stream that errors after the given chunks.
    pub fn with_failing_stream(self, chunks: Vec<&str>, error: impl Into<String>) -> Self {
        self.with_outcome(MockOutcome::FailingStream(
            chunks.into_iter().map(String::from).collect(),
            error.into(),
        ))
    }

    /// Response used after the script is exhausted.
    pub fn with_default_response(mut self, text: impl Into<String>) -> Self {
        self.default_response = text.into();
        self
    }

    /// State reported by `upload_file` (uploads still become probeable).
    pub fn with_upload_state(mut self, state: FileState) -> Self {
        self.upload_state = state;
        self
    }

    /// Make the next `n` probes report `Pending` before files turn
    /// `Active`.
    pub fn with_activation_after(self, n: u32) -> Self {
        *self.pending_probes.lock().unwrap() = n;
        self
    }

    /// Pre-seed a provider file, as if uploaded in an earlier session.
    pub fn with_file(self, meta: FileMetadata) -> Self {
        self.files.lock().unwrap().insert(meta.name.clone(), meta);
        self
    }

    // =========================================================================
    // Call log accessors
    // =========================================================================

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn generate_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::Generate { .. }))
            .count()
    }

    pub fn stream_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::GenerateStream { .. }))
            .count()
    }

    pub fn upload_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::UploadFile { .. }))
            .count()
    }

    pub fn get_file_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::GetFile { .. }))
            .count()
    }

    /// Models hit by generate and stream calls, in order.
    pub fn models_called(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                MockCall::Generate { model, .. } | MockCall::GenerateStream { model, .. } => {
                    Some(model.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Text parts of each generate call, joined per call.
    pub fn generate_prompts(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                MockCall::Generate { parts, .. } => Some(joined_text(parts)),
                _ => None,
            })
            .collect()
    }

    /// Parts of the most recent generate or stream call.
    pub fn last_parts(&self) -> Option<Vec<Part>> {
        self.calls().iter().rev().find_map(|c| match c {
            MockCall::Generate { parts, .. } | MockCall::GenerateStream { parts, .. } => {
                Some(parts.clone())
            }
            _ => None,
        })
    }

    /// Number of files the mock provider currently holds.
    pub fn stored_file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    fn next_outcome(&self) -> Option<MockOutcome> {
        self.script.lock().unwrap().pop_front()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn joined_text(parts: &[Part]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            Part::Text { text } => Some(text.as_str()),
            Part::File { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn stream_from(chunks: Vec<String>, fail: Option<String>) -> TokenStream {
    let mut items: Vec<Result<String>> = chunks.into_iter().map(Ok).collect();
    if let Some(msg) = fail {
        items.push(Err(Error::Model(format!("Stream error: {}", msg))));
    }
    Box::pin(futures::stream::iter(items))
}

#[async_trait]
impl ModelBackend for MockBackend {
    async fn generate(
        &self,
        model: &str,
        parts: &[Part],
        _config: &GenerationConfig,
        _tools: &[Tool],
    ) -> Result<Generation> {
        self.calls.lock().unwrap().push(MockCall::Generate {
            model: model.to_string(),
            parts: parts.to_vec(),
        });

        match self.next_outcome() {
            None => Ok(Generation {
                text: self.default_response.clone(),
                model: model.to_string(),
            }),
            Some(MockOutcome::Text(text)) => Ok(Generation {
                text,
                model: model.to_string(),
            }),
            Some(MockOutcome::Stream(chunks)) => Ok(Generation {
                text: chunks.concat(),
                model: model.to_string(),
            }),
            Some(MockOutcome::Retryable(msg)) => Err(Error::Model(msg)),
            Some(MockOutcome::NonRetryable(msg)) => Err(Error::NonRetryable(msg)),
            Some(MockOutcome::FailingStream(_, msg)) => Err(Error::Model(msg)),
        }
    }

    async fn generate_stream(
        &self,
        model: &str,
        parts: &[Part],
        _config: &GenerationConfig,
        _tools: &[Tool],
    ) -> Result<TokenStream> {
        self.calls.lock().unwrap().push(MockCall::GenerateStream {
            model: model.to_string(),
            parts: parts.to_vec(),
        });

        match self.next_outcome() {
            None => Ok(stream_from(vec![self.default_response.clone()], None)),
            Some(MockOutcome::Text(text)) => Ok(stream_from(vec![text], None)),
            Some(MockOutcome::Stream(chunks)) => Ok(stream_from(chunks, None)),
            Some(MockOutcome::FailingStream(chunks, msg)) => Ok(stream_from(chunks, Some(msg))),
            Some(MockOutcome::Retryable(msg)) => Err(Error::Model(msg)),
            Some(MockOutcome::NonRetryable(msg)) => Err(Error::NonRetryable(msg)),
        }
    }

    async fn upload_file(&self, bytes: Vec<u8>, mime_type: &str) -> Result<FileMetadata> {
        self.calls.lock().unwrap().push(MockCall::UploadFile {
            mime_type: mime_type.to_string(),
            byte_count: bytes.len(),
        });

        let mut seq = self.upload_seq.lock().unwrap();
        *seq += 1;
        let name = format!("files/mock-{}", *seq);
        let meta = FileMetadata {
            name: name.clone(),
            display_name: None,
            mime_type: mime_type.to_string(),
            uri: format!("https://mock.invalid/{}", name),
            state: FileState::Active,
        };
        self.files.lock().unwrap().insert(name, meta.clone());

        Ok(FileMetadata {
            state: self.upload_state,
            ..meta
        })
    }

    async fn get_file(&self, handle: &str) -> Result<FileMetadata> {
        self.calls.lock().unwrap().push(MockCall::GetFile {
            handle: handle.to_string(),
        });

        let meta = self
            .files
            .lock()
            .unwrap()
            .get(handle)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("file {}", handle)))?;

        let mut pending = self.pending_probes.lock().unwrap();
        if *pending > 0 {
            *pending -= 1;
            return Ok(FileMetadata {
                state: FileState::Pending,
                ..meta
            });
        }
        Ok(meta)
    }
}
