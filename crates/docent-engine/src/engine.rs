//! The Q&A engine facade: routing, materialization, generation.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, instrument, warn};

use docent_core::{
    defaults, AdvancedMode, Answer, ChatTurn, ConversationStore, DocumentCatalog, DocumentRecord,
    DocumentStore, RequestContext, Result, StreamEvent, UploadStore,
};
use docent_gateway::{ChainKind, FileState, GenerationConfig, ModelGateway, Part};

use crate::answer_cache::AnswerCache;
use crate::comparison::{parse_upload_ref, ComparisonUploads};
use crate::config::EngineConfig;
use crate::materialize::UploadMaterializer;
use crate::preprocess::ContrastSharpen;
use crate::prompt::{
    assemble_answer, clean_breaks, description_prompt, title_prompt, DocRole, PromptDoc,
};
use crate::router::RelevanceRouter;
use crate::visuals::VisualExtractor;

/// One resolved attachment, ready for payload assembly and visuals.
struct Attachment {
    /// Storage identity for internal documents; the caller's selected
    /// entry for external ones.
    identity: String,
    display_name: String,
    /// Provider file handle.
    handle: String,
    doc: PromptDoc,
}

/// What request preparation produced.
enum Prepared {
    /// A fixed response; no generation happens.
    Fixed(Answer),
    /// Attachments for the answer chain.
    Ready(Vec<Attachment>),
}

/// Orchestrates one question through routing, materialization, the
/// answer chain, and visual extraction.
pub struct QnaEngine {
    gateway: Arc<ModelGateway>,
    catalog: Arc<dyn DocumentCatalog>,
    conversations: Arc<dyn ConversationStore>,
    materializer: Arc<UploadMaterializer>,
    comparisons: Arc<ComparisonUploads>,
    router: RelevanceRouter,
    visuals: VisualExtractor,
    cache: AnswerCache,
    config: EngineConfig,
}

impl QnaEngine {
    /// Engine with default tuning and the standard image preprocessor.
    pub fn new(
        gateway: Arc<ModelGateway>,
        catalog: Arc<dyn DocumentCatalog>,
        store: Arc<dyn DocumentStore>,
        uploads: Arc<dyn UploadStore>,
        conversations: Arc<dyn ConversationStore>,
    ) -> Self {
        Self::with_config(
            gateway,
            catalog,
            store,
            uploads,
            conversations,
            EngineConfig::default(),
        )
    }

    pub fn with_config(
        gateway: Arc<ModelGateway>,
        catalog: Arc<dyn DocumentCatalog>,
        store: Arc<dyn DocumentStore>,
        uploads: Arc<dyn UploadStore>,
        conversations: Arc<dyn ConversationStore>,
        config: EngineConfig,
    ) -> Self {
        let materializer = Arc::new(UploadMaterializer::new(
            store,
            uploads,
            Arc::new(ContrastSharpen::default()),
        ));
        Self {
            gateway,
            catalog,
            conversations,
            materializer,
            comparisons: Arc::new(ComparisonUploads::new()),
            router: RelevanceRouter::new(config.routing_max_files),
            visuals: VisualExtractor::new(config.max_attachments),
            cache: AnswerCache::new(config.answer_cache_capacity),
            config,
        }
    }

    /// Swap in a pre-built materializer (custom preprocessor or poll
    /// bounds).
    pub fn with_materializer(mut self, materializer: Arc<UploadMaterializer>) -> Self {
        self.materializer = materializer;
        self
    }

    /// Swap in a pre-built comparison coordinator.
    pub fn with_comparisons(mut self, comparisons: Arc<ComparisonUploads>) -> Self {
        self.comparisons = comparisons;
        self
    }

    /// Replace the answer cache, e.g. with [`AnswerCache::disabled`].
    pub fn with_cache(mut self, cache: AnswerCache) -> Self {
        self.cache = cache;
        self
    }

    /// The comparison-upload coordinator, for hosts accepting external
    /// documents ahead of the question.
    pub fn comparisons(&self) -> Arc<ComparisonUploads> {
        Arc::clone(&self.comparisons)
    }

    /// The model gateway this engine drives.
    pub fn gateway(&self) -> Arc<ModelGateway> {
        Arc::clone(&self.gateway)
    }

    // =========================================================================
    // SYNCHRONOUS ANSWERING
    // =========================================================================

    /// Answer a question in one shot.
    #[instrument(skip(self, ctx), fields(subsystem = "engine", op = "answer", project = %ctx.project, mode = %ctx.advanced_mode))]
    pub async fn answer(&self, ctx: &RequestContext) -> Result<Answer> {
        let key = AnswerCache::fingerprint(ctx);
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }

        let attachments = match self.prepare(ctx).await? {
            Prepared::Fixed(answer) => return Ok(answer),
            Prepared::Ready(attachments) => attachments,
        };

        let docs: Vec<PromptDoc> = attachments.iter().map(|a| a.doc.clone()).collect();
        let (parts, tools) = assemble_answer(
            &ctx.project,
            &ctx.question,
            ctx.primary_mode,
            &ctx.chat_history,
            &docs,
        );
        let config = GenerationConfig::with_max_output_tokens(defaults::MAX_OUTPUT_TOKENS_ANSWER);
        let generation = self
            .gateway
            .generate(ChainKind::Answer, &parts, &config, &tools)
            .await?;

        let visuals = if ctx.want_visuals && ctx.advanced_mode != AdvancedMode::Comparison {
            self.visuals
                .extract(&self.gateway, &internal_pairs(&attachments))
                .await
        } else {
            Vec::new()
        };

        let answer = Answer {
            answer: clean_breaks(&generation.text),
            relevant_files: attachments.iter().map(|a| a.display_name.clone()).collect(),
            visuals,
            model: Some(generation.model),
        };
        self.cache.put(&key, answer.clone()).await;
        self.append_turn(ctx, &answer.answer).await;

        info!(
            attachment_count = attachments.len(),
            visual_count = answer.visuals.len(),
            "Answer complete"
        );
        Ok(answer)
    }

    // =========================================================================
    // STREAMING ANSWERING
    // =========================================================================

    /// Answer a question as a stream of events. Every stream ends with
    /// exactly one terminal event.
    pub fn answer_stream(self: &Arc<Self>, ctx: RequestContext) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.run_stream(ctx, tx).await });
        ReceiverStream::new(rx)
    }

    #[instrument(skip(self, ctx, tx), fields(subsystem = "engine", op = "answer_stream", project = %ctx.project, mode = %ctx.advanced_mode))]
    async fn run_stream(&self, ctx: RequestContext, tx: mpsc::Sender<StreamEvent>) {
        let key = AnswerCache::fingerprint(&ctx);
        if let Some(hit) = self.cache.get(&key).await {
            let _ = tx
                .send(StreamEvent::Chunk {
                    text: hit.answer.clone(),
                })
                .await;
            let _ = tx
                .send(StreamEvent::Done {
                    answer: hit.answer,
                    relevant_files: hit.relevant_files,
                    visuals: hit.visuals,
                })
                .await;
            return;
        }

        let attachments = match self.prepare(&ctx).await {
            Ok(Prepared::Fixed(answer)) => {
                let _ = tx
                    .send(StreamEvent::Done {
                        answer: answer.answer,
                        relevant_files: answer.relevant_files,
                        visuals: answer.visuals,
                    })
                    .await;
                return;
            }
            Ok(Prepared::Ready(attachments)) => attachments,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        let docs: Vec<PromptDoc> = attachments.iter().map(|a| a.doc.clone()).collect();
        let (parts, tools) = assemble_answer(
            &ctx.project,
            &ctx.question,
            ctx.primary_mode,
            &ctx.chat_history,
            &docs,
        );
        let config = GenerationConfig::with_max_output_tokens(defaults::MAX_OUTPUT_TOKENS_ANSWER);

        let (model, mut stream) = match self
            .gateway
            .generate_stream(ChainKind::Answer, &parts, &config, &tools)
            .await
        {
            Ok(opened) => opened,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        let relevant_files: Vec<String> =
            attachments.iter().map(|a| a.display_name.clone()).collect();
        let mut accumulated = String::new();
        use tokio_stream::StreamExt;
        while let Some(item) = stream.next().await {
            match item {
                Ok(text) => {
                    accumulated.push_str(&text);
                    let _ = tx.send(StreamEvent::Chunk { text }).await;
                }
                Err(e) => {
                    // Committed to this model; keep the partial answer
                    // and close the stream instead of retracting it.
                    warn!(model = %model, error = %e, "Mid-stream failure; closing with partial answer");
                    let _ = tx
                        .send(StreamEvent::Done {
                            answer: format!("{}\n\nError: {}", accumulated, e),
                            relevant_files,
                            visuals: Vec::new(),
                        })
                        .await;
                    return;
                }
            }
        }

        let cleaned = clean_breaks(&accumulated);
        let visuals = if ctx.want_visuals && ctx.advanced_mode != AdvancedMode::Comparison {
            self.visuals
                .extract(&self.gateway, &internal_pairs(&attachments))
                .await
        } else {
            Vec::new()
        };

        let answer = Answer {
            answer: cleaned,
            relevant_files,
            visuals,
            model: Some(model),
        };
        self.cache.put(&key, answer.clone()).await;
        self.append_turn(&ctx, &answer.answer).await;

        let _ = tx
            .send(StreamEvent::Done {
                answer: answer.answer,
                relevant_files: answer.relevant_files,
                visuals: answer.visuals,
            })
            .await;
    }

    // =========================================================================
    // SUPPLEMENTAL OPERATIONS
    // =========================================================================

    /// Generate a short conversation title from the opening question.
    /// Any failure yields `None`; callers fall back to the raw question.
    #[instrument(skip(self, question), fields(subsystem = "engine", op = "chat_title"))]
    pub async fn chat_title(&self, question: &str) -> Option<String> {
        let parts = vec![Part::text(title_prompt(question))];
        let config = GenerationConfig::with_max_output_tokens(defaults::MAX_OUTPUT_TOKENS_TITLE);
        match self
            .gateway
            .generate(ChainKind::Routing, &parts, &config, &[])
            .await
        {
            Ok(generation) => {
                let title = clean_breaks(&generation.text).trim().to_string();
                if title.is_empty() {
                    None
                } else {
                    Some(title)
                }
            }
            Err(e) => {
                warn!(error = %e, "Title generation failed");
                None
            }
        }
    }

    /// Generate a short content description for a document that is not
    /// yet in any catalog. The upload is not cached.
    #[instrument(skip(self, bytes), fields(subsystem = "engine", op = "describe_document", byte_count = bytes.len()))]
    pub async fn describe_document(&self, bytes: Vec<u8>, mime_type: &str) -> Result<String> {
        let meta = self.upload_uncached(bytes, mime_type).await?;
        let parts = vec![
            Part::file(&meta.uri, &meta.mime_type),
            Part::text(description_prompt()),
        ];
        let config =
            GenerationConfig::with_max_output_tokens(defaults::MAX_OUTPUT_TOKENS_DESCRIPTION);
        let generation = self
            .gateway
            .generate(ChainKind::Answer, &parts, &config, &[])
            .await?;

        Ok(clean_breaks(&generation.text)
            .split_whitespace()
            .take(defaults::DESCRIPTION_MAX_WORDS)
            .collect::<Vec<_>>()
            .join(" "))
    }

    async fn upload_uncached(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<docent_gateway::FileMetadata> {
        let mut meta = self.gateway.upload_file(bytes, mime_type).await?;
        for _ in 0..defaults::UPLOAD_POLL_ATTEMPTS {
            match meta.state {
                FileState::Active => return Ok(meta),
                FileState::Failed => {
                    return Err(docent_core::Error::Unavailable(format!(
                        "upload {} entered failed state",
                        meta.name
                    )));
                }
                FileState::Pending => {}
            }
            tokio::time::sleep(std::time::Duration::from_millis(
                defaults::UPLOAD_POLL_INTERVAL_MS,
            ))
            .await;
            meta = self.gateway.get_file(&meta.name).await?;
        }
        Err(docent_core::Error::Unavailable(format!(
            "upload {} never became active",
            meta.name
        )))
    }

    // =========================================================================
    // REQUEST PREPARATION
    // =========================================================================

    async fn prepare(&self, ctx: &RequestContext) -> Result<Prepared> {
        match ctx.advanced_mode {
            AdvancedMode::None => self.prepare_single(ctx).await,
            AdvancedMode::CrossProject => self.prepare_cross_project(ctx).await,
            AdvancedMode::Comparison => self.prepare_comparison(ctx).await,
        }
    }

    async fn prepare_single(&self, ctx: &RequestContext) -> Result<Prepared> {
        let attachments = self
            .route_and_materialize(&ctx.project, &ctx.question, self.config.max_attachments)
            .await?;
        if attachments.is_empty() {
            debug!("No attachments resolved; returning fixed answer");
            return Ok(Prepared::Fixed(fixed_answer(
                defaults::MISSING_DOCUMENTS_ANSWER,
            )));
        }
        Ok(Prepared::Ready(
            attachments
                .into_iter()
                .map(|(record, meta)| Attachment {
                    identity: record.path.clone(),
                    display_name: record.name,
                    handle: meta.name.clone(),
                    doc: PromptDoc::new(&meta.uri, &meta.mime_type, DocRole::Plain),
                })
                .collect(),
        ))
    }

    async fn prepare_cross_project(&self, ctx: &RequestContext) -> Result<Prepared> {
        // The request's own project leads and is the parent; related
        // projects follow in caller order.
        let mut projects: Vec<&str> = vec![ctx.project.as_str()];
        for related in &ctx.related_projects {
            if !projects.contains(&related.as_str()) {
                projects.push(related);
            }
        }

        let mut collected: Vec<(String, DocumentRecord, docent_gateway::FileMetadata)> =
            Vec::new();
        let mut seen_identities: Vec<String> = Vec::new();
        for &project in &projects {
            if collected.len() >= self.config.max_attachments {
                break;
            }
            let remaining = self.config.max_attachments - collected.len();
            for (record, meta) in self
                .route_and_materialize(project, &ctx.question, remaining)
                .await?
            {
                if seen_identities.contains(&record.path) {
                    debug!(identity = %record.path, "Duplicate identity across projects; skipping");
                    continue;
                }
                seen_identities.push(record.path.clone());
                collected.push((project.to_string(), record, meta));
            }
        }

        if collected.is_empty() {
            return Ok(Prepared::Fixed(fixed_answer(
                defaults::MISSING_DOCUMENTS_ANSWER,
            )));
        }

        let contributing: Vec<&str> = {
            let mut projects_seen: Vec<&str> = Vec::new();
            for (project, _, _) in &collected {
                if !projects_seen.contains(&project.as_str()) {
                    projects_seen.push(project.as_str());
                }
            }
            projects_seen
        };
        let label = contributing.len() > 1;
        let parent = projects[0];

        Ok(Prepared::Ready(
            collected
                .into_iter()
                .map(|(project, record, meta)| {
                    let role = if !label {
                        DocRole::Plain
                    } else if project == parent {
                        DocRole::Parent(project.clone())
                    } else {
                        DocRole::Child(project.clone())
                    };
                    Attachment {
                        identity: record.path.clone(),
                        display_name: record.name,
                        handle: meta.name.clone(),
                        doc: PromptDoc::new(&meta.uri, &meta.mime_type, role),
                    }
                })
                .collect(),
        ))
    }

    async fn prepare_comparison(&self, ctx: &RequestContext) -> Result<Prepared> {
        let internal: Vec<Attachment> = self
            .route_and_materialize(&ctx.project, &ctx.question, self.config.max_attachments)
            .await?
            .into_iter()
            .map(|(record, meta)| Attachment {
                identity: record.path.clone(),
                display_name: record.name,
                handle: meta.name.clone(),
                doc: PromptDoc::new(&meta.uri, &meta.mime_type, DocRole::ComparisonInternal),
            })
            .collect();

        let mut external: Vec<Attachment> = Vec::new();
        for entry in &ctx.selected_files {
            let meta = match parse_upload_ref(entry) {
                Some(id) => match self.comparisons.resolve(&self.gateway, id).await {
                    Ok(meta) => meta,
                    Err(e) => {
                        warn!(entry = %entry, error = %e, "Comparison upload unavailable; skipping");
                        continue;
                    }
                },
                None => match self.gateway.get_file(entry).await {
                    Ok(meta) if meta.is_active() => meta,
                    Ok(meta) => {
                        warn!(entry = %entry, state = ?meta.state, "External handle not active; skipping");
                        continue;
                    }
                    Err(e) => {
                        warn!(entry = %entry, error = %e, "External handle probe failed; skipping");
                        continue;
                    }
                },
            };
            external.push(Attachment {
                identity: entry.clone(),
                display_name: meta
                    .display_name
                    .clone()
                    .unwrap_or_else(|| meta.name.clone()),
                handle: meta.name.clone(),
                doc: PromptDoc::new(&meta.uri, &meta.mime_type, DocRole::ComparisonExternal),
            });
        }

        if internal.is_empty() {
            debug!("No internal documents for comparison; returning fixed answer");
            return Ok(Prepared::Fixed(fixed_answer(
                defaults::COMPARISON_NO_INTERNAL_ANSWER,
            )));
        }
        if external.is_empty() || internal.len() + external.len() < 2 {
            debug!("Too few comparison attachments; returning fixed answer");
            return Ok(Prepared::Fixed(fixed_answer(
                defaults::COMPARISON_TOO_FEW_ANSWER,
            )));
        }

        let mut attachments = internal;
        attachments.extend(external);
        Ok(Prepared::Ready(attachments))
    }

    /// Route one project's catalog and materialize the matched records.
    async fn route_and_materialize(
        &self,
        project: &str,
        question: &str,
        cap: usize,
    ) -> Result<Vec<(DocumentRecord, docent_gateway::FileMetadata)>> {
        let records = self.catalog.list_documents(project).await?;
        let names = self
            .router
            .route(&self.gateway, project, question, &records)
            .await;
        let matched = match_records(&names, &records, cap);

        let backend = self.gateway.backend();
        let mut out = Vec::new();
        for record in matched {
            match self
                .materializer
                .ensure(backend.as_ref(), project, &record)
                .await?
            {
                Some(meta) => out.push((record, meta)),
                None => {
                    warn!(identity = %record.path, "Materialization skipped a routed document");
                }
            }
        }
        Ok(out)
    }

    async fn append_turn(&self, ctx: &RequestContext, answer: &str) {
        if let Some(session) = ctx.session {
            if let Err(e) = self
                .conversations
                .append(session, ChatTurn::new(&ctx.question, answer))
                .await
            {
                warn!(%session, error = %e, "Conversation append failed");
            }
        }
    }
}

/// `(identity, handle)` pairs for the internal attachments, the only
/// ones visual extraction considers.
fn internal_pairs(attachments: &[Attachment]) -> Vec<(String, String)> {
    attachments
        .iter()
        .filter(|a| a.doc.role != DocRole::ComparisonExternal)
        .map(|a| (a.identity.clone(), a.handle.clone()))
        .collect()
}

fn fixed_answer(text: &str) -> Answer {
    Answer {
        answer: text.to_string(),
        relevant_files: Vec::new(),
        visuals: Vec::new(),
        model: None,
    }
}

/// Match routed file names back to catalog records, case-insensitively
/// and by substring in either direction. First match wins per name;
/// identities are deduped and the result capped.
fn match_records(names: &[String], records: &[DocumentRecord], cap: usize) -> Vec<DocumentRecord> {
    let mut out: Vec<DocumentRecord> = Vec::new();
    for name in names {
        if out.len() >= cap {
            break;
        }
        let needle = name.to_lowercase();
        if needle.is_empty() {
            continue;
        }
        let matched = records.iter().find(|r| {
            let hay = r.name.to_lowercase();
            hay.contains(&needle) || needle.contains(&hay)
        });
        if let Some(record) = matched {
            if !out.iter().any(|r| r.path == record.path) {
                out.push(record.clone());
            }
        } else {
            debug!(name = %name, "Routed name matched no catalog record");
        }
    }
    out
}
