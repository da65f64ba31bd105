//! End-to-end engine tests over the in-memory boundaries and the mock
//! backend.

use std::sync::Arc;

use tokio_stream::StreamExt;

use docent_core::{defaults, AdvancedMode, ConversationStore, Error, RequestContext, StreamEvent};
use docent_engine::testing::TestWorld;
use docent_engine::QnaEngine;
use docent_gateway::mock::{MockBackend, MockOutcome};
use docent_gateway::{FileMetadata, FileState, ModelGateway, Part};

fn engine(world: &TestWorld, backend: Arc<MockBackend>) -> QnaEngine {
    QnaEngine::new(
        Arc::new(ModelGateway::new(backend)),
        world.catalog.clone(),
        world.store.clone(),
        world.uploads.clone(),
        world.conversations.clone(),
    )
}

fn external_file(handle: &str, display_name: &str) -> FileMetadata {
    FileMetadata {
        name: handle.to_string(),
        display_name: Some(display_name.to_string()),
        mime_type: "application/pdf".to_string(),
        uri: format!("https://mock.invalid/{}", handle),
        state: FileState::Active,
    }
}

fn file_uris(parts: &[Part]) -> Vec<String> {
    parts
        .iter()
        .filter_map(|p| match p {
            Part::File { file_data } => Some(file_data.file_uri.clone()),
            _ => None,
        })
        .collect()
}

fn joined_text(parts: &[Part]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

async fn collect_events(
    engine: &Arc<QnaEngine>,
    ctx: RequestContext,
) -> Vec<StreamEvent> {
    let mut stream = engine.answer_stream(ctx);
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    events
}

fn terminal_count(events: &[StreamEvent]) -> usize {
    events.iter().filter(|e| e.is_terminal()).count()
}

// =============================================================================
// SINGLE-PROJECT ANSWERING
// =============================================================================

#[tokio::test]
async fn test_answer_end_to_end() {
    let world = TestWorld::new();
    world.add_document("plant-a", "datasheet", "pump.pdf", b"pdf").await;
    let backend = Arc::new(
        MockBackend::new()
            .with_response(r#"["pump.pdf"]"#)
            .with_response("The rated flow is 120 m3/h."),
    );
    let engine = engine(&world, backend.clone());

    let ctx = RequestContext::new("plant-a", "What is the rated flow?");
    let answer = engine.answer(&ctx).await.unwrap();

    assert_eq!(answer.answer, "The rated flow is 120 m3/h.");
    assert_eq!(answer.relevant_files, vec!["pump.pdf"]);
    assert_eq!(answer.model.as_deref(), Some("gemini-2.5-pro"));
    assert!(answer.visuals.is_empty());
    // One routing call, one answer call, one upload, one cached row.
    assert_eq!(backend.generate_count(), 2);
    assert_eq!(backend.upload_count(), 1);
    assert_eq!(world.uploads.len().await, 1);
}

#[tokio::test]
async fn test_answer_cleans_break_tags() {
    let world = TestWorld::new();
    world.add_document("plant-a", "datasheet", "pump.pdf", b"pdf").await;
    let backend = Arc::new(
        MockBackend::new()
            .with_response(r#"["pump.pdf"]"#)
            .with_response("line one<br>line two<br/>line three"),
    );
    let engine = engine(&world, backend);

    let answer = engine
        .answer(&RequestContext::new("plant-a", "q"))
        .await
        .unwrap();
    assert_eq!(answer.answer, "line one\nline two\nline three");
}

#[tokio::test]
async fn test_cache_hit_skips_every_collaborator() {
    let world = TestWorld::new();
    world.add_document("plant-a", "datasheet", "pump.pdf", b"pdf").await;
    let backend = Arc::new(
        MockBackend::new()
            .with_response(r#"["pump.pdf"]"#)
            .with_response("answer text"),
    );
    let engine = engine(&world, backend.clone());
    let ctx = RequestContext::new("plant-a", "What is the rated flow?");

    let first = engine.answer(&ctx).await.unwrap();
    let second = engine.answer(&ctx).await.unwrap();

    assert_eq!(first, second);
    // No additional model, upload, or probe traffic for the hit.
    assert_eq!(backend.generate_count(), 2);
    assert_eq!(backend.upload_count(), 1);
}

#[tokio::test]
async fn test_empty_catalog_fixed_answer_zero_calls() {
    let world = TestWorld::new();
    let backend = Arc::new(MockBackend::new());
    let engine = engine(&world, backend.clone());

    let answer = engine
        .answer(&RequestContext::new("plant-a", "anything"))
        .await
        .unwrap();

    assert_eq!(answer.answer, defaults::MISSING_DOCUMENTS_ANSWER);
    assert!(answer.relevant_files.is_empty());
    assert!(answer.model.is_none());
    assert_eq!(backend.generate_count(), 0);
    assert_eq!(backend.upload_count(), 0);
}

#[tokio::test]
async fn test_routing_no_match_fixed_answer_without_answer_call() {
    let world = TestWorld::new();
    world.add_document("plant-a", "datasheet", "pump.pdf", b"pdf").await;
    let backend = Arc::new(MockBackend::new().with_response("[]"));
    let engine = engine(&world, backend.clone());

    let answer = engine
        .answer(&RequestContext::new("plant-a", "unrelated question"))
        .await
        .unwrap();

    assert_eq!(answer.answer, defaults::MISSING_DOCUMENTS_ANSWER);
    // Only the routing call happened.
    assert_eq!(backend.generate_count(), 1);
}

#[tokio::test]
async fn test_non_retryable_answer_failure_propagates() {
    let world = TestWorld::new();
    world.add_document("plant-a", "datasheet", "pump.pdf", b"pdf").await;
    let backend = Arc::new(
        MockBackend::new()
            .with_response(r#"["pump.pdf"]"#)
            .with_outcome(MockOutcome::NonRetryable("prompt too large".to_string())),
    );
    let engine = engine(&world, backend.clone());

    let err = engine
        .answer(&RequestContext::new("plant-a", "q"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NonRetryable(_)));
    // Routing plus exactly one answer attempt; no fallback after the abort.
    assert_eq!(backend.generate_count(), 2);
}

#[tokio::test]
async fn test_session_append_records_final_turn() {
    let world = TestWorld::new();
    world.add_document("plant-a", "datasheet", "pump.pdf", b"pdf").await;
    let backend = Arc::new(
        MockBackend::new()
            .with_response(r#"["pump.pdf"]"#)
            .with_response("answer text"),
    );
    let engine = engine(&world, backend);

    let mut ctx = RequestContext::new("plant-a", "What is the rated flow?");
    let session = uuid::Uuid::new_v4();
    ctx.session = Some(session);
    engine.answer(&ctx).await.unwrap();

    let history = world.conversations.history(session).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].question, "What is the rated flow?");
    assert_eq!(history[0].answer, "answer text");
}

// =============================================================================
// VISUALS
// =============================================================================

#[tokio::test]
async fn test_visual_pages_surface_zero_based() {
    let world = TestWorld::new();
    let identity = world.add_document("plant-a", "drawing", "pid.pdf", b"pdf").await;
    let backend = Arc::new(
        MockBackend::new()
            .with_response(r#"["pid.pdf"]"#)
            .with_response("answer text")
            .with_response("[1, 3]"),
    );
    let engine = engine(&world, backend);

    let mut ctx = RequestContext::new("plant-a", "show me the loop");
    ctx.want_visuals = true;
    let answer = engine.answer(&ctx).await.unwrap();

    assert_eq!(answer.visuals.len(), 1);
    assert_eq!(answer.visuals[0].file_path, identity);
    assert_eq!(answer.visuals[0].pages, vec![0, 2]);
}

#[tokio::test]
async fn test_visuals_not_requested_not_extracted() {
    let world = TestWorld::new();
    world.add_document("plant-a", "drawing", "pid.pdf", b"pdf").await;
    let backend = Arc::new(
        MockBackend::new()
            .with_response(r#"["pid.pdf"]"#)
            .with_response("answer text"),
    );
    let engine = engine(&world, backend.clone());

    let answer = engine
        .answer(&RequestContext::new("plant-a", "q"))
        .await
        .unwrap();
    assert!(answer.visuals.is_empty());
    assert_eq!(backend.generate_count(), 2);
}

// =============================================================================
// COMPARISON MODE
// =============================================================================

#[tokio::test]
async fn test_comparison_internal_documents_precede_external() {
    let world = TestWorld::new();
    world.add_document("plant-a", "datasheet", "pump.pdf", b"pdf").await;
    let backend = Arc::new(
        MockBackend::new()
            .with_file(external_file("files/vendor", "vendor.pdf"))
            .with_response(r#"["pump.pdf"]"#)
            .with_response("comparison text"),
    );
    let engine = engine(&world, backend.clone());

    let mut ctx = RequestContext::new("plant-a", "does the vendor sheet match?");
    ctx.advanced_mode = AdvancedMode::Comparison;
    ctx.selected_files = vec!["files/vendor".to_string()];
    let answer = engine.answer(&ctx).await.unwrap();

    assert_eq!(answer.answer, "comparison text");
    assert_eq!(answer.relevant_files, vec!["pump.pdf", "vendor.pdf"]);

    let parts = backend.last_parts().unwrap();
    let uris = file_uris(&parts);
    assert_eq!(uris.len(), 2);
    // The internal attachment (a fresh mock upload) comes first.
    assert!(uris[0].contains("files/mock-"));
    assert!(uris[1].ends_with("files/vendor"));
    let text = joined_text(&parts);
    assert!(text.contains("--- BEGIN INTERNAL AUTHORITATIVE DOCUMENT ---"));
    assert!(text.contains("--- BEGIN USER EXTERNAL DOCUMENT FOR COMPARISON ---"));
    assert!(text.contains("1. Uploaded Document Summary"));
}

#[tokio::test]
async fn test_comparison_without_internal_documents_is_guided() {
    let world = TestWorld::new();
    let backend = Arc::new(
        MockBackend::new().with_file(external_file("files/vendor", "vendor.pdf")),
    );
    let engine = engine(&world, backend.clone());

    let mut ctx = RequestContext::new("plant-a", "compare this");
    ctx.advanced_mode = AdvancedMode::Comparison;
    ctx.selected_files = vec!["files/vendor".to_string()];
    let answer = engine.answer(&ctx).await.unwrap();

    assert_eq!(answer.answer, defaults::COMPARISON_NO_INTERNAL_ANSWER);
    assert_eq!(backend.generate_count(), 0);
}

#[tokio::test]
async fn test_comparison_without_external_documents_is_guided() {
    let world = TestWorld::new();
    world.add_document("plant-a", "datasheet", "pump.pdf", b"pdf").await;
    let backend = Arc::new(MockBackend::new().with_response(r#"["pump.pdf"]"#));
    let engine = engine(&world, backend.clone());

    let mut ctx = RequestContext::new("plant-a", "compare this");
    ctx.advanced_mode = AdvancedMode::Comparison;
    let answer = engine.answer(&ctx).await.unwrap();

    assert_eq!(answer.answer, defaults::COMPARISON_TOO_FEW_ANSWER);
    // Routing ran; no answer call followed.
    assert_eq!(backend.generate_count(), 1);
}

#[tokio::test]
async fn test_comparison_skips_visual_extraction() {
    let world = TestWorld::new();
    world.add_document("plant-a", "datasheet", "pump.pdf", b"pdf").await;
    let backend = Arc::new(
        MockBackend::new()
            .with_file(external_file("files/vendor", "vendor.pdf"))
            .with_response(r#"["pump.pdf"]"#)
            .with_response("comparison text"),
    );
    let engine = engine(&world, backend.clone());

    let mut ctx = RequestContext::new("plant-a", "compare this");
    ctx.advanced_mode = AdvancedMode::Comparison;
    ctx.selected_files = vec!["files/vendor".to_string()];
    ctx.want_visuals = true;
    let answer = engine.answer(&ctx).await.unwrap();

    assert!(answer.visuals.is_empty());
    // Routing plus answer only; no visual classification call.
    assert_eq!(backend.generate_count(), 2);
}

#[tokio::test]
async fn test_comparison_via_registered_upload() {
    let world = TestWorld::new();
    world.add_document("plant-a", "datasheet", "pump.pdf", b"pdf").await;
    let backend = Arc::new(
        MockBackend::new()
            .with_response(r#"["pump.pdf"]"#)
            .with_response("comparison text"),
    );
    let engine = Arc::new(engine(&world, backend.clone()));

    let id = engine
        .comparisons()
        .register(engine.gateway(), b"vendor bytes".to_vec(), "application/pdf")
        .await;

    let mut ctx = RequestContext::new("plant-a", "compare this");
    ctx.advanced_mode = AdvancedMode::Comparison;
    ctx.selected_files = vec![format!("upload:{}", id)];
    let answer = engine.answer(&ctx).await.unwrap();

    assert_eq!(answer.answer, "comparison text");
    assert_eq!(answer.relevant_files.len(), 2);
    // Internal document plus the coordinator's background upload.
    assert_eq!(backend.upload_count(), 2);
}

// =============================================================================
// CROSS-PROJECT MODE
// =============================================================================

#[tokio::test]
async fn test_cross_project_labels_parent_and_child() {
    let world = TestWorld::new();
    world.add_document("plant-a", "datasheet", "alpha.pdf", b"pdf").await;
    world.add_document("plant-b", "datasheet", "beta.pdf", b"pdf").await;
    let backend = Arc::new(
        MockBackend::new()
            .with_response(r#"["alpha.pdf"]"#)
            .with_response(r#"["beta.pdf"]"#)
            .with_response("cross-project answer"),
    );
    let engine = engine(&world, backend.clone());

    let mut ctx = RequestContext::new("plant-a", "how do the units interconnect?");
    ctx.advanced_mode = AdvancedMode::CrossProject;
    ctx.related_projects = vec!["plant-b".to_string()];
    let answer = engine.answer(&ctx).await.unwrap();

    assert_eq!(answer.relevant_files, vec!["alpha.pdf", "beta.pdf"]);
    let text = joined_text(&backend.last_parts().unwrap());
    assert!(text.contains("--- BEGIN PARENT PROJECT DOCUMENT: plant-a ---"));
    assert!(text.contains("--- BEGIN CHILD PROJECT DOCUMENT: plant-b ---"));
    assert!(text.contains("PROJECT HIERARCHY:"));
}

#[tokio::test]
async fn test_cross_project_single_contributor_stays_unlabeled() {
    let world = TestWorld::new();
    world.add_document("plant-a", "datasheet", "alpha.pdf", b"pdf").await;
    // plant-b has no catalog at all.
    let backend = Arc::new(
        MockBackend::new()
            .with_response(r#"["alpha.pdf"]"#)
            .with_response("single-source answer"),
    );
    let engine = engine(&world, backend.clone());

    let mut ctx = RequestContext::new("plant-a", "q");
    ctx.advanced_mode = AdvancedMode::CrossProject;
    ctx.related_projects = vec!["plant-b".to_string()];
    let answer = engine.answer(&ctx).await.unwrap();

    assert_eq!(answer.relevant_files, vec!["alpha.pdf"]);
    let text = joined_text(&backend.last_parts().unwrap());
    assert!(!text.contains("PROJECT HIERARCHY"));
    assert!(!text.contains("PARENT PROJECT DOCUMENT"));
}

#[tokio::test]
async fn test_cross_project_dedups_shared_identities() {
    let world = TestWorld::new();
    let identity = world.add_document("plant-a", "datasheet", "alpha.pdf", b"pdf").await;
    // plant-b's catalog references the same stored document.
    world.catalog.add("plant-b", "datasheet", "alpha.pdf", &identity).await;
    let backend = Arc::new(
        MockBackend::new()
            .with_response(r#"["alpha.pdf"]"#)
            .with_response(r#"["alpha.pdf"]"#)
            .with_response("deduped answer"),
    );
    let engine = engine(&world, backend.clone());

    let mut ctx = RequestContext::new("plant-a", "q");
    ctx.advanced_mode = AdvancedMode::CrossProject;
    ctx.related_projects = vec!["plant-b".to_string()];
    let answer = engine.answer(&ctx).await.unwrap();

    assert_eq!(answer.relevant_files, vec!["alpha.pdf"]);
    assert_eq!(backend.upload_count(), 1);
}

// =============================================================================
// STREAMING
// =============================================================================

#[tokio::test]
async fn test_stream_chunks_then_done() {
    let world = TestWorld::new();
    world.add_document("plant-a", "datasheet", "pump.pdf", b"pdf").await;
    let backend = Arc::new(
        MockBackend::new()
            .with_response(r#"["pump.pdf"]"#)
            .with_stream(vec!["The rated ", "flow is 120 m3/h."]),
    );
    let engine = Arc::new(engine(&world, backend));

    let events = collect_events(&engine, RequestContext::new("plant-a", "q")).await;

    assert_eq!(terminal_count(&events), 1);
    assert!(matches!(
        &events[0],
        StreamEvent::Chunk { text } if text == "The rated "
    ));
    match events.last().unwrap() {
        StreamEvent::Done {
            answer,
            relevant_files,
            ..
        } => {
            assert_eq!(answer, "The rated flow is 120 m3/h.");
            assert_eq!(relevant_files, &vec!["pump.pdf".to_string()]);
        }
        other => panic!("expected done, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stream_success_populates_cache() {
    let world = TestWorld::new();
    world.add_document("plant-a", "datasheet", "pump.pdf", b"pdf").await;
    let backend = Arc::new(
        MockBackend::new()
            .with_response(r#"["pump.pdf"]"#)
            .with_stream(vec!["answer text"]),
    );
    let engine = Arc::new(engine(&world, backend.clone()));
    let ctx = RequestContext::new("plant-a", "q");

    collect_events(&engine, ctx.clone()).await;
    let events = collect_events(&engine, ctx).await;

    // The second stream is served from cache: one full chunk, one done,
    // and no new backend traffic.
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        StreamEvent::Chunk { text } if text == "answer text"
    ));
    assert!(matches!(events[1], StreamEvent::Done { .. }));
    assert_eq!(backend.stream_count(), 1);
    assert_eq!(backend.generate_count(), 1);
}

#[tokio::test]
async fn test_stream_midfailure_keeps_partial_and_skips_cache() {
    let world = TestWorld::new();
    world.add_document("plant-a", "datasheet", "pump.pdf", b"pdf").await;
    let backend = Arc::new(
        MockBackend::new()
            .with_response(r#"["pump.pdf"]"#)
            .with_failing_stream(vec!["partial "], "connection reset")
            .with_response(r#"["pump.pdf"]"#)
            .with_stream(vec!["recovered"]),
    );
    let engine = Arc::new(engine(&world, backend.clone()));
    let ctx = RequestContext::new("plant-a", "q");

    let events = collect_events(&engine, ctx.clone()).await;
    assert_eq!(terminal_count(&events), 1);
    match events.last().unwrap() {
        StreamEvent::Done {
            answer, visuals, ..
        } => {
            assert!(answer.starts_with("partial "));
            assert!(answer.contains("\n\nError:"));
            assert!(answer.contains("connection reset"));
            assert!(visuals.is_empty());
        }
        other => panic!("expected done, got {:?}", other),
    }

    // The failed attempt was not cached; the retry reaches the backend.
    let retry = collect_events(&engine, ctx).await;
    assert_eq!(backend.stream_count(), 2);
    match retry.last().unwrap() {
        StreamEvent::Done { answer, .. } => assert_eq!(answer, "recovered"),
        other => panic!("expected done, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stream_open_failure_is_error_event() {
    let world = TestWorld::new();
    world.add_document("plant-a", "datasheet", "pump.pdf", b"pdf").await;
    let backend = Arc::new(
        MockBackend::new()
            .with_response(r#"["pump.pdf"]"#)
            .with_outcome(MockOutcome::NonRetryable("bad request".to_string())),
    );
    let engine = Arc::new(engine(&world, backend));

    let events = collect_events(&engine, RequestContext::new("plant-a", "q")).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        StreamEvent::Error { message } if message.contains("bad request")
    ));
}

#[tokio::test]
async fn test_stream_empty_catalog_single_done() {
    let world = TestWorld::new();
    let backend = Arc::new(MockBackend::new());
    let engine = Arc::new(engine(&world, backend.clone()));

    let events = collect_events(&engine, RequestContext::new("plant-a", "q")).await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        StreamEvent::Done { answer, .. } => {
            assert_eq!(answer, defaults::MISSING_DOCUMENTS_ANSWER);
        }
        other => panic!("expected done, got {:?}", other),
    }
    assert_eq!(backend.stream_count(), 0);
}

// =============================================================================
// SUPPLEMENTAL OPERATIONS
// =============================================================================

#[tokio::test]
async fn test_chat_title_trims_and_cleans() {
    let world = TestWorld::new();
    let backend = Arc::new(MockBackend::new().with_response("  Pump Flow Rates<br>\n"));
    let engine = engine(&world, backend);

    let title = engine.chat_title("What is the rated flow of P-101?").await;
    assert_eq!(title.as_deref(), Some("Pump Flow Rates"));
}

#[tokio::test]
async fn test_chat_title_failure_is_none() {
    let world = TestWorld::new();
    let backend = Arc::new(
        MockBackend::new().with_outcome(MockOutcome::NonRetryable("boom".to_string())),
    );
    let engine = engine(&world, backend);
    assert!(engine.chat_title("q").await.is_none());
}

#[tokio::test]
async fn test_chat_title_empty_output_is_none() {
    let world = TestWorld::new();
    let backend = Arc::new(MockBackend::new().with_response("   \n"));
    let engine = engine(&world, backend);
    assert!(engine.chat_title("q").await.is_none());
}

#[tokio::test]
async fn test_describe_document_clips_to_word_cap() {
    let world = TestWorld::new();
    let long = (0..80).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ");
    let backend = Arc::new(MockBackend::new().with_response(long));
    let engine = engine(&world, backend.clone());

    let description = engine
        .describe_document(b"pdf bytes".to_vec(), "application/pdf")
        .await
        .unwrap();

    assert_eq!(description.split_whitespace().count(), 50);
    assert!(description.starts_with("word0"));
    assert!(description.ends_with("word49"));
    // Uncached: upload happened but no cache row was written.
    assert_eq!(backend.upload_count(), 1);
    assert!(world.uploads.is_empty().await);
}

#[tokio::test]
async fn test_describe_document_collapses_whitespace() {
    let world = TestWorld::new();
    let backend = Arc::new(MockBackend::new().with_response("a   b\n\nc\td"));
    let engine = engine(&world, backend);

    let description = engine
        .describe_document(b"pdf".to_vec(), "application/pdf")
        .await
        .unwrap();
    assert_eq!(description, "a b c d");
}
