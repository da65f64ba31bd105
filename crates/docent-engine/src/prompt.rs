//! Prompt and payload assembly for answer generation.
//!
//! The assembler turns a request plus its materialized attachments into
//! the ordered part list handed to the answer chain. Labeling and
//! ordering rules live here so the engine never interleaves documents
//! incorrectly: internal documents always precede external ones, and
//! project labels appear only when more than one project contributed.

use std::sync::OnceLock;

use regex::Regex;

use docent_core::{defaults, ChatTurn, PrimaryMode};
use docent_gateway::{Part, Tool};

// =============================================================================
// TEXT CLEANUP
// =============================================================================

fn br_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"))
}

/// Replace `<br>`-style tags with newlines. Applied to stored history
/// answers before rendering and to generated text before returning.
pub fn clean_breaks(text: &str) -> String {
    br_re().replace_all(text, "\n").into_owned()
}

// =============================================================================
// ATTACHMENT ROLES
// =============================================================================

/// How one attachment is labeled inside the payload.
#[derive(Debug, Clone, PartialEq)]
pub enum DocRole {
    /// Single-project document; attached without labels.
    Plain,
    /// Cross-project document from the parent project.
    Parent(String),
    /// Cross-project document from a child project.
    Child(String),
    /// Comparison mode: internal project document, the source of truth.
    ComparisonInternal,
    /// Comparison mode: user-supplied external document.
    ComparisonExternal,
}

impl DocRole {
    fn is_external(&self) -> bool {
        matches!(self, Self::ComparisonExternal)
    }

    fn labels(&self) -> Option<(String, String)> {
        match self {
            Self::Plain => None,
            Self::Parent(project) => Some((
                format!("--- BEGIN PARENT PROJECT DOCUMENT: {} ---", project),
                format!("--- END PARENT PROJECT DOCUMENT: {} ---", project),
            )),
            Self::Child(project) => Some((
                format!("--- BEGIN CHILD PROJECT DOCUMENT: {} ---", project),
                format!("--- END CHILD PROJECT DOCUMENT: {} ---", project),
            )),
            Self::ComparisonInternal => Some((
                "--- BEGIN INTERNAL AUTHORITATIVE DOCUMENT ---".to_string(),
                "--- END INTERNAL AUTHORITATIVE DOCUMENT ---".to_string(),
            )),
            Self::ComparisonExternal => Some((
                "--- BEGIN USER EXTERNAL DOCUMENT FOR COMPARISON ---".to_string(),
                "--- END USER EXTERNAL DOCUMENT FOR COMPARISON ---".to_string(),
            )),
        }
    }
}

/// One materialized attachment ready for payload assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptDoc {
    pub uri: String,
    pub mime_type: String,
    pub role: DocRole,
}

impl PromptDoc {
    pub fn new(uri: impl Into<String>, mime_type: impl Into<String>, role: DocRole) -> Self {
        Self {
            uri: uri.into(),
            mime_type: mime_type.into(),
            role,
        }
    }
}

// =============================================================================
// INSTRUCTION TEXT
// =============================================================================

/// Style block appended after the question. Comparison mode reuses these
/// verbatim.
pub fn style_instruction(mode: PrimaryMode) -> &'static str {
    match mode {
        PrimaryMode::Basic => {
            "Answer style: short, simple, and direct. Present any numeric data in a Markdown table."
        }
        PrimaryMode::Research => {
            "Answer style: detailed and well-researched. Give supporting points and reference the attached documents."
        }
        PrimaryMode::Analytical => {
            "Answer style: analytical. Compare and evaluate alternatives, use tables, and show your reasoning."
        }
        PrimaryMode::Expert => {
            "Answer style: deep, expert-level. Include calculations, tables, and professional insights where relevant."
        }
    }
}

/// Tools attached for a style. Research grounds itself with web search.
pub fn style_tools(mode: PrimaryMode) -> Vec<Tool> {
    match mode {
        PrimaryMode::Research => vec![Tool::google_search()],
        _ => Vec::new(),
    }
}

/// Render prior turns as `User:`/`Assistant:` blocks.
pub fn render_history(history: &[ChatTurn]) -> String {
    history
        .iter()
        .map(|turn| {
            format!(
                "User: {}\nAssistant: {}\n\n",
                turn.question,
                clean_breaks(&turn.answer)
            )
        })
        .collect()
}

fn base_instruction(project: &str) -> String {
    format!(
        "You are an experienced engineering documentation assistant for the \"{}\" project.\n\
         Answer the user's question using ONLY the attached internal project documents.\n\
         If the attached documents do not contain the information needed, reply exactly:\n\
         \"{}\"\n\
         Never include internal identifiers in your answer: tag numbers, document numbers, \
         drawing numbers, equipment codes, or line numbers.\n\
         Present numeric data in Markdown tables.",
        project,
        defaults::MISSING_DOCUMENTS_ANSWER
    )
}

fn hierarchy_instruction(parent: &str, children: &[String]) -> String {
    format!(
        "PROJECT HIERARCHY:\n\
         - \"{}\" is the PARENT project and the primary authority for this answer.\n\
         - Child project documents ({}) provide dependency, interconnection, and downstream \
         context only.\n\
         - Structure the answer in sections, parent project first.\n\
         - Where parent and child documents conflict, the parent project's documents prevail.",
        parent,
        children.join(", ")
    )
}

const COMPARISON_INSTRUCTION: &str = "COMPARISON TASK:\n\
The INTERNAL AUTHORITATIVE documents are the only source of factual truth.\n\
The USER EXTERNAL document is supplied for comparison only and must never be treated as a \
source of fact.\n\
Structure your response exactly as:\n\
1. Uploaded Document Summary\n\
2. Sanity & Correctness Assessment\n\
3. Comparison Outcome - Full / Partial / Conflict / Not Relevant\n\
4. Documentation Improvement & Enhancement Suggestions\n\
5. Final Conclusion";

// =============================================================================
// PAYLOAD ASSEMBLY
// =============================================================================

/// Assemble the full answer payload: attachments first (internal before
/// external, labels per role), then one instruction part carrying the
/// base rules, any hierarchy or comparison block, history, the question,
/// and the style.
pub fn assemble_answer(
    project: &str,
    question: &str,
    mode: PrimaryMode,
    history: &[ChatTurn],
    docs: &[PromptDoc],
) -> (Vec<Part>, Vec<Tool>) {
    let mut parts = Vec::new();

    // Internal documents before external ones, regardless of caller order.
    let (internal, external): (Vec<_>, Vec<_>) =
        docs.iter().partition(|d| !d.role.is_external());
    for doc in internal.iter().chain(external.iter()) {
        match doc.role.labels() {
            Some((begin, end)) => {
                parts.push(Part::text(begin));
                parts.push(Part::file(&doc.uri, &doc.mime_type));
                parts.push(Part::text(end));
            }
            None => parts.push(Part::file(&doc.uri, &doc.mime_type)),
        }
    }

    let mut instruction = base_instruction(project);

    let parent = docs.iter().find_map(|d| match &d.role {
        DocRole::Parent(p) => Some(p.clone()),
        _ => None,
    });
    if let Some(parent) = parent {
        let mut children: Vec<String> = Vec::new();
        for doc in docs {
            if let DocRole::Child(c) = &doc.role {
                if !children.contains(c) {
                    children.push(c.clone());
                }
            }
        }
        instruction.push_str("\n\n");
        instruction.push_str(&hierarchy_instruction(&parent, &children));
    }

    if docs.iter().any(|d| d.role.is_external()) {
        instruction.push_str("\n\n");
        instruction.push_str(COMPARISON_INSTRUCTION);
    }

    let rendered_history = render_history(history);
    if !rendered_history.is_empty() {
        instruction.push_str("\n\nConversation so far:\n");
        instruction.push_str(&rendered_history);
    }

    instruction.push_str("\n\nQuestion: ");
    instruction.push_str(question);
    instruction.push_str("\n\n");
    instruction.push_str(style_instruction(mode));

    parts.push(Part::text(instruction));
    (parts, style_tools(mode))
}

// =============================================================================
// SUPPLEMENTAL PROMPTS
// =============================================================================

/// Prompt for chat-title generation. The question is clipped so a pasted
/// document never blows the call up.
pub fn title_prompt(question: &str) -> String {
    let clip = question
        .char_indices()
        .nth(defaults::TITLE_QUESTION_CLIP)
        .map(|(i, _)| i)
        .unwrap_or(question.len());
    format!(
        "Write a short title (at most six words) for a conversation that starts with this \
         question. Return only the title, no quotes, no markdown.\n\nQuestion: {}",
        &question[..clip]
    )
}

/// Instruction for document-description generation.
pub fn description_prompt() -> String {
    format!(
        "Describe the attached document's content in at most {} words. Ground the description \
         only in what the document actually contains. Return plain text only.",
        defaults::DESCRIPTION_MAX_WORDS
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(parts: &[Part]) -> String {
        parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                Part::File { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn plain(uri: &str) -> PromptDoc {
        PromptDoc::new(uri, "application/pdf", DocRole::Plain)
    }

    // =========================================================================
    // Cleanup and history
    // =========================================================================

    #[test]
    fn test_clean_breaks_variants() {
        assert_eq!(clean_breaks("a<br>b<br/>c<br />d<BR>e"), "a\nb\nc\nd\ne");
        assert_eq!(clean_breaks("no tags"), "no tags");
    }

    #[test]
    fn test_history_rendering() {
        let history = vec![
            ChatTurn::new("q1", "a1<br>more"),
            ChatTurn::new("q2", "a2"),
        ];
        assert_eq!(
            render_history(&history),
            "User: q1\nAssistant: a1\nmore\n\nUser: q2\nAssistant: a2\n\n"
        );
    }

    // =========================================================================
    // Styles
    // =========================================================================

    #[test]
    fn test_research_attaches_search_tool() {
        assert_eq!(style_tools(PrimaryMode::Research).len(), 1);
        assert!(style_tools(PrimaryMode::Basic).is_empty());
        assert!(style_tools(PrimaryMode::Expert).is_empty());
    }

    #[test]
    fn test_style_instruction_per_mode() {
        assert!(style_instruction(PrimaryMode::Basic).contains("short"));
        assert!(style_instruction(PrimaryMode::Research).contains("well-researched"));
        assert!(style_instruction(PrimaryMode::Analytical).contains("analytical"));
        assert!(style_instruction(PrimaryMode::Expert).contains("expert-level"));
    }

    // =========================================================================
    // Assembly
    // =========================================================================

    #[test]
    fn test_plain_docs_attach_without_labels() {
        let (parts, tools) = assemble_answer(
            "p1",
            "what is the flow rate?",
            PrimaryMode::Basic,
            &[],
            &[plain("uri-a"), plain("uri-b")],
        );

        // Two file parts plus one instruction part.
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[0], Part::File { .. }));
        assert!(matches!(&parts[1], Part::File { .. }));
        let text = text_of(&parts);
        assert!(!text.contains("---"));
        assert!(text.contains("what is the flow rate?"));
        assert!(text.contains(defaults::MISSING_DOCUMENTS_ANSWER));
        assert!(tools.is_empty());
    }

    #[test]
    fn test_instruction_is_last_part() {
        let (parts, _) = assemble_answer("p1", "q", PrimaryMode::Basic, &[], &[plain("u")]);
        assert!(matches!(parts.last(), Some(Part::Text { .. })));
    }

    #[test]
    fn test_internal_precedes_external_regardless_of_input_order() {
        let docs = vec![
            PromptDoc::new("ext-uri", "application/pdf", DocRole::ComparisonExternal),
            PromptDoc::new("int-uri", "application/pdf", DocRole::ComparisonInternal),
        ];
        let (parts, _) = assemble_answer("p1", "q", PrimaryMode::Basic, &[], &docs);

        let uris: Vec<&str> = parts
            .iter()
            .filter_map(|p| match p {
                Part::File { file_data } => Some(file_data.file_uri.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(uris, vec!["int-uri", "ext-uri"]);
    }

    #[test]
    fn test_comparison_labels_and_structure() {
        let docs = vec![
            PromptDoc::new("int-uri", "application/pdf", DocRole::ComparisonInternal),
            PromptDoc::new("ext-uri", "application/pdf", DocRole::ComparisonExternal),
        ];
        let (parts, _) = assemble_answer("p1", "q", PrimaryMode::Basic, &[], &docs);
        let text = text_of(&parts);

        assert!(text.contains("--- BEGIN INTERNAL AUTHORITATIVE DOCUMENT ---"));
        assert!(text.contains("--- END INTERNAL AUTHORITATIVE DOCUMENT ---"));
        assert!(text.contains("--- BEGIN USER EXTERNAL DOCUMENT FOR COMPARISON ---"));
        assert!(text.contains("1. Uploaded Document Summary"));
        assert!(text.contains("5. Final Conclusion"));
        assert!(text.contains("never be treated as a source of fact"));
    }

    #[test]
    fn test_no_comparison_block_without_external_doc() {
        let docs = vec![PromptDoc::new(
            "int-uri",
            "application/pdf",
            DocRole::ComparisonInternal,
        )];
        let (parts, _) = assemble_answer("p1", "q", PrimaryMode::Basic, &[], &docs);
        assert!(!text_of(&parts).contains("COMPARISON TASK"));
    }

    #[test]
    fn test_cross_project_labels_and_hierarchy() {
        let docs = vec![
            PromptDoc::new("pa", "application/pdf", DocRole::Parent("plant-a".to_string())),
            PromptDoc::new("cb", "application/pdf", DocRole::Child("plant-b".to_string())),
            PromptDoc::new("cb2", "application/pdf", DocRole::Child("plant-b".to_string())),
        ];
        let (parts, _) = assemble_answer("plant-a", "q", PrimaryMode::Basic, &[], &docs);
        let text = text_of(&parts);

        assert!(text.contains("--- BEGIN PARENT PROJECT DOCUMENT: plant-a ---"));
        assert!(text.contains("--- BEGIN CHILD PROJECT DOCUMENT: plant-b ---"));
        assert!(text.contains("PROJECT HIERARCHY:"));
        assert!(text.contains("\"plant-a\" is the PARENT project"));
        // Child list deduped.
        assert!(text.contains("(plant-b)"));
    }

    #[test]
    fn test_single_project_has_no_hierarchy_block() {
        let (parts, _) = assemble_answer("p1", "q", PrimaryMode::Basic, &[], &[plain("u")]);
        assert!(!text_of(&parts).contains("PROJECT HIERARCHY"));
    }

    #[test]
    fn test_history_included_when_present() {
        let history = vec![ChatTurn::new("earlier q", "earlier a")];
        let (parts, _) = assemble_answer("p1", "q", PrimaryMode::Basic, &history, &[plain("u")]);
        let text = text_of(&parts);
        assert!(text.contains("Conversation so far:"));
        assert!(text.contains("User: earlier q"));
    }

    #[test]
    fn test_no_history_header_when_empty() {
        let (parts, _) = assemble_answer("p1", "q", PrimaryMode::Basic, &[], &[plain("u")]);
        assert!(!text_of(&parts).contains("Conversation so far:"));
    }

    // =========================================================================
    // Supplemental prompts
    // =========================================================================

    #[test]
    fn test_title_prompt_clips_long_questions() {
        let long = "x".repeat(2000);
        let prompt = title_prompt(&long);
        let tail = prompt.split("Question: ").nth(1).unwrap();
        assert_eq!(tail.chars().count(), defaults::TITLE_QUESTION_CLIP);
    }

    #[test]
    fn test_title_prompt_clip_respects_char_boundaries() {
        let long = "é".repeat(600);
        let prompt = title_prompt(&long);
        assert!(prompt.ends_with('é'));
    }

    #[test]
    fn test_description_prompt_names_word_cap() {
        assert!(description_prompt().contains("50 words"));
    }
}
