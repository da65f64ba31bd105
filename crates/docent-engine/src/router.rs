//! Relevance routing: which catalog documents can answer a question.

use tracing::{debug, instrument, warn};

use docent_core::{defaults, DocumentRecord};
use docent_gateway::{ChainKind, GenerationConfig, ModelGateway, Part};

use crate::parse::parse_string_array;

/// Classifies which of a project's documents are relevant to a question
/// by handing the catalog listing to the routing chain.
///
/// Routing is best-effort by contract: gateway failures and unparseable
/// output both collapse to an empty list, which callers treat as "no
/// relevant files", never as an error.
pub struct RelevanceRouter {
    max_files: usize,
}

impl RelevanceRouter {
    pub fn new(max_files: usize) -> Self {
        Self { max_files }
    }
}

impl Default for RelevanceRouter {
    fn default() -> Self {
        Self::new(defaults::ROUTING_MAX_FILES)
    }
}

impl RelevanceRouter {
    /// Ask the routing chain for up to `max_files` relevant file names.
    #[instrument(skip(self, gateway, records), fields(subsystem = "router", project = %project, catalog_size = records.len()))]
    pub async fn route(
        &self,
        gateway: &ModelGateway,
        project: &str,
        question: &str,
        records: &[DocumentRecord],
    ) -> Vec<String> {
        if records.is_empty() {
            debug!("Empty catalog; skipping routing call");
            return Vec::new();
        }

        let catalog_text = build_catalog_text(records, defaults::CATALOG_TEXT_BUDGET);
        let prompt = routing_prompt(project, question, &catalog_text, self.max_files);
        let config = GenerationConfig::with_max_output_tokens(defaults::MAX_OUTPUT_TOKENS_ROUTING);

        match gateway
            .generate(ChainKind::Routing, &[Part::text(prompt)], &config, &[])
            .await
        {
            Ok(generation) => {
                let files = parse_string_array(&generation.text, self.max_files);
                debug!(count = files.len(), model = %generation.model, "Routing complete");
                files
            }
            Err(e) => {
                warn!(error = %e, "Routing call failed; treating as no relevant files");
                Vec::new()
            }
        }
    }
}

/// Render the catalog as one `id | kind | name | path` line per record,
/// in catalog order, bounded by `budget` characters.
///
/// Over budget, the head is kept up to `budget - 2000` characters and
/// the last 1000 characters of the original text are re-appended after
/// an elision marker, so late catalog entries stay visible to the model.
pub fn build_catalog_text(records: &[DocumentRecord], budget: usize) -> String {
    let text = records
        .iter()
        .map(|r| format!("{} | {} | {} | {}", r.id, r.kind, r.name, r.path))
        .collect::<Vec<_>>()
        .join("\n");

    if text.len() <= budget {
        return text;
    }

    let head_end = floor_char_boundary(&text, budget - defaults::CATALOG_HEAD_MARGIN);
    let tail_start = floor_char_boundary(&text, text.len() - defaults::CATALOG_TAIL_KEEP);
    warn!(
        original_len = text.len(),
        budget, "Catalog text over budget; truncating"
    );
    format!("{}\n...\n{}", &text[..head_end], &text[tail_start..])
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn routing_prompt(project: &str, question: &str, catalog_text: &str, max_files: usize) -> String {
    format!(
        r#"You are a document librarian for the "{project}" project.

You are given a catalog of the project's documents.
Each line contains: id | kind | name | path.

The catalog describes what each file contains (e.g. diagrams, datasheets, procedures, or design calculations).

Your task:
- Read the user's question carefully.
- Identify which files from the catalog are most relevant to answer that question.
- Base your selection on the kind and filename context.
- Return only up to {max_files} matching name entries as a JSON array.
- Do NOT use markdown formatting (no backticks).
- If nothing is relevant, return an empty JSON array: []

User question: "{question}"

Catalog:
{catalog_text}
"#
    )
}
