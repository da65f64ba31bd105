//! Visual-page extraction for answered attachments.

use tracing::{debug, instrument, warn};

use docent_core::{defaults, VisualRef};
use docent_gateway::{ChainKind, GenerationConfig, ModelGateway, Part};

use crate::parse::parse_page_numbers;

const PDF_MIME: &str = "application/pdf";

/// Finds which pages of each attachment carry renderable visual content.
///
/// Extraction is strictly best-effort: a probe error, model failure, or
/// unparseable classification yields no visuals for that attachment and
/// never fails the answer.
pub struct VisualExtractor {
    max_attachments: usize,
}

impl VisualExtractor {
    pub fn new(max_attachments: usize) -> Self {
        Self { max_attachments }
    }
}

impl Default for VisualExtractor {
    fn default() -> Self {
        Self::new(defaults::MAX_ATTACHMENTS)
    }
}

impl VisualExtractor {
    /// Extract visual references for `(identity, handle)` pairs, capped
    /// at the attachment limit.
    #[instrument(skip(self, gateway, attachments), fields(subsystem = "visuals", count = attachments.len()))]
    pub async fn extract(
        &self,
        gateway: &ModelGateway,
        attachments: &[(String, String)],
    ) -> Vec<VisualRef> {
        let mut refs = Vec::new();
        for (identity, handle) in attachments.iter().take(self.max_attachments) {
            if let Some(visual) = self.extract_one(gateway, identity, handle).await {
                refs.push(visual);
            }
        }
        refs
    }

    async fn extract_one(
        &self,
        gateway: &ModelGateway,
        identity: &str,
        handle: &str,
    ) -> Option<VisualRef> {
        let meta = match gateway.get_file(handle).await {
            Ok(meta) if meta.is_active() => meta,
            Ok(meta) => {
                warn!(identity, handle, state = ?meta.state, "Handle not active; skipping visuals");
                return None;
            }
            Err(e) => {
                warn!(identity, handle, error = %e, "Handle probe failed; skipping visuals");
                return None;
            }
        };

        // Non-PDF assets are rendered whole; page 0 means the asset itself.
        if meta.mime_type != PDF_MIME {
            return Some(VisualRef {
                file_path: identity.to_string(),
                pages: vec![0],
            });
        }

        let parts = vec![
            Part::file(&meta.uri, &meta.mime_type),
            Part::text(VISUAL_PAGES_PROMPT),
        ];
        let config = GenerationConfig::with_max_output_tokens(defaults::MAX_OUTPUT_TOKENS_VISUALS);

        let generation = match gateway
            .generate(ChainKind::Routing, &parts, &config, &[])
            .await
        {
            Ok(generation) => generation,
            Err(e) => {
                warn!(identity, error = %e, "Visual classification failed; skipping visuals");
                return None;
            }
        };

        // 1-based model output to 0-based pages.
        let pages: Vec<u32> = parse_page_numbers(&generation.text)
            .into_iter()
            .map(|p| p.saturating_sub(1))
            .collect();
        if pages.is_empty() {
            debug!(identity, "No visual pages identified");
            return None;
        }

        debug!(identity, pages = ?pages, "Visual pages identified");
        Some(VisualRef {
            file_path: identity.to_string(),
            pages,
        })
    }
}

const VISUAL_PAGES_PROMPT: &str = "Identify which pages of the attached document contain \
meaningful visual content such as diagrams, drawings, charts, figures, or photographs.\n\
Ignore pages that contain only text or tables.\n\
Return a JSON array of 1-based page numbers and nothing else, e.g. [2, 5].\n\
If no pages qualify, return [].";
