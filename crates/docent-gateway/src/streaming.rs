//! SSE stream parsing for Gemini streaming responses.

use futures::{Stream, StreamExt};
use std::pin::Pin;

use docent_core::{Error, Result};

use crate::types::GenerateContentResponse;

/// Stream of generation text deltas.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Parse the SSE byte stream from `streamGenerateContent?alt=sse`.
///
/// Events may split across byte chunks, so lines are reassembled in a
/// carry buffer before parsing. The provider ends the stream by closing
/// the connection; there is no sentinel event.
pub fn parse_sse_stream(
    stream: impl Stream<Item = std::result::Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> TokenStream {
    let inner = Box::pin(stream);
    let token_stream = futures::stream::unfold(
        (inner, String::new(), false),
        |(mut inner, mut buf, mut exhausted)| async move {
            loop {
                if let Some(pos) = buf.find('\n') {
                    let line: String = buf.drain(..=pos).collect();
                    if let Some(item) = parse_sse_line(line.trim()) {
                        return Some((item, (inner, buf, exhausted)));
                    }
                    continue;
                }
                if exhausted {
                    if buf.is_empty() {
                        return None;
                    }
                    let line = std::mem::take(&mut buf);
                    return parse_sse_line(line.trim())
                        .map(|item| (item, (inner, buf, exhausted)));
                }
                match inner.next().await {
                    Some(Ok(bytes)) => buf.push_str(&String::from_utf8_lossy(&bytes)),
                    Some(Err(e)) => {
                        return Some((
                            Err(Error::Model(format!("Stream error: {}", e))),
                            (inner, buf, exhausted),
                        ));
                    }
                    None => exhausted = true,
                }
            }
        },
    );
    Box::pin(token_stream)
}

/// Parse a single complete SSE line and extract the text delta.
///
/// Returns `None` for blank lines, comments, non-data fields, and events
/// without text (e.g. a final usage-only event).
fn parse_sse_line(line: &str) -> Option<Result<String>> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line.strip_prefix("data:")?.trim_start();
    match serde_json::from_str::<GenerateContentResponse>(data) {
        Ok(response) => response.joined_text().map(Ok),
        Err(e) => Some(Err(Error::Model(format!(
            "Failed to parse SSE event: {}",
            e
        )))),
    }
}
