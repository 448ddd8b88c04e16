//! Recovery of structured payloads from free-form model replies.
//!
//! Replies interleave narration ("Let me search for...") with the payload,
//! sometimes inside a fenced block and sometimes bare. The helpers here pick
//! the segment that carries the payload, cut the payload out of it, repair
//! the encoding once and decode it.

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::encoding::EncodingRepair;
use crate::{Error, Result};

/// Characters of the attempted span kept in an [`Error::Extraction`].
pub const SNIPPET_LEN: usize = 200;

const FENCE: &str = "```";
const HTML_CLOSE: &str = "</html>";

#[derive(Debug, Clone, Default)]
pub struct Extractor {
    repair: EncodingRepair,
}

impl Extractor {
    pub fn new(repair: EncodingRepair) -> Self {
        Self { repair }
    }

    pub fn repair(&self) -> &EncodingRepair {
        &self.repair
    }

    /// Decode the JSON object in the first segment that mentions `marker`.
    pub fn json<T: DeserializeOwned>(&self, segments: &[String], marker: &str) -> Result<T> {
        let (index, segment) = segments
            .iter()
            .enumerate()
            .find(|(_, s)| s.contains(marker))
            .ok_or_else(|| {
                extraction_error(
                    format!("no segment contains marker {}", marker),
                    &segments.concat(),
                )
            })?;
        debug!(segment = index, marker, "Found payload segment");

        let candidate = fenced_payload(segment, "json", |body| body.contains(marker))
            .unwrap_or(segment)
            .trim();
        let span = if candidate.starts_with('{') {
            candidate
        } else {
            balanced_span(candidate, '{', '}')
                .ok_or_else(|| extraction_error("no JSON object in segment", candidate))?
        };

        let repaired = self.repair.repair(span);
        serde_json::from_str(&repaired)
            .map_err(|e| extraction_error(format!("malformed JSON: {}", e), &repaired))
    }

    /// Return the HTML document in the first segment that starts one.
    ///
    /// For callers whose model reply is a whole page rather than a JSON
    /// payload; the digest pipeline renders its own page from JSON.
    pub fn html(&self, segments: &[String]) -> Result<String> {
        let (index, segment) = segments
            .iter()
            .enumerate()
            .find(|(_, s)| document_start(s).is_some())
            .ok_or_else(|| extraction_error("no HTML document in response", &segments.concat()))?;
        debug!(segment = index, "Found HTML segment");

        let candidate = fenced_payload(segment, "html", |body| document_start(body).is_some())
            .unwrap_or(segment)
            .trim();
        let span = if candidate.starts_with('<') {
            candidate
        } else {
            let start = document_start(candidate)
                .ok_or_else(|| extraction_error("no HTML document in segment", candidate))?;
            let end = candidate
                .rfind(HTML_CLOSE)
                .filter(|end| *end > start)
                .map(|end| end + HTML_CLOSE.len())
                .unwrap_or(candidate.len());
            &candidate[start..end]
        };

        if document_start(span).is_none() {
            return Err(extraction_error("fenced block holds no HTML document", span));
        }
        Ok(self.repair.repair(span))
    }
}

fn extraction_error(message: impl Into<String>, attempted: &str) -> Error {
    Error::Extraction {
        message: message.into(),
        snippet: attempted.chars().take(SNIPPET_LEN).collect(),
    }
}

/// Byte offset of the first document-start marker, if any.
fn document_start(text: &str) -> Option<usize> {
    let lower = text.to_ascii_lowercase();
    ["<!doctype html", "<html"]
        .iter()
        .filter_map(|marker| lower.find(marker))
        .min()
}

/// A fenced code block: its language tag (empty when unlabelled) and body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fence<'a> {
    pub tag: &'a str,
    pub body: &'a str,
}

/// Every fenced block in `text`, in order.
///
/// The text after an opening fence is a tag only when it is a bare
/// identifier on its own line; otherwise the body starts right after the
/// fence, so a block opened and closed on one line keeps its payload.
/// An unterminated fence runs to the end of the text.
pub fn fenced_blocks(text: &str) -> Vec<Fence<'_>> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find(FENCE) {
        let after_open = &rest[open + FENCE.len()..];
        let line_end = after_open.find('\n').unwrap_or(after_open.len());
        let first_line = after_open[..line_end].trim_end_matches('\r');
        let (tag, body) = if is_fence_tag(first_line) {
            let body_start = (line_end + 1).min(after_open.len());
            (first_line, &after_open[body_start..])
        } else {
            ("", after_open)
        };

        match body.find(FENCE) {
            Some(close) => {
                blocks.push(Fence {
                    tag,
                    body: body[..close].trim(),
                });
                rest = &body[close + FENCE.len()..];
            }
            None => {
                blocks.push(Fence {
                    tag,
                    body: body.trim(),
                });
                break;
            }
        }
    }
    blocks
}

fn is_fence_tag(line: &str) -> bool {
    !line.is_empty()
        && line
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+' | '.'))
}

/// Body of the block best matching `tag` among those `holds_payload` accepts:
/// a block labelled `tag` first, then an unlabelled one, then any other.
fn fenced_payload<'a>(
    text: &'a str,
    tag: &str,
    holds_payload: impl Fn(&str) -> bool,
) -> Option<&'a str> {
    let blocks: Vec<Fence<'a>> = fenced_blocks(text)
        .into_iter()
        .filter(|block| holds_payload(block.body))
        .collect();
    blocks
        .iter()
        .find(|block| block.tag.eq_ignore_ascii_case(tag))
        .or_else(|| blocks.iter().find(|block| block.tag.is_empty()))
        .or_else(|| blocks.first())
        .map(|block| block.body)
}

/// First span that opens with `open` and closes at its matching `close`.
///
/// Delimiters inside JSON string literals are ignored. If the span never
/// balances, it is cut at the last `close` so decoding can report the error.
pub fn balanced_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }

    text.rfind(close)
        .filter(|end| *end > start)
        .map(|end| &text[start..end + close.len_utf8()])
}
