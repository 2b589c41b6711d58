//! Delimited-section extraction and truncation detection.
//!
//! Generation steps are asked to wrap their translation in an XML-style tag.
//! An opening tag without its closing tag is the cheap, strong signal that
//! the provider cut the generation off mid-stream.

use regex::Regex;
use std::sync::OnceLock;

/// How the candidate text was recovered from the raw output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    /// Found both opening and closing tags.
    Tagged,
    /// Opening tag present, closing tag missing; took everything after the
    /// opening tag. Implies truncation.
    TaggedUnclosed,
    /// No tags at all; fell back to the first fenced code block.
    CodeFence,
    /// No tags, no fences; took the raw output verbatim.
    Raw,
}

impl ExtractionMethod {
    /// Heuristic extractions are flagged for manual inspection via a debug
    /// artifact.
    pub fn is_heuristic(&self) -> bool {
        matches!(self, ExtractionMethod::CodeFence | ExtractionMethod::Raw)
    }
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    pub method: ExtractionMethod,
}

/// True if the opening delimiter for `tag` is present without a matching
/// closing delimiter.
pub fn detect_truncation(raw: &str, tag: &str) -> bool {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    raw.contains(&open) && !raw.contains(&close)
}

/// Pull the delimited section out of `raw`, falling back to code-fence
/// boundaries and finally the raw output itself.
pub fn extract(raw: &str, tag: &str) -> Extraction {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");

    if let Some(start) = raw.find(&open) {
        let body_start = start + open.len();
        return match raw[body_start..].find(&close) {
            Some(end) => Extraction {
                text: raw[body_start..body_start + end].trim().to_string(),
                method: ExtractionMethod::Tagged,
            },
            None => Extraction {
                text: raw[body_start..].trim().to_string(),
                method: ExtractionMethod::TaggedUnclosed,
            },
        };
    }

    if let Some(fenced) = extract_code_fence(raw) {
        return Extraction {
            text: fenced,
            method: ExtractionMethod::CodeFence,
        };
    }

    Extraction {
        text: raw.trim().to_string(),
        method: ExtractionMethod::Raw,
    }
}

/// Content of the first ``` fenced block, if any.
fn extract_code_fence(raw: &str) -> Option<String> {
    let start = raw.find("```")?;
    let after_fence = &raw[start + 3..];
    // Skip an optional language hint on the fence line.
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim().to_string())
}

/// Strip leftover delimiter tags and trailing "(to be continued)"-style
/// markers before the text is accepted as an artifact.
pub fn clean_artifact_text(text: &str, tag: &str) -> String {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut cleaned = text.replace(&open, "").replace(&close, "");

    let re = continuation_marker_re();
    loop {
        let trimmed = cleaned.trim_end();
        match re.find(trimmed) {
            Some(m) if m.end() == trimmed.len() => {
                cleaned = trimmed[..m.start()].to_string();
            }
            _ => break,
        }
    }

    cleaned.trim().to_string()
}

fn continuation_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Trailing continuation markers in several languages, optionally
        // wrapped in ASCII or fullwidth brackets.
        Regex::new(
            r"(?i)[\(\[（【]?\s*(to be continued|continued in next part|continuará|à suivre|未完待续|待续|つづく|続く)\s*[\)\]）】]?\s*[.。…]*\s*$",
        )
        .expect("static regex compiles")
    })
}
