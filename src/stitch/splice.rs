//! Match-point discovery and splicing of a continuation onto a partial
//! candidate.
//!
//! The match-point search is deterministic, in priority order: the verifier's
//! anchor line, then the longest candidate-suffix/continuation-prefix overlap
//! (200 characters down to 5), then the last paragraph, then plain append.
//! The verifier's anchor is a hint, never ground truth: it is validated
//! against the candidate before use.

use tracing::warn;

/// Longest overlap considered when scanning for a suffix/prefix match.
const MAX_OVERLAP_CHARS: usize = 200;
/// Shortest overlap accepted as a real match point.
const MIN_OVERLAP_CHARS: usize = 5;

/// How the splice point was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceMethod {
    /// The verifier's anchor line was located inside the candidate.
    Anchor,
    /// A candidate-suffix / continuation-prefix overlap of this many bytes.
    Overlap(usize),
    /// The candidate's last paragraph recurs inside the continuation.
    Paragraph,
    /// No match point; appended with a blank-line separator.
    Append,
}

/// Merge `continuation` onto `candidate` without duplicating the overlap.
pub fn splice(
    candidate: &str,
    continuation: &str,
    anchor: Option<&str>,
) -> (String, SpliceMethod) {
    let continuation = continuation.trim_start_matches('\n');

    // (a) Anchor line, validated against the candidate.
    if let Some(anchor) = anchor.map(str::trim).filter(|a| !a.is_empty()) {
        if let Some(pos) = candidate.rfind(anchor) {
            let head = &candidate[..pos + anchor.len()];
            let skip = overlap_len(head, continuation, 1);
            return (join(head, &continuation[skip..]), SpliceMethod::Anchor);
        }
    }

    // (b) Longest suffix/prefix overlap, 200 chars down to 5.
    let skip = overlap_len(candidate, continuation, MIN_OVERLAP_CHARS);
    if skip >= MIN_OVERLAP_CHARS {
        return (
            join(candidate, &continuation[skip..]),
            SpliceMethod::Overlap(skip),
        );
    }

    // (c) Last paragraph recurring inside the continuation.
    if let Some(paragraph) = last_paragraph(candidate) {
        if let Some(cont_pos) = continuation.find(paragraph) {
            let cand_pos = candidate
                .rfind(paragraph)
                .expect("paragraph came from candidate");
            let mut out = candidate[..cand_pos].to_string();
            out.push_str(&continuation[cont_pos..]);
            return (out, SpliceMethod::Paragraph);
        }
    }

    // (d) No viable match point: degrade to concatenation, never fail.
    warn!("no splice point found; appending continuation with separator");
    let mut out = candidate.trim_end().to_string();
    out.push_str("\n\n");
    out.push_str(continuation.trim_start());
    (out, SpliceMethod::Append)
}

/// Length in bytes of the longest suffix of `candidate` that is a prefix of
/// `continuation`, scanning down from [`MAX_OVERLAP_CHARS`] to `min`.
/// Returns 0 when nothing of at least `min` bytes matches.
fn overlap_len(candidate: &str, continuation: &str, min: usize) -> usize {
    let max = MAX_OVERLAP_CHARS
        .min(candidate.len())
        .min(continuation.len());
    let mut len = max;
    while len >= min.max(1) {
        if continuation.is_char_boundary(len) {
            let prefix = &continuation[..len];
            if candidate.ends_with(prefix) {
                return len;
            }
        }
        len -= 1;
    }
    0
}

/// Text between the last two blank-line breaks (the final paragraph),
/// trimmed. None when the candidate is effectively one block or the
/// paragraph is trivially short.
fn last_paragraph(candidate: &str) -> Option<&str> {
    let trimmed = candidate.trim_end();
    let start = trimmed.rfind("\n\n")?;
    let para = trimmed[start..].trim();
    (para.len() >= MIN_OVERLAP_CHARS).then_some(para)
}

fn join(head: &str, tail: &str) -> String {
    let mut out = head.to_string();
    out.push_str(tail);
    out
}
