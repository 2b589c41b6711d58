//! Token estimation behind a pluggable trait.
//!
//! The character-length heuristic is an intentional approximation: budget
//! decisions only need to be directionally right, and keeping the estimator
//! behind a trait means a real tokenizer can be substituted without touching
//! the budget logic.

use crate::session::Message;

pub trait TokenEstimator: Send + Sync {
    /// Approximate token count for a piece of text.
    fn estimate(&self, text: &str) -> u32;

    /// Approximate token count for a whole conversation. Adds a small fixed
    /// per-message overhead for role framing.
    fn estimate_conversation(&self, conversation: &[Message]) -> u32 {
        conversation
            .iter()
            .map(|m| self.estimate(&m.content) + MESSAGE_OVERHEAD_TOKENS)
            .sum()
    }
}

/// Per-message framing overhead (role tags, separators).
const MESSAGE_OVERHEAD_TOKENS: u32 = 4;

/// Character-based heuristic: ~4 ASCII characters per token, with CJK
/// codepoints counted as one token each since they tokenize far denser.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharHeuristicEstimator;

impl TokenEstimator for CharHeuristicEstimator {
    fn estimate(&self, text: &str) -> u32 {
        let mut ascii_ish = 0u32;
        let mut cjk = 0u32;
        for ch in text.chars() {
            if is_cjk(ch) {
                cjk += 1;
            } else {
                ascii_ish += 1;
            }
        }
        ascii_ish.div_ceil(4) + cjk
    }
}

fn is_cjk(ch: char) -> bool {
    matches!(ch as u32,
        0x4E00..=0x9FFF      // CJK Unified Ideographs
        | 0x3400..=0x4DBF    // CJK Extension A
        | 0x3040..=0x30FF    // Hiragana + Katakana
        | 0xAC00..=0xD7AF    // Hangul syllables
        | 0xF900..=0xFAFF    // CJK Compatibility Ideographs
    )
}
