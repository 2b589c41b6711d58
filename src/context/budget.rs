//! Model context-window budget lookup.
//!
//! Pure data: a static table mapping model identifiers (or prefixes) to
//! context-window token ceilings. Unknown models get a conservative default
//! so budget math never divides by zero or over-promises.

/// Conservative fallback for models absent from the table.
pub const DEFAULT_BUDGET: u32 = 16_384;

/// (model id or prefix, context window in tokens)
const BUDGETS: &[(&str, u32)] = &[
    ("gpt-5", 400_000),
    ("gpt-4.1", 1_047_576),
    ("gpt-4o-mini", 128_000),
    ("gpt-4o", 128_000),
    ("gpt-4-turbo", 128_000),
    ("gpt-4", 8_192),
    ("gpt-3.5-turbo", 16_385),
    ("o3", 200_000),
    ("o4-mini", 200_000),
    ("claude-3-5", 200_000),
    ("claude-3", 200_000),
    ("claude-", 200_000),
    ("gemini-1.5-pro", 2_097_152),
    ("gemini-1.5-flash", 1_048_576),
    ("gemini-2", 1_048_576),
    ("deepseek", 65_536),
    ("qwen", 131_072),
];

/// Budget for `model_id`: exact match first, then longest matching prefix,
/// then [`DEFAULT_BUDGET`].
pub fn budget_for(model_id: &str) -> u32 {
    if let Some((_, tokens)) = BUDGETS.iter().find(|(id, _)| *id == model_id) {
        return *tokens;
    }

    BUDGETS
        .iter()
        .filter(|(prefix, _)| model_id.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, tokens)| *tokens)
        .unwrap_or(DEFAULT_BUDGET)
}
