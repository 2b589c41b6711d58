//! Static per-model price table for cost accounting.
//!
//! Pure data, prefix-matched like the budget table. Unknown models cost
//! zero rather than guessing; the totals are estimates for the operator,
//! not billing.

/// (model prefix, USD per 1M input tokens, USD per 1M output tokens)
const PRICES: &[(&str, f64, f64)] = &[
    ("gpt-5", 1.25, 10.0),
    ("gpt-4.1-mini", 0.40, 1.60),
    ("gpt-4.1", 2.00, 8.00),
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4o", 2.50, 10.00),
    ("o3", 2.00, 8.00),
    ("o4-mini", 1.10, 4.40),
    ("claude-3-5-haiku", 0.80, 4.00),
    ("claude-", 3.00, 15.00),
    ("deepseek", 0.27, 1.10),
];

/// Estimated cost in USD for one call. Longest matching prefix wins;
/// unknown models return 0.
pub fn estimate_cost(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    PRICES
        .iter()
        .filter(|(prefix, _, _)| model.starts_with(prefix))
        .max_by_key(|(prefix, _, _)| prefix.len())
        .map(|(_, input_price, output_price)| {
            input_tokens as f64 / 1e6 * input_price + output_tokens as f64 / 1e6 * output_price
        })
        .unwrap_or(0.0)
}
