//! Context budget management.
//!
//! Keeps the live conversation inside the active model's token budget:
//! estimation ([`estimator`]), per-model ceilings ([`budget`]), and the
//! trim/reset/prune policies ([`window`]) applied before and after provider
//! calls.

mod budget;
mod estimator;
mod window;

pub use budget::{budget_for, DEFAULT_BUDGET};
pub use estimator::{CharHeuristicEstimator, TokenEstimator};
pub use window::{ContextWindow, PrecheckOutcome};
