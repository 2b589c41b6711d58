//! Context window management: trim, reset, and overflow-pruning policies.
//!
//! Every mutation of the live conversation goes through here before a
//! provider call so the request never exceeds the model's hard limit.

use tracing::{debug, info, warn};

use super::budget::budget_for;
use super::estimator::{CharHeuristicEstimator, TokenEstimator};
use crate::session::{Message, Role, SessionState};

/// Above this fraction of budget, warn only.
const WARN_FRACTION: f64 = 0.7;
/// Above this fraction of budget, trim history.
const TRIM_FRACTION: f64 = 0.9;
/// Exchanges kept (beyond the system message) when trimming.
const KEEP_RECENT_EXCHANGES: usize = 5;
/// Default reset threshold for steps that inject very large content.
const RESET_FRACTION: f64 = 0.5;

/// Outcome of a pre-call budget check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecheckOutcome {
    WithinBudget,
    Warned,
    Trimmed { new_estimate: u32 },
}

pub struct ContextWindow {
    estimator: Box<dyn TokenEstimator>,
    reset_fraction: f64,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self {
            estimator: Box::new(CharHeuristicEstimator),
            reset_fraction: RESET_FRACTION,
        }
    }
}

impl ContextWindow {
    pub fn new(estimator: Box<dyn TokenEstimator>) -> Self {
        Self {
            estimator,
            reset_fraction: RESET_FRACTION,
        }
    }

    pub fn estimate(&self, conversation: &[Message]) -> u32 {
        self.estimator.estimate_conversation(conversation)
    }

    pub fn estimate_text(&self, text: &str) -> u32 {
        self.estimator.estimate(text)
    }

    /// Pre-call check. Between 70% and 90% of budget a warning is logged;
    /// above 90% the conversation is trimmed to the system message plus the
    /// most recent exchanges.
    pub fn precheck(&self, conversation: &mut Vec<Message>, model: &str) -> PrecheckOutcome {
        let budget = budget_for(model);
        let estimate = self.estimate(conversation);
        let used = estimate as f64 / budget as f64;

        if used <= WARN_FRACTION {
            debug!(model, estimate, budget, "context precheck: within budget");
            return PrecheckOutcome::WithinBudget;
        }

        if used <= TRIM_FRACTION {
            warn!(
                model,
                estimate,
                budget,
                used_pct = (used * 100.0) as u32,
                "context approaching budget"
            );
            return PrecheckOutcome::Warned;
        }

        trim_to_recent(conversation, KEEP_RECENT_EXCHANGES);
        let new_estimate = self.estimate(conversation);
        info!(
            model,
            before = estimate,
            after = new_estimate,
            kept_exchanges = KEEP_RECENT_EXCHANGES,
            "context trimmed"
        );
        PrecheckOutcome::Trimmed { new_estimate }
    }

    /// Reset decision for steps that inject very large content (full source
    /// text, full prior draft). If current history plus the incoming content
    /// would exceed the reset fraction of budget, the conversation is
    /// replaced with a single freshly rendered system message. This is a
    /// correctness safeguard: these are the steps most likely to overflow
    /// the provider's hard limit.
    pub fn maybe_reset(
        &self,
        state: &mut SessionState,
        incoming_text: &str,
        model: &str,
        fresh_system_prompt: &str,
    ) -> bool {
        let budget = budget_for(model);
        let current = self.estimate(&state.conversation);
        let incoming = self.estimate_text(incoming_text);
        let threshold = (budget as f64 * self.reset_fraction) as u32;

        if current.saturating_add(incoming) <= threshold {
            return false;
        }

        info!(
            model,
            current,
            incoming,
            threshold,
            "resetting conversation before large injection"
        );
        state.reset_conversation(fresh_system_prompt);
        true
    }

    /// Selective pruning after a provider context-length error: keep the
    /// system message, the first user message (original framing), and the
    /// most recent user message (the one that triggered the error).
    pub fn prune_after_overflow(&self, conversation: &mut Vec<Message>) {
        let system = conversation
            .iter()
            .find(|m| m.role == Role::System)
            .cloned();
        let first_user = conversation.iter().find(|m| m.role == Role::User).cloned();
        let last_user = conversation
            .iter()
            .rfind(|m| m.role == Role::User)
            .cloned();

        let before = conversation.len();
        let mut pruned = Vec::with_capacity(3);
        if let Some(msg) = system {
            pruned.push(msg);
        }
        if let Some(msg) = first_user {
            pruned.push(msg);
        }
        if let Some(msg) = last_user {
            // First and last user message can be the same message.
            if pruned.last() != Some(&msg) {
                pruned.push(msg);
            }
        }
        *conversation = pruned;

        warn!(
            before,
            after = conversation.len(),
            "pruned conversation after context-length error"
        );
    }
}

/// Retain the system message (if any) plus the last `keep` user/assistant
/// exchanges, preserving order.
fn trim_to_recent(conversation: &mut Vec<Message>, keep: usize) {
    let system: Vec<Message> = conversation
        .iter()
        .filter(|m| m.role == Role::System)
        .take(1)
        .cloned()
        .collect();
    let rest: Vec<Message> = conversation
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .collect();

    let keep_msgs = keep * 2;
    let tail_start = rest.len().saturating_sub(keep_msgs);

    let mut trimmed = system;
    trimmed.extend(rest.into_iter().skip(tail_start));
    *conversation = trimmed;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Message;

    fn long_conversation(pairs: usize, content_len: usize) -> Vec<Message> {
        let mut conv = vec![Message::system("sys")];
        let filler = "x".repeat(content_len);
        for _ in 0..pairs {
            conv.push(Message::user(filler.clone()));
            conv.push(Message::assistant(filler.clone()));
        }
        conv
    }

    #[test]
    fn precheck_within_budget_is_noop() {
        let window = ContextWindow::default();
        let mut conv = long_conversation(2, 100);
        let before = conv.clone();
        assert_eq!(
            window.precheck(&mut conv, "gpt-4o"),
            PrecheckOutcome::WithinBudget
        );
        assert_eq!(conv, before);
    }

    #[test]
    fn precheck_warns_between_70_and_90_percent() {
        let window = ContextWindow::default();
        // unknown model -> 16_384 budget. 80% of budget ~= 13k tokens
        // ~= 52k ascii chars. 10 pairs of 2_600 chars each.
        let mut conv = long_conversation(10, 2_600);
        let before = conv.len();
        assert_eq!(
            window.precheck(&mut conv, "unknown-model"),
            PrecheckOutcome::Warned
        );
        assert_eq!(conv.len(), before);
    }

    #[test]
    fn precheck_trims_above_90_percent() {
        let window = ContextWindow::default();
        // 20 pairs of 2_600 chars ~= 26k tokens, well over 16_384.
        let mut conv = long_conversation(20, 2_600);
        match window.precheck(&mut conv, "unknown-model") {
            PrecheckOutcome::Trimmed { new_estimate } => {
                assert!(new_estimate < 26_000);
            }
            other => panic!("expected Trimmed, got {other:?}"),
        }
        // System message + 5 exchanges.
        assert_eq!(conv.len(), 1 + KEEP_RECENT_EXCHANGES * 2);
        assert_eq!(conv[0].role, Role::System);
    }

    #[test]
    fn trim_keeps_most_recent_exchanges() {
        let mut conv = vec![Message::system("sys")];
        for i in 0..8 {
            conv.push(Message::user(format!("u{i}")));
            conv.push(Message::assistant(format!("a{i}")));
        }
        trim_to_recent(&mut conv, 2);
        assert_eq!(conv.len(), 5);
        assert_eq!(conv[1].content, "u6");
        assert_eq!(conv[4].content, "a7");
    }

    #[test]
    fn maybe_reset_leaves_small_injections_alone() {
        let window = ContextWindow::default();
        let mut state = SessionState::new("sys");
        state.push_exchange("short", "reply");
        assert!(!window.maybe_reset(&mut state, "tiny content", "gpt-4o", "fresh sys"));
        assert_eq!(state.conversation.len(), 3);
    }

    #[test]
    fn maybe_reset_replaces_history_for_large_injection() {
        let window = ContextWindow::default();
        let mut state = SessionState::new("sys");
        state.push_exchange("a", "b");
        // Unknown model budget 16_384, reset threshold 8_192 tokens
        // ~= 32k ascii chars.
        let huge = "y".repeat(40_000);
        assert!(window.maybe_reset(&mut state, &huge, "unknown-model", "fresh sys"));
        assert_eq!(state.conversation.len(), 1);
        assert_eq!(state.system_prompt(), Some("fresh sys"));
    }

    #[test]
    fn prune_after_overflow_keeps_system_first_and_last_user() {
        let window = ContextWindow::default();
        let mut conv = vec![
            Message::system("sys"),
            Message::user("first framing"),
            Message::assistant("r1"),
            Message::user("middle"),
            Message::assistant("r2"),
            Message::user("latest request"),
        ];
        window.prune_after_overflow(&mut conv);
        assert_eq!(conv.len(), 3);
        assert_eq!(conv[0].content, "sys");
        assert_eq!(conv[1].content, "first framing");
        assert_eq!(conv[2].content, "latest request");
    }

    #[test]
    fn prune_after_overflow_single_user_not_duplicated() {
        let window = ContextWindow::default();
        let mut conv = vec![Message::system("sys"), Message::user("only")];
        window.prune_after_overflow(&mut conv);
        assert_eq!(conv.len(), 2);
    }
}
