//! Continuation engine: guarantees a translation artifact covers the whole
//! source even when individual generations are truncated.
//!
//! Continuation runs as an explicit bounded loop carrying an accumulator
//! ([`ContinuationGuard`]) instead of recursion, so the termination bounds
//! are directly inspectable: abort on 3 consecutive attempts with no growth,
//! 2 with growth under 100 characters, or 2 consecutive identical source
//! anchors from the verifier.

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::extract::{clean_artifact_text, detect_truncation, extract};
use super::splice::splice;
use crate::errors::WorkflowError;
use crate::prompts;
use crate::session::{Message, SessionState};
use crate::storage::Storage;
use crate::util::extract_json_object;
use crate::workflow::{CompletionRunner, Step};

/// Consecutive zero-growth attempts tolerated.
const MAX_NO_GROWTH: u32 = 3;
/// Consecutive below-threshold-growth attempts tolerated.
const MAX_LOW_GROWTH: u32 = 2;
/// Consecutive identical verifier source anchors tolerated. Repetition is a
/// strong signal the document end has been reached.
const MAX_SAME_ANCHOR: u32 = 2;
/// Minimum growth in characters for an attempt to count as progress.
const MIN_GROWTH_CHARS: usize = 100;
/// Hard ceiling on continuation attempts, independent of the streak bounds.
const MAX_TOTAL_ATTEMPTS: u32 = 20;
/// Longest candidate tail offered as a fallback continuation anchor.
const ANCHOR_TAIL_CHARS: usize = 200;

/// Per-call accumulator for the continuation loop. Reset implicitly by being
/// scoped to one `ensure_complete` invocation.
#[derive(Debug, Default)]
struct ContinuationGuard {
    attempts: u32,
    no_growth_streak: u32,
    low_growth_streak: u32,
    same_anchor_streak: u32,
    prev_source_anchor: Option<String>,
}

impl ContinuationGuard {
    fn observe_anchor(&mut self, anchor: Option<&str>) {
        match anchor {
            Some(a) if self.prev_source_anchor.as_deref() == Some(a) => {
                self.same_anchor_streak += 1;
            }
            Some(a) => {
                self.same_anchor_streak = 1;
                self.prev_source_anchor = Some(a.to_string());
            }
            None => {}
        }
    }

    fn observe_growth(&mut self, before: usize, after: usize) {
        let growth = after.saturating_sub(before);
        if growth == 0 {
            self.no_growth_streak += 1;
            self.low_growth_streak = 0;
        } else if growth < MIN_GROWTH_CHARS {
            self.low_growth_streak += 1;
            self.no_growth_streak = 0;
        } else {
            self.no_growth_streak = 0;
            self.low_growth_streak = 0;
        }
    }

    fn abort_reason(&self) -> Option<&'static str> {
        if self.no_growth_streak >= MAX_NO_GROWTH {
            Some("candidate length unchanged across consecutive attempts")
        } else if self.low_growth_streak >= MAX_LOW_GROWTH {
            Some("growth below minimum threshold across consecutive attempts")
        } else if self.same_anchor_streak >= MAX_SAME_ANCHOR {
            Some("verifier repeated the same source anchor")
        } else if self.attempts >= MAX_TOTAL_ATTEMPTS {
            Some("continuation attempt ceiling reached")
        } else {
            None
        }
    }
}

/// Verdict of one completion-verification call.
#[derive(Debug)]
struct Verdict {
    needs_continuation: bool,
    target_anchor: Option<String>,
    source_anchor: Option<String>,
}

#[derive(Deserialize)]
struct VerifierJson {
    complete: bool,
    last_translated_line: Option<String>,
    last_source_line: Option<String>,
}

pub struct ContinuationEngine<'a> {
    runner: &'a CompletionRunner,
    storage: &'a Storage,
    model: &'a str,
    verifier_model: &'a str,
}

impl<'a> ContinuationEngine<'a> {
    pub fn new(
        runner: &'a CompletionRunner,
        storage: &'a Storage,
        model: &'a str,
        verifier_model: &'a str,
    ) -> Self {
        Self {
            runner,
            storage,
            model,
            verifier_model,
        }
    }

    /// Extract the step's output from `raw_output` and, if it is truncated
    /// or the verifier judges it incomplete, drive continuation rounds until
    /// the text is complete or a termination bound fires. Returns the final
    /// cleaned artifact text; intermediate stitched versions are written to
    /// the step artifact as they are produced.
    pub async fn ensure_complete(
        &self,
        state: &mut SessionState,
        source: &str,
        raw_output: &str,
        step: Step,
    ) -> Result<String, WorkflowError> {
        let extraction = extract(raw_output, prompts::OUTPUT_TAG);
        if extraction.method.is_heuristic() {
            warn!(step = step.title(), method = ?extraction.method, "extraction fell back to heuristics");
            self.storage
                .write_debug(&format!("{}_raw.txt", step.key()), raw_output);
        }

        let mut candidate = extraction.text;
        // An unclosed tag already proves truncation; the verifier call is
        // skipped and continuation is forced unconditionally.
        let mut forced = detect_truncation(raw_output, prompts::OUTPUT_TAG);
        let mut guard = ContinuationGuard::default();

        loop {
            let verdict = if forced {
                Verdict {
                    needs_continuation: true,
                    target_anchor: None,
                    source_anchor: None,
                }
            } else {
                self.verify(state, source, &candidate).await?
            };

            if !verdict.needs_continuation {
                debug!(step = step.title(), "candidate verified complete");
                break;
            }

            guard.observe_anchor(verdict.source_anchor.as_deref());
            if let Some(reason) = guard.abort_reason() {
                warn!(
                    step = step.title(),
                    attempts = guard.attempts,
                    reason,
                    "aborting continuation; keeping best candidate"
                );
                break;
            }

            guard.attempts += 1;
            info!(
                step = step.title(),
                attempt = guard.attempts,
                candidate_len = candidate.len(),
                "requesting continuation"
            );

            self.storage
                .backup_artifact(step)
                .map_err(WorkflowError::Other)?;

            // The anchor is a hint: only use it if it actually occurs in the
            // candidate, otherwise fall back to the candidate's own tail.
            let validated_anchor = verdict
                .target_anchor
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty() && candidate.contains(a));
            let prompt_anchor = validated_anchor
                .map(str::to_string)
                .unwrap_or_else(|| tail_anchor(&candidate));

            // Deliberately appended to the existing conversation: prior
            // context carries the negotiated tone and style decisions.
            let prompt = prompts::continuation_prompt(&prompt_anchor);
            state.conversation.push(Message::user(prompt));
            let label = format!("{} continuation {}", step.title(), guard.attempts);
            let response = self.runner.call(state, self.model, &label).await?;
            state
                .conversation
                .push(Message::assistant(response.text.clone()));

            let cont_extraction = extract(&response.text, prompts::OUTPUT_TAG);
            let before_len = candidate.len();
            let (stitched, method) = splice(&candidate, &cont_extraction.text, validated_anchor);
            debug!(step = step.title(), ?method, "spliced continuation");

            guard.observe_growth(before_len, stitched.len());
            candidate = stitched;
            self.storage.write_artifact(step, &candidate)?;

            forced = detect_truncation(&response.text, prompts::OUTPUT_TAG);

            if let Some(reason) = guard.abort_reason() {
                warn!(
                    step = step.title(),
                    attempts = guard.attempts,
                    reason,
                    "aborting continuation; keeping best candidate"
                );
                break;
            }
        }

        Ok(clean_artifact_text(&candidate, prompts::OUTPUT_TAG))
    }

    /// Ask the verifier model whether the candidate covers the whole source.
    /// Runs on a fresh throwaway conversation; usage is still accumulated
    /// into the session totals. A verdict that cannot be parsed is treated
    /// as "complete" so a broken verifier can never drive an endless loop.
    async fn verify(
        &self,
        state: &mut SessionState,
        source: &str,
        candidate: &str,
    ) -> Result<Verdict, WorkflowError> {
        let messages = vec![Message::user(prompts::verifier_prompt(source, candidate))];
        let response = self
            .runner
            .call_detached(messages, self.verifier_model)
            .await?;
        state.record_usage(response.input_tokens, response.output_tokens, 0.0);

        let parsed = extract_json_object(&response.text)
            .and_then(|json| serde_json::from_str::<VerifierJson>(&json).ok());

        match parsed {
            Some(v) => Ok(Verdict {
                needs_continuation: !v.complete,
                target_anchor: v.last_translated_line,
                source_anchor: v.last_source_line,
            }),
            None => {
                warn!("verifier verdict unparseable; treating candidate as complete");
                Ok(Verdict {
                    needs_continuation: false,
                    target_anchor: None,
                    source_anchor: None,
                })
            }
        }
    }
}

/// Last non-empty line of the candidate, capped to its final
/// [`ANCHOR_TAIL_CHARS`] characters.
fn tail_anchor(candidate: &str) -> String {
    let line = candidate
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim();
    let chars: Vec<char> = line.chars().collect();
    if chars.len() > ANCHOR_TAIL_CHARS {
        chars[chars.len() - ANCHOR_TAIL_CHARS..].iter().collect()
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_aborts_after_three_no_growth_attempts() {
        let mut guard = ContinuationGuard::default();
        for _ in 0..2 {
            guard.attempts += 1;
            guard.observe_growth(500, 500);
            assert!(guard.abort_reason().is_none());
        }
        guard.attempts += 1;
        guard.observe_growth(500, 500);
        assert!(guard.abort_reason().is_some());
    }

    #[test]
    fn guard_aborts_after_two_low_growth_attempts() {
        let mut guard = ContinuationGuard::default();
        guard.observe_growth(500, 550);
        assert!(guard.abort_reason().is_none());
        guard.observe_growth(550, 560);
        assert!(guard.abort_reason().is_some());
    }

    #[test]
    fn guard_aborts_on_repeated_source_anchor() {
        let mut guard = ContinuationGuard::default();
        guard.observe_anchor(Some("line 42"));
        assert!(guard.abort_reason().is_none());
        guard.observe_anchor(Some("line 42"));
        assert!(guard.abort_reason().is_some());
    }

    #[test]
    fn guard_resets_streaks_on_real_progress() {
        let mut guard = ContinuationGuard::default();
        guard.observe_growth(500, 550);
        guard.observe_growth(550, 2_000);
        guard.observe_growth(2_000, 2_050);
        assert!(guard.abort_reason().is_none());

        guard.observe_anchor(Some("a"));
        guard.observe_anchor(Some("b"));
        guard.observe_anchor(Some("b"));
        assert!(guard.abort_reason().is_some());
    }

    #[test]
    fn forced_verdicts_do_not_touch_anchor_streak() {
        let mut guard = ContinuationGuard::default();
        guard.observe_anchor(None);
        guard.observe_anchor(None);
        assert_eq!(guard.same_anchor_streak, 0);
    }

    #[test]
    fn tail_anchor_takes_last_nonempty_line() {
        assert_eq!(tail_anchor("first\nsecond\n\n"), "second");
        assert_eq!(tail_anchor(""), "");
    }

    #[test]
    fn tail_anchor_caps_very_long_lines() {
        let long = "x".repeat(500);
        assert_eq!(tail_anchor(&long).chars().count(), ANCHOR_TAIL_CHARS);
    }

    mod loop_behavior {
        use super::*;
        use crate::completion::testing::ScriptedService;
        use crate::config::RetryPolicy;
        use std::path::Path;
        use std::sync::Arc;
        use std::time::Duration;
        use tempfile::tempdir;

        const GEN: &str = "gen-model";
        const VER: &str = "ver-model";
        const SOURCE: &str = "Line one. Line two and some more text here.";

        fn harness(service: Arc<ScriptedService>, dir: &Path) -> (CompletionRunner, Storage) {
            let storage = Storage::new(dir.join("artifacts"));
            storage.ensure_dirs().unwrap();
            let runner = CompletionRunner::new(
                service,
                RetryPolicy {
                    max_attempts: 2,
                    delay: Duration::from_millis(1),
                },
                dir.join("session.json"),
                0.7,
                8192,
                None,
            );
            (runner, storage)
        }

        #[tokio::test]
        async fn three_stalled_attempts_stop_the_loop() {
            let dir = tempdir().unwrap();
            let service = ScriptedService::new();
            let (runner, storage) = harness(service.clone(), dir.path());

            // The verifier keeps asking for more, each time from a different
            // place, while every continuation restates text already present.
            for anchor in ["s1", "s2", "s3"] {
                service.enqueue(
                    VER,
                    format!(r#"{{"complete": false, "last_source_line": "{anchor}"}}"#),
                );
                service.enqueue(GEN, "<translation>more text here.</translation>");
            }

            let engine = ContinuationEngine::new(&runner, &storage, GEN, VER);
            let mut state = SessionState::new("sys");
            let raw = "<translation>Line one. Line two and some more text here.</translation>";
            let result = engine
                .ensure_complete(&mut state, SOURCE, raw, Step::FirstDraft)
                .await
                .unwrap();

            // Three attempts, then the no-growth bound fires; no fourth call.
            assert_eq!(service.calls_for(GEN), 3);
            assert_eq!(service.calls_for(VER), 3);
            assert_eq!(result, "Line one. Line two and some more text here.");
        }

        #[tokio::test]
        async fn repeated_verifier_anchor_stops_the_loop() {
            let dir = tempdir().unwrap();
            let service = ScriptedService::new();
            let (runner, storage) = harness(service.clone(), dir.path());

            service.set_fallback(
                VER,
                r#"{"complete": false, "last_source_line": "the final line"}"#,
            );
            let fresh = format!("<translation>{}</translation>", "n".repeat(150));
            service.set_fallback(GEN, fresh);

            let engine = ContinuationEngine::new(&runner, &storage, GEN, VER);
            let mut state = SessionState::new("sys");
            let raw = "<translation>Line one. Line two and some more text here.</translation>";
            let result = engine
                .ensure_complete(&mut state, SOURCE, raw, Step::FirstDraft)
                .await
                .unwrap();

            // The second identical anchor terminates before a second attempt.
            assert_eq!(service.calls_for(GEN), 1);
            assert_eq!(service.calls_for(VER), 2);
            assert!(result.starts_with("Line one."));
            assert!(!result.is_empty());
        }

        #[tokio::test]
        async fn unclosed_tag_forces_continuation_without_verification() {
            let dir = tempdir().unwrap();
            let service = ScriptedService::new();
            let (runner, storage) = harness(service.clone(), dir.path());

            service.enqueue(GEN, "<translation>text here.</translation>");
            service.set_fallback(VER, r#"{"complete": true}"#);

            let engine = ContinuationEngine::new(&runner, &storage, GEN, VER);
            let mut state = SessionState::new("sys");
            let result = engine
                .ensure_complete(
                    &mut state,
                    SOURCE,
                    "<translation>Line one. Line two and some more",
                    Step::FirstDraft,
                )
                .await
                .unwrap();

            // One forced continuation, then one verification of the result.
            assert_eq!(service.calls_for(GEN), 1);
            assert_eq!(service.calls_for(VER), 1);
            assert_eq!(result, "Line one. Line two and some more\n\ntext here.");
        }

        #[tokio::test]
        async fn untagged_output_is_kept_and_logged_as_debug_artifact() {
            let dir = tempdir().unwrap();
            let service = ScriptedService::new();
            let (runner, storage) = harness(service.clone(), dir.path());
            service.set_fallback(VER, r#"{"complete": true}"#);

            let engine = ContinuationEngine::new(&runner, &storage, GEN, VER);
            let mut state = SessionState::new("sys");
            let result = engine
                .ensure_complete(&mut state, SOURCE, "Bare prose, no tags.", Step::Final)
                .await
                .unwrap();

            assert_eq!(result, "Bare prose, no tags.");
            let debug_file = dir
                .path()
                .join("artifacts/debug")
                .join(format!("{}_raw.txt", Step::Final.key()));
            assert!(debug_file.exists());
        }

        #[tokio::test]
        async fn unparseable_verdict_is_treated_as_complete() {
            let dir = tempdir().unwrap();
            let service = ScriptedService::new();
            let (runner, storage) = harness(service.clone(), dir.path());
            service.set_fallback(VER, "I cannot answer in JSON today.");

            let engine = ContinuationEngine::new(&runner, &storage, GEN, VER);
            let mut state = SessionState::new("sys");
            let result = engine
                .ensure_complete(
                    &mut state,
                    SOURCE,
                    "<translation>Whole text.</translation>",
                    Step::FirstDraft,
                )
                .await
                .unwrap();

            assert_eq!(result, "Whole text.");
            assert_eq!(service.calls_for(GEN), 0);
        }

        #[tokio::test]
        async fn verifier_usage_counts_toward_session_totals() {
            let dir = tempdir().unwrap();
            let service = ScriptedService::new();
            let (runner, storage) = harness(service.clone(), dir.path());
            service.set_fallback(VER, r#"{"complete": true}"#);

            let engine = ContinuationEngine::new(&runner, &storage, GEN, VER);
            let mut state = SessionState::new("sys");
            engine
                .ensure_complete(
                    &mut state,
                    SOURCE,
                    "<translation>Whole text.</translation>",
                    Step::FirstDraft,
                )
                .await
                .unwrap();

            assert!(state.totals.total_tokens() > 0);
        }
    }
}
