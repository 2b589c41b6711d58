//! The top-level state machine: ten ordered steps, persisted after every
//! step, resumable from the last completed step.
//!
//! All transitions are forward-only and idempotent with respect to resume:
//! re-running `resume_or_init` and calling steps at or below the persisted
//! step index is a no-op.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use tracing::{error, info, warn};

use super::runner::CompletionRunner;
use super::step::{Step, ALL_STEPS, ARTIFACT_PRIORITY};
use crate::completion::CompletionService;
use crate::config::Config;
use crate::errors::WorkflowError;
use crate::metrics::Metrics;
use crate::prompts;
use crate::session::{Message, SessionState};
use crate::stitch::ContinuationEngine;
use crate::storage::Storage;
use crate::ui::WorkflowUI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The persisted step index already covers this step.
    Skipped,
    Completed,
}

pub struct WorkflowController {
    config: Config,
    storage: Storage,
    runner: CompletionRunner,
    state: SessionState,
    source: String,
    ui: Option<Arc<WorkflowUI>>,
}

impl WorkflowController {
    pub fn new(
        config: Config,
        service: Arc<dyn CompletionService>,
    ) -> Result<Self, WorkflowError> {
        let source = fs::read_to_string(&config.input_path).map_err(|e| {
            WorkflowError::SourceReadFailed {
                path: config.input_path.clone(),
                source: e,
            }
        })?;

        let storage = Storage::new(config.artifacts_dir());
        storage.ensure_dirs().map_err(WorkflowError::Other)?;

        let runner = CompletionRunner::new(
            service,
            config.retry,
            config.session_path(),
            config.temperature,
            config.max_output_tokens,
            config.reasoning_effort,
        );

        let state = resume_or_init(&config, &storage);

        let mut metrics = Metrics::load_or_default(&config.metrics_path());
        metrics.record("source", &source);
        if let Err(e) = metrics.save(&config.metrics_path()) {
            warn!(error = %e, "metrics write failed");
        }

        Ok(Self {
            config,
            storage,
            runner,
            state,
            source,
            ui: None,
        })
    }

    pub fn with_ui(mut self, ui: Arc<WorkflowUI>) -> Self {
        self.ui = Some(ui);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The workflow is done at index 10, or 9 when external review is
    /// skipped.
    pub fn is_complete(&self) -> bool {
        let done_at = if self.config.skip_review { 9 } else { 10 };
        self.state.step_index >= done_at
    }

    /// Run all remaining steps and write the final output file. On any
    /// unrecoverable failure the most advanced artifact is saved to the
    /// final output path before the error propagates.
    pub async fn run(&mut self) -> Result<PathBuf, WorkflowError> {
        for step in ALL_STEPS {
            if self.config.skip_review && step == Step::ExternalReview {
                continue;
            }
            match self.run_step(step).await {
                Ok(StepOutcome::Skipped) => {
                    if let Some(ui) = &self.ui {
                        ui.step_skipped(step.title());
                    }
                }
                Ok(StepOutcome::Completed) => {
                    if let Some(ui) = &self.ui {
                        ui.step_done(step.title());
                    }
                }
                Err(err) => {
                    self.best_effort_save();
                    return Err(err);
                }
            }
        }
        self.write_final_output()
    }

    /// Execute one step unless the persisted index already covers it.
    pub async fn run_step(&mut self, step: Step) -> Result<StepOutcome, WorkflowError> {
        let target = self.effective_index(step);
        if self.state.step_index >= target {
            return Ok(StepOutcome::Skipped);
        }

        if let Some(ui) = &self.ui {
            ui.start_step(step.ordinal(), step.title());
        }
        info!(step = step.title(), ordinal = step.ordinal(), "running step");

        let text = match step {
            Step::ExternalReview => self.run_review().await?,
            Step::Refinement => self.run_refinement().await?,
            _ => self.run_translation(step).await?,
        };

        // Artifact and session are both durable before the index advances;
        // every step boundary is a safe resume point.
        self.storage.write_artifact(step, &text)?;

        let mut metrics = Metrics::load_or_default(&self.config.metrics_path());
        metrics.record(step.key(), &text);
        if let Err(e) = metrics.save(&self.config.metrics_path()) {
            warn!(error = %e, "metrics write failed");
        }

        // The label's ordinal mirrors the recorded index, so a skipped
        // review leaves both at 9.
        self.state.step_index = target;
        self.state.label = format!("{:02} {}", target, step.title());
        self.state.save(&self.config.session_path())?;

        Ok(StepOutcome::Completed)
    }

    /// Step index recorded on completion. With review skipped the run
    /// finishes at index 9.
    fn effective_index(&self, step: Step) -> u32 {
        if self.config.skip_review && step == Step::Refinement {
            9
        } else {
            step.ordinal()
        }
    }

    async fn run_translation(&mut self, step: Step) -> Result<String, WorkflowError> {
        let prompt = self.user_prompt_for(step);

        if step.injects_large_content() {
            let system = self.translator_system();
            self.runner
                .window()
                .maybe_reset(&mut self.state, &prompt, &self.config.model, &system);
        }

        self.state.conversation.push(Message::user(prompt));
        let response = self
            .runner
            .call(&mut self.state, &self.config.model, step.title())
            .await?;
        self.state
            .conversation
            .push(Message::assistant(response.text.clone()));

        if step.needs_stitching() {
            let engine = ContinuationEngine::new(
                &self.runner,
                &self.storage,
                &self.config.model,
                &self.config.verifier_model,
            );
            engine
                .ensure_complete(&mut self.state, &self.source, &response.text, step)
                .await
        } else {
            Ok(response.text.trim().to_string())
        }
    }

    /// Step 9: independent review on a fresh conversation, isolated from
    /// the translator's accumulated context.
    async fn run_review(&mut self) -> Result<String, WorkflowError> {
        let translation = self.storage.read_artifact(Step::Final).ok_or_else(|| {
            WorkflowError::Other(anyhow!("final translation artifact missing before review"))
        })?;

        self.state
            .reset_conversation(prompts::reviewer_system(&self.config.target_lang));
        self.state
            .conversation
            .push(Message::user(prompts::external_review_prompt(
                &self.source,
                &translation,
            )));
        let response = self
            .runner
            .call(&mut self.state, &self.config.model, Step::ExternalReview.title())
            .await?;
        self.state
            .conversation
            .push(Message::assistant(response.text.clone()));

        Ok(response.text.trim().to_string())
    }

    /// Step 10: refinement incorporating the external review, or a
    /// pass-through of step 8's output when review was skipped.
    async fn run_refinement(&mut self) -> Result<String, WorkflowError> {
        let final_text = self.storage.read_artifact(Step::Final).ok_or_else(|| {
            WorkflowError::Other(anyhow!("final translation artifact missing before refinement"))
        })?;

        if self.config.skip_review {
            info!("review skipped; refined final is a pass-through of the final translation");
            return Ok(final_text);
        }

        let review = self.storage.read_artifact(Step::ExternalReview).ok_or_else(|| {
            WorkflowError::Other(anyhow!("external review artifact missing before refinement"))
        })?;

        self.state
            .reset_conversation(prompts::reviewer_system(&self.config.target_lang));
        self.state
            .conversation
            .push(Message::user(prompts::refinement_prompt(&final_text, &review)));
        let response = self
            .runner
            .call(&mut self.state, &self.config.model, Step::Refinement.title())
            .await?;
        self.state
            .conversation
            .push(Message::assistant(response.text.clone()));

        let engine = ContinuationEngine::new(
            &self.runner,
            &self.storage,
            &self.config.model,
            &self.config.verifier_model,
        );
        engine
            .ensure_complete(&mut self.state, &self.source, &response.text, Step::Refinement)
            .await
    }

    fn user_prompt_for(&self, step: Step) -> String {
        match step {
            Step::Analysis => prompts::analysis_prompt(&self.source),
            Step::Expression => prompts::expression_prompt(),
            Step::Cultural => prompts::cultural_prompt(),
            Step::Title => prompts::title_prompt(),
            Step::FirstDraft => prompts::first_draft_prompt(&self.source),
            Step::SelfCritique => prompts::self_critique_prompt(),
            Step::SecondRefinement => prompts::second_refinement_prompt(),
            Step::Final => {
                let prior = self.latest_draft().unwrap_or_default();
                prompts::final_translation_prompt(&self.source, &prior)
            }
            Step::ExternalReview | Step::Refinement => {
                unreachable!("review steps build their own prompts")
            }
        }
    }

    /// Most recent draft available on disk, for the final-review prompt.
    fn latest_draft(&self) -> Option<String> {
        [Step::SecondRefinement, Step::SelfCritique, Step::FirstDraft]
            .iter()
            .find_map(|step| self.storage.read_artifact(*step))
    }

    fn translator_system(&self) -> String {
        prompts::translator_system(
            &self.config.target_lang,
            &self.config.source_lang,
            self.config.custom_instructions.as_deref(),
        )
    }

    fn write_final_output(&self) -> Result<PathBuf, WorkflowError> {
        let text = self
            .storage
            .read_artifact(Step::Refinement)
            .or_else(|| self.storage.most_advanced_artifact(&ARTIFACT_PRIORITY).map(|(_, t)| t))
            .ok_or_else(|| WorkflowError::Other(anyhow!("no artifact to write as final output")))?;

        let path = self.config.final_output_path();
        fs::write(&path, &text).map_err(|e| WorkflowError::ArtifactWriteFailed {
            path: path.clone(),
            source: e,
        })?;
        info!(path = %path.display(), "final output written");
        Ok(path)
    }

    /// On a fatal failure, still put the best available translation at the
    /// final output path so paid-for work is not lost.
    fn best_effort_save(&self) {
        match self.storage.most_advanced_artifact(&ARTIFACT_PRIORITY) {
            Some((step, text)) => {
                let path = self.config.final_output_path();
                match fs::write(&path, &text) {
                    Ok(()) => warn!(
                        artifact = step.title(),
                        path = %path.display(),
                        "saved best available translation before exiting"
                    ),
                    Err(e) => error!(error = %e, "best-effort save failed"),
                }
            }
            None => warn!("no artifact available for best-effort save"),
        }
    }
}

/// Restore the session if the file exists and parses; otherwise start fresh.
/// The on-disk artifact set is cross-checked against the session's step
/// counter, with the JSON file authoritative.
fn resume_or_init(config: &Config, storage: &Storage) -> SessionState {
    let path = config.session_path();
    if path.exists() {
        match SessionState::load(&path) {
            Ok(state) => {
                let on_disk = storage.completed_ordinals();
                if let Some(max) = on_disk.iter().max() {
                    if *max > state.step_index {
                        let ahead = Step::from_ordinal(*max)
                            .map(|s| s.title())
                            .unwrap_or("unknown step");
                        warn!(
                            session_step = state.step_index,
                            artifact_step = max,
                            artifact = ahead,
                            "artifacts on disk are ahead of the session file; session wins"
                        );
                    }
                }
                info!(
                    step = state.step_index,
                    artifacts = on_disk.len(),
                    "resuming session"
                );
                return state;
            }
            Err(err) => warn!(error = %err, "session file unusable; starting fresh"),
        }
    }

    SessionState::new(prompts::translator_system(
        &config.target_lang,
        &config.source_lang,
        config.custom_instructions.as_deref(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::testing::ScriptedService;
    use crate::config::RetryPolicy;
    use crate::session::Role;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    const GEN: &str = "gen-model";
    const VER: &str = "ver-model";
    const TAGGED_TRANSLATION: &str =
        "<translation>Le soleil se levait sur les collines.\n\nLes oiseaux chantaient.</translation>";
    const VERDICT_COMPLETE: &str = r#"{"complete": true}"#;

    fn setup(skip_review: bool) -> (Config, Arc<ScriptedService>, TempDir) {
        let dir = tempdir().unwrap();
        let input = dir.path().join("novel.txt");
        fs::write(&input, "The sun rose over the hills.\n\nBirds sang.").unwrap();

        let mut config = Config::new(input, "English", "French", GEN).unwrap();
        config.verifier_model = VER.to_string();
        config.skip_review = skip_review;
        config.retry = RetryPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(1),
        };

        let service = ScriptedService::new();
        service.set_fallback(GEN, TAGGED_TRANSLATION);
        service.set_fallback(VER, VERDICT_COMPLETE);
        (config, service, dir)
    }

    #[tokio::test]
    async fn full_run_completes_all_ten_steps() {
        let (config, service, _dir) = setup(false);
        let mut controller = WorkflowController::new(config.clone(), service.clone()).unwrap();

        let output = controller.run().await.unwrap();
        assert!(output.exists());
        assert_eq!(controller.state().step_index, 10);
        assert!(controller.is_complete());

        // One generation call per step, one verification per stitched step.
        assert_eq!(service.calls_for(GEN), 10);
        assert_eq!(service.calls_for(VER), 5);

        // Final output is the cleaned refined translation, tags stripped.
        let text = fs::read_to_string(&output).unwrap();
        assert!(text.contains("Le soleil se levait"));
        assert!(!text.contains("<translation>"));

        // Every step artifact exists on disk.
        let storage = Storage::new(config.artifacts_dir());
        assert_eq!(storage.completed_ordinals().len(), 10);
    }

    #[tokio::test]
    async fn skip_review_completes_at_index_nine_with_pass_through() {
        let (config, service, _dir) = setup(true);
        let mut controller = WorkflowController::new(config.clone(), service.clone()).unwrap();

        controller.run().await.unwrap();
        assert_eq!(controller.state().step_index, 9);
        // The label ordinal must agree with the recorded index.
        assert_eq!(controller.state().label, "09 Refined Final");
        assert!(controller.is_complete());

        // 8 generation calls: review and refinement made none.
        assert_eq!(service.calls_for(GEN), 8);

        let storage = Storage::new(config.artifacts_dir());
        assert_eq!(
            storage.read_artifact(Step::Refinement),
            storage.read_artifact(Step::Final),
        );
        assert!(storage.read_artifact(Step::ExternalReview).is_none());
    }

    #[tokio::test]
    async fn resume_or_init_is_idempotent() {
        let (config, service, _dir) = setup(false);

        let mut first = WorkflowController::new(config.clone(), service.clone()).unwrap();
        first.run_step(Step::Analysis).await.unwrap();
        first.run_step(Step::Expression).await.unwrap();
        let persisted = first.state().clone();

        let second = WorkflowController::new(config.clone(), service.clone()).unwrap();
        let third = WorkflowController::new(config, service).unwrap();
        assert_eq!(second.state(), &persisted);
        assert_eq!(third.state(), &persisted);
    }

    #[tokio::test]
    async fn rerunning_a_completed_workflow_makes_no_calls() {
        let (config, service, _dir) = setup(false);
        WorkflowController::new(config.clone(), service.clone())
            .unwrap()
            .run()
            .await
            .unwrap();
        let calls_after_first = service.calls_for(GEN) + service.calls_for(VER);

        let mut again = WorkflowController::new(config, service.clone()).unwrap();
        again.run().await.unwrap();
        assert_eq!(service.calls_for(GEN) + service.calls_for(VER), calls_after_first);
    }

    #[tokio::test]
    async fn session_at_step_five_resumes_into_step_six() {
        let (config, service, _dir) = setup(false);

        // Simulate an interrupted run: session says step 5 is done and the
        // step-5 artifact is on disk.
        let storage = Storage::new(config.artifacts_dir());
        storage.ensure_dirs().unwrap();
        storage
            .write_artifact(Step::FirstDraft, "Le premier jet.")
            .unwrap();
        let mut state = SessionState::new("sys");
        state.step_index = 5;
        state.save(&config.session_path()).unwrap();

        let mut controller = WorkflowController::new(config, service.clone()).unwrap();
        controller.run().await.unwrap();

        // Steps 6, 7, 8, 9, 10 each made one generation call; 1-5 none.
        assert_eq!(service.calls_for(GEN), 5);
        for request in service.requests() {
            for message in &request.messages {
                assert!(
                    !message.content.contains("analyze this text"),
                    "step 1 prompt must not be re-issued on resume"
                );
            }
        }
    }

    #[tokio::test]
    async fn session_wins_when_artifacts_are_ahead_of_it() {
        let (config, service, _dir) = setup(false);

        // Artifact 02 on disk, but the session only records step 1.
        let storage = Storage::new(config.artifacts_dir());
        storage.ensure_dirs().unwrap();
        storage
            .write_artifact(Step::Expression, "stale exploration")
            .unwrap();
        let mut state = SessionState::new("sys");
        state.step_index = 1;
        state.save(&config.session_path()).unwrap();

        let controller = WorkflowController::new(config, service).unwrap();
        assert_eq!(controller.state().step_index, 1);
    }

    #[tokio::test]
    async fn truncated_draft_is_stitched_before_acceptance() {
        let (config, service, _dir) = setup(true);
        // Steps 1-4 are discursive.
        for _ in 0..4 {
            service.enqueue(GEN, "Discussion of the text.");
        }
        // Step 5 arrives truncated: opening tag, no closing tag.
        service.enqueue(GEN, "<translation>Chapter 1. The sun rose.");
        // The forced continuation completes the text.
        service.enqueue(GEN, "<translation>rose. Birds sang.</translation>");

        let mut controller = WorkflowController::new(config.clone(), service.clone()).unwrap();
        controller.run().await.unwrap();

        let storage = Storage::new(config.artifacts_dir());
        let draft = storage.read_artifact(Step::FirstDraft).unwrap();
        assert_eq!(draft, "Chapter 1. The sun rose. Birds sang.");
        // No duplicated overlap.
        assert_eq!(draft.matches("rose.").count(), 1);
    }

    #[tokio::test]
    async fn forced_reset_before_final_step_yields_fresh_conversation() {
        let (config, service, dir) = setup(true);
        // A source large enough that step 8's prompt (source + prior draft)
        // cannot fit half the default 16K budget of an unknown model.
        let big_source = "word ".repeat(10_000);
        fs::write(dir.path().join("novel.txt"), &big_source).unwrap();

        let storage = Storage::new(config.artifacts_dir());
        storage.ensure_dirs().unwrap();
        storage.write_artifact(Step::SecondRefinement, "draft").unwrap();
        let mut state = SessionState::new("sys");
        state.push_exchange("earlier question", "earlier answer");
        state.step_index = 7;
        state.save(&config.session_path()).unwrap();

        let mut controller = WorkflowController::new(config, service).unwrap();
        controller.run_step(Step::Final).await.unwrap();

        // After reset + exchange: exactly one system message at position 0,
        // one user message, one assistant reply.
        let conversation = &controller.state().conversation;
        assert_eq!(conversation.len(), 3);
        assert_eq!(conversation[0].role, Role::System);
        assert_eq!(conversation[1].role, Role::User);
        assert!(conversation[0].content.contains("literary translator"));
    }

    #[tokio::test]
    async fn fatal_failure_saves_most_advanced_artifact() {
        let (config, service, _dir) = setup(false);

        let storage = Storage::new(config.artifacts_dir());
        storage.ensure_dirs().unwrap();
        storage.write_artifact(Step::FirstDraft, "best so far").unwrap();
        let mut state = SessionState::new("sys");
        state.step_index = 5;
        state.save(&config.session_path()).unwrap();

        // Step 6 fails permanently.
        service.enqueue_error(crate::errors::CompletionError::InvalidRequest {
            status: 400,
            message: "model gone".to_string(),
        });

        let mut controller = WorkflowController::new(config.clone(), service).unwrap();
        let err = controller.run().await.unwrap_err();
        assert!(matches!(err, WorkflowError::Completion(_)));

        let rescue = fs::read_to_string(config.final_output_path()).unwrap();
        assert_eq!(rescue, "best so far");
    }

    #[tokio::test]
    async fn corrupt_session_file_starts_fresh() {
        let (config, service, _dir) = setup(false);
        fs::create_dir_all(config.work_dir.clone()).unwrap();
        fs::write(config.session_path(), "{ broken").unwrap();

        let controller = WorkflowController::new(config, service).unwrap();
        assert_eq!(controller.state().step_index, 0);
        assert_eq!(controller.state().conversation.len(), 1);
    }

    #[tokio::test]
    async fn metrics_are_recorded_per_step() {
        let (config, service, _dir) = setup(true);
        let mut controller = WorkflowController::new(config.clone(), service).unwrap();
        controller.run().await.unwrap();

        let metrics = Metrics::load_or_default(&config.metrics_path());
        assert!(metrics.get("source").is_some());
        assert!(metrics.get(Step::FirstDraft.key()).is_some());
        assert!(metrics.get(Step::Final.key()).is_some());
    }
}
