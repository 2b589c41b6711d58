//! Retrying wrapper around the completion service.
//!
//! Every provider call in the workflow goes through here: the conversation
//! is budget-checked before the call, failures are classified, a
//! context-length error triggers one selective prune before its retry,
//! transient errors wait and retry up to the configured bound, and session
//! state is persisted with an error label before every wait so a crash
//! mid-backoff loses nothing.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::completion::{
    pricing, CompletionRequest, CompletionResponse, CompletionService, ReasoningEffort,
};
use crate::config::RetryPolicy;
use crate::context::ContextWindow;
use crate::errors::{CompletionError, WorkflowError};
use crate::session::{Message, SessionState};

pub struct CompletionRunner {
    service: Arc<dyn CompletionService>,
    window: ContextWindow,
    retry: RetryPolicy,
    session_path: PathBuf,
    temperature: f32,
    max_output_tokens: u32,
    reasoning_effort: Option<ReasoningEffort>,
}

impl CompletionRunner {
    pub fn new(
        service: Arc<dyn CompletionService>,
        retry: RetryPolicy,
        session_path: PathBuf,
        temperature: f32,
        max_output_tokens: u32,
        reasoning_effort: Option<ReasoningEffort>,
    ) -> Self {
        Self {
            service,
            window: ContextWindow::default(),
            retry,
            session_path,
            temperature,
            max_output_tokens,
            reasoning_effort,
        }
    }

    pub fn window(&self) -> &ContextWindow {
        &self.window
    }

    /// Call the provider on the session's live conversation. The response's
    /// usage is accumulated into the session totals.
    pub async fn call(
        &self,
        state: &mut SessionState,
        model: &str,
        label: &str,
    ) -> Result<CompletionResponse, WorkflowError> {
        self.window.precheck(&mut state.conversation, model);

        let mut pruned = false;
        let mut last_error: Option<CompletionError> = None;

        let mut attempt = 1u32;
        while attempt <= self.retry.max_attempts {
            let request = self.build_request(state.conversation.clone(), model);
            match self.service.complete(request).await {
                Ok(response) => {
                    let cost =
                        pricing::estimate_cost(model, response.input_tokens, response.output_tokens);
                    state.record_usage(response.input_tokens, response.output_tokens, cost);
                    info!(
                        model,
                        label,
                        input_tokens = response.input_tokens,
                        output_tokens = response.output_tokens,
                        duration_ms = response.duration.as_millis() as u64,
                        "completion call succeeded"
                    );
                    return Ok(response);
                }
                Err(err) if err.is_context_overflow() && !pruned => {
                    // Selective pruning, then one immediate retry that does
                    // not consume an attempt. A recurrence is treated as
                    // transient below.
                    warn!(model, label, "context length exceeded; pruning conversation");
                    self.window.prune_after_overflow(&mut state.conversation);
                    pruned = true;
                    last_error = Some(err);
                }
                Err(err) if err.is_transient() || err.is_context_overflow() => {
                    warn!(model, label, attempt, error = %err, "completion call failed");
                    if attempt < self.retry.max_attempts {
                        state.label = format!("{label} (retry after: {err})");
                        if let Err(save_err) = state.save(&self.session_path) {
                            warn!(error = %save_err, "session save before retry failed");
                        }
                        tokio::time::sleep(self.retry.delay).await;
                    }
                    last_error = Some(err);
                    attempt += 1;
                }
                Err(err) => return Err(WorkflowError::Completion(err)),
            }
        }

        Err(WorkflowError::RetriesExhausted {
            attempts: self.retry.max_attempts,
            source: last_error.unwrap_or(CompletionError::Config(
                "retry loop exited without an error".to_string(),
            )),
        })
    }

    /// Call the provider on a throwaway conversation that is not part of the
    /// session (verifier calls). Bounded retry, no pruning, no persistence.
    pub async fn call_detached(
        &self,
        messages: Vec<Message>,
        model: &str,
    ) -> Result<CompletionResponse, WorkflowError> {
        let mut last_error: Option<CompletionError> = None;

        for attempt in 1..=self.retry.max_attempts {
            let request = self.build_request(messages.clone(), model);
            match self.service.complete(request).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_transient() => {
                    warn!(model, attempt, error = %err, "detached call failed");
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                    last_error = Some(err);
                }
                Err(err) => return Err(WorkflowError::Completion(err)),
            }
        }

        Err(WorkflowError::RetriesExhausted {
            attempts: self.retry.max_attempts,
            source: last_error.unwrap_or(CompletionError::Config(
                "retry loop exited without an error".to_string(),
            )),
        })
    }

    fn build_request(&self, messages: Vec<Message>, model: &str) -> CompletionRequest {
        let mut request = CompletionRequest::new(messages, model)
            .with_temperature(self.temperature)
            .with_max_output_tokens(self.max_output_tokens);
        if let Some(effort) = self.reasoning_effort {
            request = request.with_reasoning_effort(effort);
        }
        request
    }
}
