//! Session state: the unit of resumability.
//!
//! A [`SessionState`] owns the live conversation, the step counter, and the
//! accumulated token/cost totals. It is persisted after every mutating event
//! as JSON (authoritative for resume) plus a human-readable transcript mirror
//! for inspection. Persistence is atomic: write to a temp file, then rename.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::errors::WorkflowError;

/// Role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in the conversation. Insertion order is meaningful: the
/// vector is literally the prompt history sent to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Monotonically non-decreasing usage counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost: f64,
}

impl Totals {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Full resumable state of one translation run.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// Prompt history. At most one system message, always at position 0.
    pub conversation: Vec<Message>,
    /// 0 = not started, 10 = all steps complete (9 if review is skipped).
    pub step_index: u32,
    pub totals: Totals,
    /// Description of the last completed or attempted action. Debugging aid
    /// only, never used for control flow.
    pub label: String,
}

/// On-disk session format.
#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    metadata: SessionMetadata,
    conversation: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionMetadata {
    timestamp: DateTime<Utc>,
    label: String,
    step: u32,
    total_tokens: u64,
    total_input_tokens: u64,
    total_output_tokens: u64,
    estimated_cost: f64,
}

impl SessionState {
    /// Fresh session: a single system message, step 0.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            conversation: vec![Message::system(system_prompt)],
            step_index: 0,
            totals: Totals::default(),
            label: "initialized".to_string(),
        }
    }

    /// Append a user/assistant exchange.
    pub fn push_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.conversation.push(Message::user(user));
        self.conversation.push(Message::assistant(assistant));
    }

    /// Replace the conversation with a single fresh system message. Used for
    /// context resets before steps that inject very large content.
    pub fn reset_conversation(&mut self, system_prompt: impl Into<String>) {
        self.conversation = vec![Message::system(system_prompt)];
    }

    /// Accumulate usage from one provider call.
    pub fn record_usage(&mut self, input_tokens: u64, output_tokens: u64, cost: f64) {
        self.totals.input_tokens += input_tokens;
        self.totals.output_tokens += output_tokens;
        self.totals.estimated_cost += cost;
    }

    /// The system message content, if the conversation carries one.
    pub fn system_prompt(&self) -> Option<&str> {
        self.conversation
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// Persist to `path` (JSON, atomic) and mirror a transcript next to it.
    pub fn save(&self, path: &Path) -> Result<(), WorkflowError> {
        let file = SessionFile {
            metadata: SessionMetadata {
                timestamp: Utc::now(),
                label: self.label.clone(),
                step: self.step_index,
                total_tokens: self.totals.total_tokens(),
                total_input_tokens: self.totals.input_tokens,
                total_output_tokens: self.totals.output_tokens,
                estimated_cost: self.totals.estimated_cost,
            },
            conversation: self.conversation.clone(),
        };

        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| WorkflowError::Other(anyhow::anyhow!("session serialize: {e}")))?;
        write_atomic(path, &json).map_err(|source| WorkflowError::SessionPersistFailed {
            path: path.to_path_buf(),
            source,
        })?;

        // Transcript mirror is best-effort: a failure here must not lose the
        // authoritative JSON that was just written.
        let transcript_path = path.with_extension("md");
        if let Err(e) = fs::write(&transcript_path, self.render_transcript()) {
            tracing::warn!(path = %transcript_path.display(), error = %e, "transcript mirror write failed");
        }

        Ok(())
    }

    /// Restore from a session file written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, WorkflowError> {
        let content = fs::read_to_string(path).map_err(|source| {
            WorkflowError::SessionPersistFailed {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let file: SessionFile =
            serde_json::from_str(&content).map_err(|e| WorkflowError::SessionCorrupt {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        Ok(Self {
            conversation: file.conversation,
            step_index: file.metadata.step,
            totals: Totals {
                input_tokens: file.metadata.total_input_tokens,
                output_tokens: file.metadata.total_output_tokens,
                estimated_cost: file.metadata.estimated_cost,
            },
            label: file.metadata.label,
        })
    }

    fn render_transcript(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "# Session transcript\n\nStep: {}  |  Tokens: {} in / {} out  |  Est. cost: ${:.4}\n",
            self.step_index,
            self.totals.input_tokens,
            self.totals.output_tokens,
            self.totals.estimated_cost
        ));
        for msg in &self.conversation {
            out.push_str(&format!("\n## {}\n\n{}\n", msg.role.as_str(), msg.content));
        }
        out
    }
}

/// Write-temp-then-rename so a crash mid-write cannot corrupt the resume file.
fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)
}
