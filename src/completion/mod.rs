//! Completion provider gateway.
//!
//! The [`CompletionService`] trait is the single seam between the workflow
//! and the network: the production implementation is the OpenAI-compatible
//! [`OpenAiClient`], and tests substitute a scripted mock.

mod openai;
pub mod pricing;
mod types;

pub use openai::OpenAiClient;
pub use types::{CompletionRequest, CompletionResponse, ReasoningEffort};

use crate::errors::CompletionError;

#[async_trait::async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError>;
}
