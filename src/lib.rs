//! Verso: a multi-pass literary translation orchestrator.
//!
//! A translation run is a fixed sequence of ten steps (analysis, expression
//! review, cultural adaptation, title work, then iterated drafts, external
//! review, and a final refinement), executed against an OpenAI-compatible
//! chat API. Three subsystems keep long documents tractable:
//!
//! - [`workflow`]: the step state machine, with resume from a persisted
//!   session after any completed step
//! - [`context`]: token budget estimation, trimming, and conversation
//!   resets so large texts fit the model's window
//! - [`stitch`]: truncation detection, completion verification, and
//!   anchor-based splicing of continuation rounds

pub mod completion;
pub mod config;
pub mod context;
pub mod errors;
pub mod metrics;
pub mod prompts;
pub mod session;
pub mod stitch;
pub mod storage;
pub mod ui;
pub mod util;
pub mod workflow;
