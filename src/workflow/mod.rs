//! The workflow controller and its supporting pieces: the ten-step state
//! machine, the retrying completion runner, and the step enum.

mod controller;
mod runner;
mod step;

pub use controller::{StepOutcome, WorkflowController};
pub use runner::CompletionRunner;
pub use step::{Step, ALL_STEPS, ARTIFACT_PRIORITY};
