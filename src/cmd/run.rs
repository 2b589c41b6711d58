//! The main translation workflow — `verso run <input> --to <language>`.

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub struct RunArgs {
    pub input: PathBuf,
    pub to: String,
    pub from: String,
    pub model: String,
    pub verifier_model: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub reasoning_effort: Option<String>,
    pub instructions: Option<String>,
    pub skip_review: bool,
    pub max_retries: u32,
    pub retry_delay: u64,
}

pub async fn cmd_run(args: RunArgs, verbose: bool) -> Result<()> {
    use verso::completion::{CompletionService, OpenAiClient, ReasoningEffort};
    use verso::config::{Config, RetryPolicy};
    use verso::ui::WorkflowUI;
    use verso::workflow::WorkflowController;

    let mut config = Config::new(args.input, args.from, args.to, args.model)?;
    if let Some(verifier) = args.verifier_model {
        config.verifier_model = verifier;
    }
    config.temperature = args.temperature;
    config.max_output_tokens = args.max_output_tokens;
    config.reasoning_effort = args
        .reasoning_effort
        .as_deref()
        .map(|s| s.parse::<ReasoningEffort>().map_err(|e| anyhow!(e)))
        .transpose()?;
    config.custom_instructions = args.instructions;
    config.skip_review = args.skip_review;
    config.retry = RetryPolicy {
        max_attempts: args.max_retries.max(1),
        delay: Duration::from_secs(args.retry_delay),
    };

    let service: Arc<dyn CompletionService> = Arc::new(OpenAiClient::from_env()?);
    let total_steps = if config.skip_review { 9 } else { 10 };
    let ui = Arc::new(WorkflowUI::new(total_steps, verbose));

    let mut controller = WorkflowController::new(config, service)?.with_ui(ui.clone());
    let output = controller.run().await?;
    ui.finish("translation complete");

    let totals = &controller.state().totals;
    println!();
    println!("Final translation: {}", output.display());
    println!(
        "Usage: {} input tokens, {} output tokens (est. ${:.4})",
        totals.input_tokens, totals.output_tokens, totals.estimated_cost
    );
    Ok(())
}
