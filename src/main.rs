use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "verso")]
#[command(version, about = "Multi-pass literary translation powered by LLMs")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Translate a document, resuming from the last completed step
    Run {
        /// Path to the source document
        input: PathBuf,

        /// Target language (e.g. "French", "Simplified Chinese")
        #[arg(short, long)]
        to: String,

        /// Source language
        #[arg(short, long, default_value = "the original language")]
        from: String,

        /// Model for translation steps
        #[arg(short, long, default_value = "gpt-5-mini")]
        model: String,

        /// Model for completion-verification calls (defaults to --model)
        #[arg(long)]
        verifier_model: Option<String>,

        #[arg(long, default_value = "0.7")]
        temperature: f32,

        #[arg(long, default_value = "16384")]
        max_output_tokens: u32,

        /// Reasoning effort for models that support it: low, medium, high
        #[arg(long)]
        reasoning_effort: Option<String>,

        /// Extra instructions appended to the translator system prompt
        #[arg(long)]
        instructions: Option<String>,

        /// Skip the external review step (finishes after the final draft)
        #[arg(long)]
        skip_review: bool,

        /// Retry attempts per provider call
        #[arg(long, default_value = "3")]
        max_retries: u32,

        /// Seconds to wait between retries
        #[arg(long, default_value = "5")]
        retry_delay: u64,
    },
    /// Show step progress and usage totals for a document
    Status {
        /// Path to the source document
        input: PathBuf,
    },
    /// Delete session state for a document (artifacts retained unless --all)
    Reset {
        /// Path to the source document
        input: PathBuf,

        /// Also delete artifacts and metrics
        #[arg(long)]
        all: bool,

        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("verso=debug")
        } else {
            EnvFilter::new("verso=warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Run {
            input,
            to,
            from,
            model,
            verifier_model,
            temperature,
            max_output_tokens,
            reasoning_effort,
            instructions,
            skip_review,
            max_retries,
            retry_delay,
        } => {
            let args = cmd::RunArgs {
                input: input.clone(),
                to: to.clone(),
                from: from.clone(),
                model: model.clone(),
                verifier_model: verifier_model.clone(),
                temperature: *temperature,
                max_output_tokens: *max_output_tokens,
                reasoning_effort: reasoning_effort.clone(),
                instructions: instructions.clone(),
                skip_review: *skip_review,
                max_retries: *max_retries,
                retry_delay: *retry_delay,
            };
            cmd::cmd_run(args, cli.verbose).await?;
        }
        Commands::Status { input } => cmd::cmd_status(input)?,
        Commands::Reset { input, all, force } => cmd::cmd_reset(input, *force, *all)?,
    }
    Ok(())
}
