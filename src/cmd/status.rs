//! Progress report for a document — `verso status <input>`.

use anyhow::Result;
use std::path::Path;

pub fn cmd_status(input: &Path) -> Result<()> {
    use verso::config::Config;
    use verso::session::SessionState;
    use verso::storage::Storage;
    use verso::workflow::ALL_STEPS;

    let work_dir = Config::work_dir_for(input)?;
    let session_path = work_dir.join("session.json");

    println!();
    println!("Verso Translation Status");
    println!("========================");
    println!();
    println!("Document: {}", input.display());

    if !session_path.exists() {
        println!("Session:  none (run 'verso run' to start)");
        println!();
        return Ok(());
    }

    let state = SessionState::load(&session_path)?;
    let storage = Storage::new(work_dir.join("artifacts"));
    let on_disk = storage.completed_ordinals();

    println!("Session:  step {} of 10", state.step_index);
    println!();
    for step in ALL_STEPS {
        let marker = if step.ordinal() <= state.step_index {
            "done"
        } else if on_disk.contains(&step.ordinal()) {
            "partial"
        } else {
            "pending"
        };
        println!("  {:>2}. {:<22} {}", step.ordinal(), step.title(), marker);
    }
    println!();
    println!(
        "Tokens:   {} in / {} out",
        state.totals.input_tokens, state.totals.output_tokens
    );
    println!("Cost:     ${:.4} (estimated)", state.totals.estimated_cost);
    if !state.label.is_empty() {
        println!("Last:     {}", state.label);
    }
    println!();
    Ok(())
}
