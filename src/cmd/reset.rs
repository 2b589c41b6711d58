//! Wipe a document's translation state — `verso reset <input>`.
//!
//! By default only the session files are removed so the run restarts from
//! the artifacts already on disk. `--all` also deletes artifacts and
//! metrics.

use anyhow::Result;
use std::path::Path;

pub fn cmd_reset(input: &Path, force: bool, all: bool) -> Result<()> {
    use verso::config::Config;

    let work_dir = Config::work_dir_for(input)?;
    if !work_dir.exists() {
        println!("Nothing to reset for {}", input.display());
        return Ok(());
    }

    if !force {
        let scope = if all {
            "all progress, artifacts included,"
        } else {
            "the session"
        };
        println!(
            "This will delete {scope} under {}. Re-run with --force to confirm.",
            work_dir.display()
        );
        return Ok(());
    }

    if all {
        std::fs::remove_dir_all(&work_dir)?;
        println!("Reset complete (artifacts deleted)");
        return Ok(());
    }

    for name in ["session.json", "session.md"] {
        let path = work_dir.join(name);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
    }
    println!("Session cleared (artifacts retained)");
    Ok(())
}
