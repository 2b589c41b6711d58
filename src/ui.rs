//! Terminal UI for the workflow, rendered via `indicatif` progress bars.
//!
//! Two bars are stacked vertically:
//! - Step bar: tracks how many of the ten steps have completed
//! - Activity spinner: the current call or stitch operation

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct WorkflowUI {
    _multi: MultiProgress,
    step_bar: ProgressBar,
    activity: ProgressBar,
    verbose: bool,
}

impl WorkflowUI {
    pub fn new(total_steps: u64, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let step_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");
        let step_bar = multi.add(ProgressBar::new(total_steps));
        step_bar.set_style(step_style);
        step_bar.set_prefix("Steps");

        let activity_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");
        let activity = multi.add(ProgressBar::new_spinner());
        activity.set_style(activity_style);
        activity.set_prefix("     ");
        activity.enable_steady_tick(Duration::from_millis(120));

        Self {
            _multi: multi,
            step_bar,
            activity,
            verbose,
        }
    }

    pub fn start_step(&self, ordinal: u32, title: &str) {
        self.step_bar.set_message(title.to_string());
        self.activity
            .set_message(format!("step {ordinal:02}: {title}"));
    }

    pub fn step_skipped(&self, title: &str) {
        if self.verbose {
            self.activity
                .println(format!("{} {title} (already complete)", style("↷").dim()));
        }
        self.step_bar.inc(1);
    }

    pub fn step_done(&self, title: &str) {
        self.activity
            .println(format!("{} {title}", style("✔").green()));
        self.step_bar.inc(1);
    }

    pub fn note(&self, message: &str) {
        if self.verbose {
            self.activity.println(format!("  {}", style(message).dim()));
        }
    }

    pub fn finish(&self, message: &str) {
        self.activity.finish_and_clear();
        self.step_bar.finish_with_message(message.to_string());
    }
}
