//! Progress indicators for dsync CLI.
//!
//! [`ApplyProgress`] draws one bar across every kind of an apply and prints
//! per-item results above it.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use reconcile::{ItemOutcome, Kind, ProgressCallback, SelectionId};

use crate::ui;

pub struct ApplyProgress {
    bar: ProgressBar,
    label: String,
    verbose: bool,
}

impl ApplyProgress {
    /// A bar for `total` items; hidden when `quiet`.
    pub fn new(total: usize, quiet: bool, verbose: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(total as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            bar
        };
        Self {
            bar,
            label: String::new(),
            verbose,
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for ApplyProgress {
    fn on_kind_start(&mut self, kind: Kind, count: usize) {
        self.bar.set_message(format!("{} ({count})", kind.category_name()));
    }

    fn on_item_start(&mut self, id: &SelectionId, label: &str) {
        self.label = label.to_string();
        self.bar.set_message(format!("{}: {}", id.kind.category_name(), label));
    }

    fn on_item_complete(&mut self, id: &SelectionId, outcome: &ItemOutcome) {
        self.bar.inc(1);
        let label = &self.label;
        match outcome {
            ItemOutcome::Failed { error } => self.bar.suspend(|| {
                ui::error(&format!("{id} ({label}): {error}"));
            }),
            _ if self.verbose => self.bar.suspend(|| {
                println!("  {} {} {}", ui::outcome_symbol(outcome), label, outcome.to_string().dimmed());
            }),
            _ => {}
        }
    }

    fn on_kind_complete(&mut self, kind: Kind) {
        log::debug!("Finished {}", kind.category_name());
    }
}
