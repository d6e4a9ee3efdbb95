use indicatif::{ProgressBar, ProgressStyle};
use std::sync::mpsc::Receiver;
use workset_core::ProgressEvent;

/// Drive a single progress bar from the combined aggregate stream. The bar
/// length follows the stream's totals, which may be revised upward while a
/// stage runs.
pub(super) fn render_progress(events: Receiver<ProgressEvent>) {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{msg:40!} [{bar:40}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    for event in events {
        bar.set_length(event.total.max(1));
        bar.set_position(event.current.min(event.total));
        bar.set_message(format_message(&event));
    }
    bar.finish_and_clear();
}

fn format_message(event: &ProgressEvent) -> String {
    format!("{} ({})", event.stage, event.repo)
}
