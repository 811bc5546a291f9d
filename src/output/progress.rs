//! Progress bar utilities.

use indicatif::{ProgressBar, ProgressStyle};

use crate::events::EngineEvent;

/// Create a spinner for long-running operations.
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    spinner
}

/// Create a progress bar for transfers.
pub fn create_transfer_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );
    bar
}

/// Drive a transfer bar from engine events until the channel closes.
pub async fn follow_events(mut events: tokio::sync::mpsc::Receiver<EngineEvent>) {
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::Status { status, .. } => {
                if let Some(ref bar) = bar {
                    bar.set_message(status);
                } else {
                    crate::output::print_info(&status);
                }
            }
            EngineEvent::Progress {
                progress,
                size,
                speed,
                ..
            } => {
                let total = size.unwrap_or(100);
                let bar = bar.get_or_insert_with(|| create_transfer_bar(total));
                if bar.length() != Some(total) {
                    bar.set_length(total);
                }
                bar.set_position(((progress / 100.0) * total as f64) as u64);
                if let Some(speed) = speed {
                    bar.set_message(format!("{}/s", indicatif::HumanBytes(speed as u64)));
                }
            }
            EngineEvent::Complete { .. } => {
                if let Some(bar) = bar.take() {
                    bar.finish_and_clear();
                }
            }
            EngineEvent::Error { error, .. } => {
                if let Some(bar) = bar.take() {
                    bar.finish_and_clear();
                }
                crate::output::print_error(&error);
            }
        }
    }

    if let Some(bar) = bar.take() {
        bar.finish_and_clear();
    }
}
