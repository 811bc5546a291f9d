//! Queue statistics reporting.

use console::style;

use crate::queue::{ItemStatus, QueueItem};

/// Print a per-item result line.
pub fn print_item_result(item: &QueueItem) {
    let status = match item.status {
        ItemStatus::Completed => style("done").green(),
        ItemStatus::Failed => style("failed").red(),
        ItemStatus::Paused => style("paused").yellow(),
        ItemStatus::Pending => style("pending").dim(),
        ItemStatus::Active => style("active").cyan(),
    };

    match &item.error {
        Some(error) => println!("  {}  {} ({})", status, item.video.title, error),
        None => println!("  {}  {}", status, item.video.title),
    }
}

/// Print final statistics for a queue run.
pub fn print_queue_stats(items: &[QueueItem]) {
    let completed = items
        .iter()
        .filter(|i| i.status == ItemStatus::Completed)
        .count();
    let failed = items
        .iter()
        .filter(|i| i.status == ItemStatus::Failed)
        .count();
    let remaining = items.len() - completed - failed;

    println!();
    println!("{}", style("═".repeat(50)).dim());
    println!("{}", style("Queue results:").bold());
    for item in items {
        print_item_result(item);
    }
    println!();
    println!("  Completed: {}", style(completed).green());
    if failed > 0 {
        println!("  Failed:    {}", style(failed).red());
    }
    if remaining > 0 {
        println!("  Remaining: {}", remaining);
    }
    println!("{}", style("═".repeat(50)).dim());
}
