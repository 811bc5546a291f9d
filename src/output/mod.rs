//! Output module for console output and progress.
//!
//! Provides:
//! - Colored console output
//! - Progress bars driven by engine events
//! - Queue result reporting

pub mod console;
pub mod progress;
pub mod stats;

pub use console::{print_banner, print_config_summary, print_error, print_info, print_success, print_warning};
pub use progress::{create_spinner, create_transfer_bar, follow_events};
pub use stats::{print_item_result, print_queue_stats};
